//! Classic pcap stream decoding
//!
//! Reads the savefile format `tcpdump -w -` writes: a 24-byte global header
//! followed by (16-byte record header, captured bytes) pairs. Both byte
//! orders and both the microsecond and nanosecond magics are accepted.

use std::io::{self, Read};
use std::time::Duration;

use thiserror::Error;

use crate::frame::LinkType;

const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const MAGIC_NANOS: u32 = 0xa1b2_3c4d;

const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;

/// Refuse records larger than this rather than allocating for garbage
const MAX_RECORD_LEN: u32 = 256 * 1024;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("not a pcap stream (magic {0:#010x})")]
    BadMagic(u32),

    #[error("pcap stream ended mid-record")]
    Truncated,

    #[error("pcap record of {0} bytes exceeds limit")]
    OversizedRecord(u32),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One captured frame
#[derive(Debug, Clone)]
pub struct PcapRecord {
    /// Capture timestamp since the epoch
    pub timestamp: Duration,
    /// Captured bytes (`incl_len` of them)
    pub data: Vec<u8>,
    /// Length of the frame on the wire
    pub orig_len: usize,
}

/// Incremental reader over a pcap byte stream
pub struct PcapStreamReader<R> {
    reader: R,
    big_endian: bool,
    nanos: bool,
    link_type: LinkType,
    snaplen: u32,
}

impl<R: Read> PcapStreamReader<R> {
    /// Consume the global header
    pub fn new(mut reader: R) -> Result<Self, StreamError> {
        let mut header = [0u8; GLOBAL_HEADER_LEN];
        if !read_full(&mut reader, &mut header)? {
            return Err(StreamError::Truncated);
        }

        let magic_le = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let (big_endian, nanos) = match magic_le {
            MAGIC_MICROS => (false, false),
            MAGIC_NANOS => (false, true),
            m if m.swap_bytes() == MAGIC_MICROS => (true, false),
            m if m.swap_bytes() == MAGIC_NANOS => (true, true),
            m => return Err(StreamError::BadMagic(m)),
        };

        let mut this = Self {
            reader,
            big_endian,
            nanos,
            link_type: LinkType::Other(0),
            snaplen: 0,
        };
        this.snaplen = this.u32_at(&header, 16);
        // Upper bits of the link-type word carry FCS flags
        this.link_type = LinkType::from((this.u32_at(&header, 20) & 0x0fff_ffff) as i32);
        Ok(this)
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn snaplen(&self) -> u32 {
        self.snaplen
    }

    /// Next record, or `None` at a clean end of stream
    pub fn next_record(&mut self) -> Result<Option<PcapRecord>, StreamError> {
        let mut header = [0u8; RECORD_HEADER_LEN];
        if !read_full(&mut self.reader, &mut header)? {
            return Ok(None);
        }

        let ts_sec = self.u32_at(&header, 0);
        let ts_frac = self.u32_at(&header, 4);
        let incl_len = self.u32_at(&header, 8);
        let orig_len = self.u32_at(&header, 12);

        if incl_len > MAX_RECORD_LEN {
            return Err(StreamError::OversizedRecord(incl_len));
        }

        let mut data = vec![0u8; incl_len as usize];
        if !read_full(&mut self.reader, &mut data)? && incl_len > 0 {
            return Err(StreamError::Truncated);
        }

        let frac = if self.nanos {
            Duration::from_nanos(ts_frac as u64)
        } else {
            Duration::from_micros(ts_frac as u64)
        };

        Ok(Some(PcapRecord {
            timestamp: Duration::from_secs(ts_sec as u64) + frac,
            data,
            orig_len: orig_len as usize,
        }))
    }

    fn u32_at(&self, buf: &[u8], offset: usize) -> u32 {
        let bytes = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
        if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        }
    }
}

/// Fill `buf` completely. `Ok(false)` means EOF before the first byte;
/// EOF after a partial read is `Truncated`.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, StreamError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(StreamError::Truncated),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}
