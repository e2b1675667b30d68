//! Live frame sources
//!
//! A `FrameSource` hands the capture loop at most one frame per call and
//! never blocks once switched to non-blocking mode. Two backends:
//! 1. `TcpdumpSource` - runs `tcpdump -w -` and decodes the pcap stream
//! 2. `PcapSource` - in-process libpcap (cargo feature `pcap`)

pub mod pcap_stream;
mod tcpdump;

#[cfg(feature = "pcap")]
mod pcap_source;

pub use tcpdump::TcpdumpSource;

#[cfg(feature = "pcap")]
pub use pcap_source::PcapSource;

use crate::error::Result;
use crate::frame::LinkType;

/// Source of captured link-layer frames
pub trait FrameSource {
    /// Capture envelope carried by every frame
    fn link_type(&self) -> LinkType;

    /// Switch to non-blocking dispatch. Failure is fatal.
    fn set_non_blocking(&mut self) -> Result<()>;

    /// Deliver at most one available frame to `on_frame(bytes, wire_len)`.
    ///
    /// Returns the number of frames delivered (0 or 1).
    fn dispatch_one(&mut self, on_frame: &mut dyn FnMut(&[u8], usize)) -> usize;
}
