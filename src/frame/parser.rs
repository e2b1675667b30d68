//! Capture envelope stripping and fixed-offset MAC extraction

use super::types::{LinkType, MacAddress, MacField};

/// Number of MAC-like fields looked at per frame
pub const MAC_FIELD_COUNT: usize = 4;

/// Body offset of field position 0; each following field is 6 bytes further.
/// Assumes the 4-address data frame layout (frame control + duration first).
const FIRST_FIELD_OFFSET: usize = 4;

const MAC_LEN: usize = 6;

/// Prism header: u32 msgcode, u32 msglen, ...
const PRISM_MSGLEN_OFFSET: usize = 4;

/// Radiotap header: u8 version, u8 pad, u16 it_len (little endian), ...
const RADIOTAP_LEN_OFFSET: usize = 2;

/// 802.11 frame left after the capture envelope is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBody<'a> {
    /// Captured bytes of the body
    pub bytes: &'a [u8],
    /// Wire length minus the envelope length
    pub remaining_len: usize,
}

/// Strip the capture envelope for `link`.
///
/// `wire_len` is the on-the-wire frame length reported by the capture layer,
/// which can exceed `frame.len()` when the snapshot was truncated. An envelope
/// whose length field is unreadable, or longer than the frame, leaves an empty
/// body rather than failing.
pub fn strip_envelope(frame: &[u8], wire_len: usize, link: LinkType) -> FrameBody<'_> {
    let envelope_len = match link {
        LinkType::Prism => read_u32_le(frame, PRISM_MSGLEN_OFFSET).map(|n| n as usize),
        LinkType::Radiotap => read_u16_le(frame, RADIOTAP_LEN_OFFSET).map(|n| n as usize),
        LinkType::Ieee80211 | LinkType::Other(_) => Some(0),
    };

    match envelope_len {
        Some(len) => FrameBody {
            bytes: frame.get(len..).unwrap_or(&[]),
            remaining_len: wire_len.saturating_sub(len),
        },
        None => FrameBody {
            bytes: &[],
            remaining_len: 0,
        },
    }
}

/// Pull out every MAC field that fits entirely inside the body.
///
/// The frame-control field is never consulted, so control and management
/// frames with shorter headers yield whatever bytes sit at the offsets.
pub fn extract_mac_fields(body: &FrameBody<'_>) -> Vec<MacField> {
    let limit = body.remaining_len.min(body.bytes.len());

    (0..MAC_FIELD_COUNT)
        .filter_map(|position| {
            let start = FIRST_FIELD_OFFSET + position * MAC_LEN;
            let end = start + MAC_LEN;
            if end > limit {
                return None;
            }
            MacAddress::from_slice(&body.bytes[start..end])
                .map(|address| MacField { position, address })
        })
        .collect()
}

/// Strip the envelope and extract MAC fields in one go
pub fn parse_frame(frame: &[u8], wire_len: usize, link: LinkType) -> Vec<MacField> {
    let body = strip_envelope(frame, wire_len, link);
    extract_mac_fields(&body)
}

fn read_u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes: [u8; 2] = buf.get(offset..offset + 2)?.try_into().ok()?;
    Some(u16::from_le_bytes(bytes))
}

fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}
