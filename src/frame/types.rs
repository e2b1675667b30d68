//! Frame data types

use std::fmt;

use serde::{Serialize, Serializer};

/// Capture link-layer header types we know how to strip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// Bare 802.11 frames, no capture envelope
    Ieee80211,
    /// Legacy Prism monitoring header (DLT_PRISM_HEADER)
    Prism,
    /// Radiotap extensible header (DLT_IEEE802_11_RADIO)
    Radiotap,
    /// Anything else is passed through untouched
    Other(i32),
}

impl LinkType {
    pub const DLT_IEEE802_11: i32 = 105;
    pub const DLT_PRISM_HEADER: i32 = 119;
    pub const DLT_IEEE802_11_RADIO: i32 = 127;

    pub fn dlt(self) -> i32 {
        match self {
            Self::Ieee80211 => Self::DLT_IEEE802_11,
            Self::Prism => Self::DLT_PRISM_HEADER,
            Self::Radiotap => Self::DLT_IEEE802_11_RADIO,
            Self::Other(dlt) => dlt,
        }
    }
}

impl From<i32> for LinkType {
    fn from(dlt: i32) -> Self {
        match dlt {
            Self::DLT_IEEE802_11 => Self::Ieee80211,
            Self::DLT_PRISM_HEADER => Self::Prism,
            Self::DLT_IEEE802_11_RADIO => Self::Radiotap,
            other => Self::Other(other),
        }
    }
}

/// Six raw bytes found at a MAC field offset.
///
/// Not necessarily a real MAC: on frames whose header layout differs from the
/// fixed 4-address layout these are whatever bytes sit at the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
        Some(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One MAC-like field pulled out of a frame body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacField {
    /// Field position 0..4 (body offsets 4, 10, 16, 22)
    pub position: usize,
    pub address: MacAddress,
}
