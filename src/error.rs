//! Fatal error kinds
//!
//! Anything surfaced as a `SnifferError` ends the process. Recoverable
//! conditions (a failed channel switch, a malformed frame) never reach here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnifferError {
    #[error("interface {interface} could not be put into monitor mode: {reason}")]
    MonitorMode { interface: String, reason: String },

    #[error("couldn't open interface {interface}: {reason}")]
    OpenCapture { interface: String, reason: String },

    #[error("couldn't set capture on {interface} to non-blocking mode: {reason}")]
    NonBlocking { interface: String, reason: String },

    #[error("impossible to switch to channel {channel} (valid range 1..={max})")]
    ChannelOutOfRange { channel: u32, max: u8 },
}

pub type Result<T> = std::result::Result<T, SnifferError>;
