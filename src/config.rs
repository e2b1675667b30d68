//! Configuration loaded from environment variables

use std::path::PathBuf;

use clap::ValueEnum;

/// Capture libraries take the snapshot length as a C `int`
const MAX_SNAPLEN: u32 = i32::MAX as u32;

/// Which frame source to capture with
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// `tcpdump -w -` child process
    Tcpdump,
    /// In-process libpcap (needs the `pcap` feature)
    Pcap,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Wireless interface to sniff on
    pub interface: Option<String>,

    /// Frame source backend
    pub backend: Backend,

    /// Path to iwconfig executable
    pub iwconfig_path: PathBuf,

    /// Path to ifconfig executable (monitor-mode fallback)
    pub ifconfig_path: PathBuf,

    /// Path to tcpdump executable
    pub tcpdump_path: PathBuf,

    /// Capture snapshot length in bytes
    pub snaplen: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            interface: var("SNIFFER_INTERFACE").filter(|s| !s.is_empty()),

            backend: var("SNIFFER_BACKEND")
                .and_then(|s| Backend::from_str(&s, true).ok())
                .unwrap_or(Backend::Tcpdump),

            iwconfig_path: var("IWCONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("iwconfig")),

            ifconfig_path: var("IFCONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ifconfig")),

            tcpdump_path: var("TCPDUMP_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tcpdump")),

            snaplen: var("SNIFFER_SNAPLEN")
                .and_then(|s| s.parse::<u32>().ok())
                .map(|n| n.min(MAX_SNAPLEN))
                .unwrap_or(8192),  // BUFSIZ, enough for any 802.11 header
        }
    }
}
