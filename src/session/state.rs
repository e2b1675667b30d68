//! Per-session capture state

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Timer;
use crate::frame::{parse_frame, LinkType};
use crate::mac_aggregator::MacAggregator;
use crate::scheduler::{Channel, ChannelScheduler, SchedulerParams};

/// Loop counters
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub frames_dispatched: u64,
    pub sweeps_completed: u64,
    pub channel_switch_failures: u64,
}

/// Everything the capture loop mutates, and the reporter reads afterwards
pub struct CaptureSession {
    pub interface: String,
    pub link_type: LinkType,
    pub started_at: DateTime<Utc>,
    /// Time since the last channel switch
    pub dwell_timer: Timer,
    /// Time since capture start
    pub session_timer: Timer,
    pub scheduler: ChannelScheduler,
    pub aggregator: MacAggregator,
    pub stats: SessionStats,
}

impl CaptureSession {
    pub fn new(interface: &str, link_type: LinkType, params: SchedulerParams, now: Duration) -> Self {
        Self {
            interface: interface.to_string(),
            link_type,
            started_at: Utc::now(),
            dwell_timer: Timer::start(now),
            session_timer: Timer::start(now),
            scheduler: ChannelScheduler::new(params),
            aggregator: MacAggregator::new(),
            stats: SessionStats::default(),
        }
    }

    /// Account one captured frame against `channel`
    pub fn handle_frame(&mut self, channel: Channel, frame: &[u8], wire_len: usize) {
        for field in parse_frame(frame, wire_len, self.link_type) {
            self.aggregator.record(channel, field.position, field.address);
        }
        self.scheduler.record_packet(channel);
    }
}

/// How a capture run ended
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub sweeps_completed: u64,
    pub frames_dispatched: u64,
    pub channel_switch_failures: u64,
    /// Total capture time, including the sweep finished after the budget
    pub session_secs: f64,
    /// Time past the nominal budget
    pub overrun_secs: f64,
}
