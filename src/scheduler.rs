//! Adaptive channel scheduling
//!
//! Channels are visited strictly round-robin; what adapts is how long each
//! visit lasts. A channel's share of a round is proportional to its observed
//! packet rate (plus a small floor so quiet channels are never starved).
//! All history since session start counts equally.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, SnifferError};

/// Number of channels swept
pub const NUM_CHANNELS: u8 = 12;

/// Nominal capture session length
pub const SESSION_BUDGET: Duration = Duration::from_secs(60);

/// A round is this fraction of the session budget
const ROUNDS_PER_SESSION: f64 = 5.0;

/// Added to every channel's packet rate before normalizing
pub const MIN_SPEED_ADDER: f64 = 0.01;

/// Channel number in `1..=num_channels`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Channel(u8);

impl Channel {
    pub fn number(self) -> u8 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling constants
#[derive(Debug, Clone, Copy)]
pub struct SchedulerParams {
    pub num_channels: u8,
    pub session_budget: Duration,
    pub min_speed_adder: f64,
}

impl SchedulerParams {
    /// Time budget one probability unit buys, in seconds
    pub fn round_secs(&self) -> f64 {
        self.session_budget.as_secs_f64() / ROUNDS_PER_SESSION
    }
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            num_channels: NUM_CHANNELS,
            session_budget: SESSION_BUDGET,
            min_speed_adder: MIN_SPEED_ADDER,
        }
    }
}

/// Per-channel accounting
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    /// Fraction of a round allotted to this channel
    pub probability: f64,
    /// Seconds spent listening, accumulated on departure
    pub dwell_secs: f64,
    /// Frames dispatched while tuned here
    pub packets_seen: u64,
}

impl ChannelStats {
    /// Observed packets per second (0 before the first visit completes)
    pub fn packet_rate(&self) -> f64 {
        if self.dwell_secs > 0.0 {
            self.packets_seen as f64 / self.dwell_secs
        } else {
            0.0
        }
    }
}

/// Owns the channel table and the rotation/recalculation policy
pub struct ChannelScheduler {
    params: SchedulerParams,
    table: Vec<ChannelStats>,
}

impl ChannelScheduler {
    pub fn new(params: SchedulerParams) -> Self {
        let n = params.num_channels.max(1);
        let initial = ChannelStats {
            probability: 1.0 / n as f64,
            dwell_secs: 0.0,
            packets_seen: 0,
        };
        Self {
            params: SchedulerParams {
                num_channels: n,
                ..params
            },
            table: vec![initial; n as usize],
        }
    }

    pub fn params(&self) -> &SchedulerParams {
        &self.params
    }

    pub fn num_channels(&self) -> u8 {
        self.params.num_channels
    }

    /// Validate a channel number.
    ///
    /// Out-of-range numbers are an internal invariant violation and fatal.
    pub fn channel(&self, number: u32) -> Result<Channel> {
        let max = self.params.num_channels;
        if number == 0 || number > max as u32 {
            return Err(SnifferError::ChannelOutOfRange {
                channel: number,
                max,
            });
        }
        Ok(Channel(number as u8))
    }

    pub fn first_channel(&self) -> Channel {
        Channel(1)
    }

    /// `(current mod N) + 1`
    pub fn next_channel(&self, current: Channel) -> Channel {
        Channel(current.0 % self.params.num_channels + 1)
    }

    /// Whether leaving `channel` completes a sweep
    pub fn is_last(&self, channel: Channel) -> bool {
        channel.0 == self.params.num_channels
    }

    pub fn stats(&self, channel: Channel) -> &ChannelStats {
        &self.table[channel.index()]
    }

    pub fn channels(&self) -> impl Iterator<Item = (Channel, &ChannelStats)> {
        self.table
            .iter()
            .enumerate()
            .map(|(i, stats)| (Channel(i as u8 + 1), stats))
    }

    /// Add departure-time dwell to a channel. Negative input is ignored.
    pub fn mark_elapsed(&mut self, channel: Channel, secs: f64) {
        if secs > 0.0 {
            self.table[channel.index()].dwell_secs += secs;
        }
    }

    pub fn record_packet(&mut self, channel: Channel) {
        self.table[channel.index()].packets_seen += 1;
    }

    /// True once the dwell timer exceeds this channel's slice of a round
    pub fn should_rotate(&self, channel: Channel, dwell_secs: f64) -> bool {
        dwell_secs > self.stats(channel).probability * self.params.round_secs()
    }

    /// Reassign probabilities proportional to `packets / dwell + ε`.
    ///
    /// Expects every channel to have been visited once. A channel with no
    /// dwell yet contributes only ε.
    pub fn recalculate_probabilities(&mut self) {
        let adder = self.params.min_speed_adder;
        let speeds: Vec<f64> = self
            .channels()
            .map(|(channel, stats)| {
                debug!("Packets on channel {:02} = {}", channel, stats.packets_seen);
                stats.packet_rate() + adder
            })
            .collect();

        let total: f64 = speeds.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return;
        }

        for (stats, speed) in self.table.iter_mut().zip(speeds) {
            stats.probability = speed / total;
        }

        info!("Recalculated time allotted per channel (greater time for busier channels)");
    }

    pub fn total_packets(&self) -> u64 {
        self.table.iter().map(|s| s.packets_seen).sum()
    }
}

impl Default for ChannelScheduler {
    fn default() -> Self {
        Self::new(SchedulerParams::default())
    }
}
