//! End-of-run capture report
//!
//! Built from the finished session. Rendered either as the plain-text summary
//! or as JSON.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::frame::MacAddress;
use crate::scheduler::Channel;
use crate::session::{CaptureSession, SessionOutcome};

/// Metrics for one channel that saw traffic
#[derive(Debug, Clone, Serialize)]
pub struct ChannelReport {
    pub channel: Channel,
    pub unique_macs: usize,
    pub total_macs: u64,
    pub packets: u64,
    pub packet_rate: f64,
    pub dwell_secs: f64,
    pub probability: f64,
    /// Sightings per address, merged across field positions
    pub macs: BTreeMap<MacAddress, u64>,
}

/// Metrics across all reported channels
#[derive(Debug, Clone, Serialize)]
pub struct OverallReport {
    /// Size of the union of addresses, not the sum of per-channel counts
    pub unique_macs: usize,
    pub total_macs: u64,
    pub packets: u64,
    pub packet_rate: f64,
    pub dwell_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub interface: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub channels: Vec<ChannelReport>,
    pub overall: OverallReport,
    /// Final allotment for every channel
    pub probabilities: BTreeMap<Channel, f64>,
    pub outcome: SessionOutcome,
}

impl CaptureReport {
    pub fn build(session: &CaptureSession, outcome: SessionOutcome) -> Self {
        let scheduler = &session.scheduler;
        let aggregator = &session.aggregator;

        let channels: Vec<ChannelReport> = scheduler
            .channels()
            .filter(|(_, stats)| stats.packets_seen > 0)
            .map(|(channel, stats)| {
                let macs = aggregator.channel_mac_counts(channel);
                ChannelReport {
                    channel,
                    unique_macs: aggregator.unique_mac_count(channel),
                    total_macs: macs.values().sum(),
                    packets: stats.packets_seen,
                    packet_rate: stats.packet_rate(),
                    dwell_secs: stats.dwell_secs,
                    probability: stats.probability,
                    macs,
                }
            })
            .collect();

        // Channels without packets are left out, so this matches the shown total
        let packets = scheduler.total_packets();
        let dwell_secs: f64 = channels.iter().map(|c| c.dwell_secs).sum();
        let overall = OverallReport {
            unique_macs: aggregator.overall_unique_mac_count(),
            total_macs: channels.iter().map(|c| c.total_macs).sum(),
            packets,
            packet_rate: if dwell_secs > 0.0 {
                packets as f64 / dwell_secs
            } else {
                0.0
            },
            dwell_secs,
        };

        Self {
            interface: session.interface.clone(),
            started_at: session.started_at,
            finished_at: Utc::now(),
            channels,
            overall,
            probabilities: scheduler
                .channels()
                .map(|(channel, stats)| (channel, stats.probability))
                .collect(),
            outcome,
        }
    }

    /// Human-readable summary; `verbose` adds the per-address listing
    pub fn render_text(&self, verbose: bool) -> String {
        let mut out = String::from("\n\n");

        for ch in &self.channels {
            if verbose {
                let _ = writeln!(out, "Channel #{}:", ch.channel);
                for (mac, count) in &ch.macs {
                    let _ = writeln!(out, "{} : {}", mac, count);
                }
            }
            let _ = writeln!(out, "In channel {}:", ch.channel);
            write_metrics(&mut out, ch.unique_macs, ch.total_macs, ch.packets, ch.packet_rate);
            out.push('\n');
        }

        out.push_str("Overall:\n");
        let o = &self.overall;
        write_metrics(&mut out, o.unique_macs, o.total_macs, o.packets, o.packet_rate);
        out.push('\n');
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn write_metrics(out: &mut String, unique: usize, total: u64, packets: u64, rate: f64) {
    let _ = writeln!(out, " Number of unique MACs seen = {}", unique);
    let _ = writeln!(out, " Total number of MACs seen  = {}", total);
    let _ = writeln!(out, " Total packets captured     = {}", packets);
    let _ = writeln!(out, " Packet capture rate        = {} packets/sec", format_rate(rate));
}

/// Six significant digits with trailing zeros dropped (`%g` without the exponent)
fn format_rate(rate: f64) -> String {
    if rate == 0.0 || !rate.is_finite() {
        return rate.to_string();
    }
    let magnitude = rate.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).max(0) as usize;
    let text = format!("{:.*}", decimals, rate);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}
