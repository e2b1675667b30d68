//! MAC sighting tallies
//!
//! Counts every MAC-like field seen, keyed by the channel it was captured on
//! and the field position it came from. Positions are merged only when
//! reporting.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use tracing::debug;

use crate::frame::{MacAddress, MAC_FIELD_COUNT};
use crate::scheduler::Channel;

type PositionTallies = [BTreeMap<MacAddress, u64>; MAC_FIELD_COUNT];

/// Tallies of MAC sightings per (channel, field position, address)
#[derive(Default)]
pub struct MacAggregator {
    sightings: HashMap<Channel, PositionTallies>,
}

impl MacAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one sighting, returning the key's new count.
    ///
    /// Every call increments; this is a tally, not a set insert.
    pub fn record(&mut self, channel: Channel, position: usize, mac: MacAddress) -> u64 {
        if position >= MAC_FIELD_COUNT {
            debug!("Ignoring MAC {} at unknown field position {}", mac, position);
            return 0;
        }

        let tallies = self.sightings.entry(channel).or_default();
        let count = tallies[position].entry(mac).or_insert(0);
        *count += 1;
        debug!("MAC {} : {}", position, mac);
        *count
    }

    /// Count for an exact (channel, position, address) key
    #[cfg(test)]
    pub fn count(&self, channel: Channel, position: usize, mac: &MacAddress) -> u64 {
        self.sightings
            .get(&channel)
            .and_then(|tallies| tallies.get(position))
            .and_then(|tally| tally.get(mac))
            .copied()
            .unwrap_or(0)
    }

    /// Per-address counts for a channel, summed across field positions
    pub fn channel_mac_counts(&self, channel: Channel) -> BTreeMap<MacAddress, u64> {
        let mut merged = BTreeMap::new();
        if let Some(tallies) = self.sightings.get(&channel) {
            for tally in tallies {
                for (mac, count) in tally {
                    *merged.entry(*mac).or_insert(0) += count;
                }
            }
        }
        merged
    }

    /// Distinct addresses seen on one channel
    pub fn unique_mac_count(&self, channel: Channel) -> usize {
        self.channel_mac_counts(channel).len()
    }

    /// Union of addresses across all channels
    pub fn overall_macs(&self) -> BTreeSet<MacAddress> {
        self.sightings
            .values()
            .flat_map(|tallies| tallies.iter())
            .flat_map(|tally| tally.keys().copied())
            .collect()
    }

    /// Distinct addresses across all channels (a MAC seen on two channels counts once)
    pub fn overall_unique_mac_count(&self) -> usize {
        self.overall_macs().len()
    }

    /// All sightings recorded on one channel
    pub fn total_sightings(&self, channel: Channel) -> u64 {
        self.sightings
            .get(&channel)
            .map(|tallies| tallies.iter().flat_map(|t| t.values()).sum())
            .unwrap_or(0)
    }

    /// All sightings on every channel
    pub fn total_sightings_all(&self) -> u64 {
        self.sightings
            .keys()
            .map(|channel| self.total_sightings(*channel))
            .sum()
    }

    /// Channels with at least one sighting, ascending
    #[cfg(test)]
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.sightings.keys().copied().collect();
        channels.sort();
        channels
    }

    pub fn stats_summary(&self) -> AggregatorStats {
        AggregatorStats {
            channels: self.sightings.len(),
            unique_macs: self.overall_unique_mac_count(),
            total_sightings: self.total_sightings_all(),
        }
    }
}

/// Aggregator statistics
#[derive(Debug, Clone)]
pub struct AggregatorStats {
    pub channels: usize,
    pub unique_macs: usize,
    pub total_sightings: u64,
}

impl fmt::Display for AggregatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MACs: {} unique, {} sightings across {} channels",
            self.unique_macs, self.total_sightings, self.channels
        )
    }
}
