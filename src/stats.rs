//! Per-flow statistics.
//!
//! The [`StatsCollector`] is updated as a side effect of transmit, delivery
//! and drop events. Flows are created lazily the first time a packet of the
//! flow is observed and are never removed during a run.
//!
//! Throughput is `rx_bytes * 8 / duration_seconds`. By default the duration
//! is the configured simulation stop time; [`StatsCollector::report_windowed`]
//! uses each flow's own observation window instead.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{SimError, SimResult};
use crate::packet::FlowKey;
use crate::types::SimTime;

/// Cumulative counters of one flow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FlowStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub lost_packets: u64,
    pub first_tx: Option<SimTime>,
    pub last_tx: Option<SimTime>,
    pub first_rx: Option<SimTime>,
    pub last_rx: Option<SimTime>,
    /// Sum of one-way delays of received packets
    pub delay_sum: SimTime,
}

impl FlowStats {
    /// First instant any packet of the flow was seen.
    pub fn first_seen(&self) -> Option<SimTime> {
        match (self.first_tx, self.first_rx) {
            (Some(tx), Some(rx)) => Some(tx.min(rx)),
            (tx, rx) => tx.or(rx),
        }
    }

    /// Last instant any packet of the flow was seen.
    pub fn last_seen(&self) -> Option<SimTime> {
        match (self.last_tx, self.last_rx) {
            (Some(tx), Some(rx)) => Some(tx.max(rx)),
            (tx, rx) => tx.or(rx),
        }
    }

    /// Length of `[first_seen, last_seen]`.
    pub fn window(&self) -> SimTime {
        match (self.first_seen(), self.last_seen()) {
            (Some(first), Some(last)) => SimTime::from_nanos(last.as_nanos() - first.as_nanos()),
            _ => SimTime::ZERO,
        }
    }

    /// Mean one-way delay of received packets.
    pub fn mean_delay(&self) -> Option<SimTime> {
        (self.rx_packets > 0).then(|| SimTime::from_nanos(self.delay_sum.as_nanos() / self.rx_packets))
    }
}

/// Final figures of one flow.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowReport {
    pub flow: FlowKey,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub lost_packets: u64,
    /// Duration the throughput was computed over
    pub duration: SimTime,
    /// Received bits per second
    pub throughput_bps: f64,
    pub mean_delay: Option<SimTime>,
}

impl FlowReport {
    /// Throughput in megabits per second.
    pub fn throughput_mbps(&self) -> f64 {
        self.throughput_bps / 1_000_000.0
    }
}

/// Computes `bytes * 8 / duration` in bits per second.
///
/// # Errors
/// [`SimError::InvalidDuration`] if `duration` is zero.
pub fn throughput_bps(bytes: u64, duration: SimTime) -> SimResult<f64> {
    if duration == SimTime::ZERO {
        return Err(SimError::InvalidDuration(duration));
    }
    Ok(bytes as f64 * 8.0 / duration.as_secs_f64())
}

/// Accumulates per-flow counters during a run.
#[derive(Clone, Debug, Default)]
pub struct StatsCollector {
    flows: BTreeMap<FlowKey, FlowStats>,
    /// Default throughput duration (the simulation stop time)
    duration: SimTime,
}

impl StatsCollector {
    /// Creates a collector reporting over `duration` by default.
    pub fn new(duration: SimTime) -> Self {
        Self {
            flows: BTreeMap::new(),
            duration,
        }
    }

    /// Returns the default report duration.
    pub fn duration(&self) -> SimTime {
        self.duration
    }

    /// Changes the default report duration.
    pub fn set_duration(&mut self, duration: SimTime) {
        self.duration = duration;
    }

    fn entry(&mut self, flow: FlowKey) -> &mut FlowStats {
        self.flows.entry(flow).or_default()
    }

    /// Records a packet handed to a channel.
    pub fn record_tx(&mut self, flow: FlowKey, bytes: u32, at: SimTime) {
        let stats = self.entry(flow);
        stats.tx_packets += 1;
        stats.tx_bytes += bytes as u64;
        stats.first_tx.get_or_insert(at);
        stats.last_tx = Some(at);
    }

    /// Records a delivered packet.
    pub fn record_rx(&mut self, flow: FlowKey, bytes: u32, at: SimTime) {
        let stats = self.entry(flow);
        stats.rx_packets += 1;
        stats.rx_bytes += bytes as u64;
        stats.first_rx.get_or_insert(at);
        stats.last_rx = Some(at);
    }

    /// Adds the one-way delay of a delivered packet.
    pub fn record_delay(&mut self, flow: FlowKey, delay: SimTime) {
        let stats = self.entry(flow);
        stats.delay_sum = stats.delay_sum.saturating_add(delay);
    }

    /// Records a dropped packet.
    pub fn record_loss(&mut self, flow: FlowKey) {
        self.entry(flow).lost_packets += 1;
    }

    /// Returns the counters of a flow.
    pub fn flow(&self, key: &FlowKey) -> Option<&FlowStats> {
        self.flows.get(key)
    }

    /// Iterates over all flows in key order.
    pub fn flows(&self) -> impl Iterator<Item = (&FlowKey, &FlowStats)> {
        self.flows.iter()
    }

    /// Returns the number of flows observed.
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    /// Returns true if no flow was observed.
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Reports every flow over the configured duration.
    ///
    /// # Errors
    /// [`SimError::InvalidDuration`] if the configured duration is zero.
    pub fn report(&self) -> SimResult<BTreeMap<FlowKey, FlowReport>> {
        self.flows
            .iter()
            .map(|(key, stats)| Ok((*key, build_report(key, stats, self.duration)?)))
            .collect()
    }

    /// Reports every flow over its own `[first_seen, last_seen]` window.
    ///
    /// # Errors
    /// [`SimError::InvalidDuration`] if any flow's window is empty.
    pub fn report_windowed(&self) -> SimResult<BTreeMap<FlowKey, FlowReport>> {
        self.flows
            .iter()
            .map(|(key, stats)| Ok((*key, build_report(key, stats, stats.window())?)))
            .collect()
    }

    /// Serializes a report as a JSON array.
    pub fn report_to_json(report: &BTreeMap<FlowKey, FlowReport>) -> serde_json::Result<String> {
        let rows: Vec<&FlowReport> = report.values().collect();
        serde_json::to_string_pretty(&rows)
    }
}

fn build_report(key: &FlowKey, stats: &FlowStats, duration: SimTime) -> SimResult<FlowReport> {
    Ok(FlowReport {
        flow: *key,
        tx_packets: stats.tx_packets,
        rx_packets: stats.rx_packets,
        rx_bytes: stats.rx_bytes,
        lost_packets: stats.lost_packets,
        duration,
        throughput_bps: throughput_bps(stats.rx_bytes, duration)?,
        mean_delay: stats.mean_delay(),
    })
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}
