//! Delivery observers.
//!
//! Trace export is not a kernel responsibility: the kernel only notifies
//! subscribed observers about transmissions, deliveries and drops. Two
//! observers ship with the crate: [`TracingObserver`] logs through
//! `tracing`, and [`RecordingObserver`] keeps records in a shared buffer
//! that outlives the simulation.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::channel::DropReason;
use crate::packet::{FlowKey, Packet};
use crate::types::{EntityId, SimTime};

/// Receives delivery notifications from the simulation.
///
/// All methods have empty defaults so observers only implement what they
/// care about.
pub trait DeliveryObserver {
    /// A packet was handed to a channel.
    fn on_transmit(&mut self, _now: SimTime, _packet: &Packet) {}

    /// A packet reached its destination entity.
    fn on_receive(&mut self, _now: SimTime, _packet: &Packet) {}

    /// A packet was discarded.
    fn on_drop(&mut self, _now: SimTime, _packet: &Packet, _reason: DropReason) {}
}

/// Logs every notification at `debug` level.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl DeliveryObserver for TracingObserver {
    fn on_transmit(&mut self, now: SimTime, packet: &Packet) {
        tracing::debug!(target: "aerosim::trace", %now, uid = packet.uid, flow = %packet.flow, bytes = packet.size_bytes, "+ tx");
    }

    fn on_receive(&mut self, now: SimTime, packet: &Packet) {
        tracing::debug!(target: "aerosim::trace", %now, uid = packet.uid, flow = %packet.flow, bytes = packet.size_bytes, "r rx");
    }

    fn on_drop(&mut self, now: SimTime, packet: &Packet, reason: DropReason) {
        tracing::debug!(target: "aerosim::trace", %now, uid = packet.uid, flow = %packet.flow, %reason, "d drop");
    }
}

/// Kind of a [`TraceRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Transmit,
    Receive,
    Drop,
}

/// One recorded notification.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceRecord {
    pub time: SimTime,
    pub kind: TraceKind,
    pub uid: u64,
    pub flow: FlowKey,
    pub size_bytes: u32,
    pub source: EntityId,
    pub destination: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DropReason>,
}

impl TraceRecord {
    fn new(time: SimTime, kind: TraceKind, packet: &Packet, reason: Option<DropReason>) -> Self {
        Self {
            time,
            kind,
            uid: packet.uid,
            flow: packet.flow,
            size_bytes: packet.size_bytes,
            source: packet.source,
            destination: packet.destination,
            reason,
        }
    }
}

/// Shared buffer of trace records.
pub type TraceBuffer = Arc<Mutex<Vec<TraceRecord>>>;

/// Appends every notification to a shared [`TraceBuffer`].
///
/// # Example
///
/// ```
/// use aerosim::observer::RecordingObserver;
///
/// let observer = RecordingObserver::new();
/// let records = observer.buffer();
/// // hand `observer` to `Simulation::add_observer`, run, then inspect `records`
/// assert!(records.lock().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct RecordingObserver {
    records: TraceBuffer,
}

impl RecordingObserver {
    /// Creates an observer with a fresh buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the buffer.
    pub fn buffer(&self) -> TraceBuffer {
        Arc::clone(&self.records)
    }
}

impl DeliveryObserver for RecordingObserver {
    fn on_transmit(&mut self, now: SimTime, packet: &Packet) {
        self.records
            .lock()
            .push(TraceRecord::new(now, TraceKind::Transmit, packet, None));
    }

    fn on_receive(&mut self, now: SimTime, packet: &Packet) {
        self.records
            .lock()
            .push(TraceRecord::new(now, TraceKind::Receive, packet, None));
    }

    fn on_drop(&mut self, now: SimTime, packet: &Packet, reason: DropReason) {
        self.records
            .lock()
            .push(TraceRecord::new(now, TraceKind::Drop, packet, Some(reason)));
    }
}

/// Writes records as JSON lines.
pub fn write_json_lines<W: Write>(records: &[TraceRecord], mut w: W) -> std::io::Result<()> {
    for record in records {
        serde_json::to_writer(&mut w, record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(w)?;
    }
    Ok(())
}
