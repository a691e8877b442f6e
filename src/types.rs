//! Core type definitions for the simulation kernel.
//!
//! This module defines the time representation and the opaque identifiers
//! used throughout the kernel. Simulated time is an integer nanosecond count
//! so that ordering is total and arithmetic is exact.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Nanoseconds per microsecond.
pub const NANOS_PER_MICRO: u64 = 1_000;
/// Nanoseconds per millisecond.
pub const NANOS_PER_MILLI: u64 = 1_000_000;
/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A point on the simulated timeline, in nanoseconds since epoch 0.
///
/// `SimTime` is totally ordered and never negative. Every event carries one
/// and it does not change after the event is inserted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(u64);

impl SimTime {
    /// The simulation epoch.
    pub const ZERO: SimTime = SimTime(0);
    /// The largest representable instant.
    pub const MAX: SimTime = SimTime(u64::MAX);

    /// Creates a time from nanoseconds.
    pub const fn from_nanos(nanos: u64) -> Self {
        SimTime(nanos)
    }

    /// Creates a time from microseconds, saturating at [`SimTime::MAX`].
    pub const fn from_micros(micros: u64) -> Self {
        SimTime(micros.saturating_mul(NANOS_PER_MICRO))
    }

    /// Creates a time from milliseconds, saturating at [`SimTime::MAX`].
    pub const fn from_millis(millis: u64) -> Self {
        SimTime(millis.saturating_mul(NANOS_PER_MILLI))
    }

    /// Creates a time from whole seconds, saturating at [`SimTime::MAX`].
    pub const fn from_secs(secs: u64) -> Self {
        SimTime(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Creates a time from fractional seconds, rounding to the nearest
    /// nanosecond. Negative or non-finite inputs clamp to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return SimTime::ZERO;
        }
        SimTime((secs * NANOS_PER_SEC as f64).round() as u64)
    }

    /// Returns the raw nanosecond count.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the time in fractional seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// Offsets this time by a signed duration.
    ///
    /// Returns `None` if the result would be negative or overflow.
    pub fn checked_offset(self, delta: SimDuration) -> Option<SimTime> {
        let delta = delta.as_nanos();
        if delta >= 0 {
            self.0.checked_add(delta as u64).map(SimTime)
        } else {
            self.0.checked_sub(delta.unsigned_abs()).map(SimTime)
        }
    }

    /// Adds a non-negative span, saturating at [`SimTime::MAX`].
    pub fn saturating_add(self, span: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(span.0))
    }

    /// Returns the signed distance `self - earlier`.
    pub fn since(self, earlier: SimTime) -> SimDuration {
        let nanos = self.0 as i128 - earlier.0 as i128;
        SimDuration::from_nanos(nanos.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9}s", self.as_secs_f64())
    }
}

/// A signed span of simulated time, in nanoseconds.
///
/// Spans may be negative so that callers can express (and the kernel can
/// reject) scheduling into the past.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimDuration(i64);

impl SimDuration {
    /// A zero-length span.
    pub const ZERO: SimDuration = SimDuration(0);

    /// Creates a span from nanoseconds.
    pub const fn from_nanos(nanos: i64) -> Self {
        SimDuration(nanos)
    }

    /// Creates a span from microseconds. Out-of-range values saturate.
    pub const fn from_micros(micros: i64) -> Self {
        SimDuration(micros.saturating_mul(NANOS_PER_MICRO as i64))
    }

    /// Creates a span from milliseconds. Out-of-range values saturate.
    pub const fn from_millis(millis: i64) -> Self {
        SimDuration(millis.saturating_mul(NANOS_PER_MILLI as i64))
    }

    /// Creates a span from whole seconds. Out-of-range values saturate.
    pub const fn from_secs(secs: i64) -> Self {
        SimDuration(secs.saturating_mul(NANOS_PER_SEC as i64))
    }

    /// Creates a span from fractional seconds, rounding to the nearest nanosecond.
    pub fn from_secs_f64(secs: f64) -> Self {
        SimDuration((secs * NANOS_PER_SEC as f64).round() as i64)
    }

    /// Returns the raw nanosecond count.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Returns the span in fractional seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// Returns true if the span points into the past.
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl From<SimTime> for SimDuration {
    fn from(time: SimTime) -> Self {
        SimDuration(time.as_nanos().min(i64::MAX as u64) as i64)
    }
}

impl fmt::Display for SimDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9}s", self.as_secs_f64())
    }
}

/// Stable handle to an entity in the [`EntityRegistry`](crate::entity::EntityRegistry).
///
/// Identifiers are allocated monotonically and never reused within a run,
/// so a stale handle can only miss, never alias another entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates an identifier from its raw value.
    pub const fn from_raw(raw: u64) -> Self {
        EntityId(raw)
    }

    /// Returns the raw value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Handle to a scheduled event, usable as a cancellation token.
///
/// The value is the event's insertion sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(u64);

impl EventId {
    /// Creates a handle from a raw sequence number.
    pub const fn from_raw(raw: u64) -> Self {
        EventId(raw)
    }

    /// Returns the insertion sequence number.
    pub const fn sequence(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// Identifier of a registered channel.
pub type ChannelId = usize;
