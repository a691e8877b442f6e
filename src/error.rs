//! Kernel error types.
//!
//! All kernel failures are local and synchronous: they are returned to the
//! calling action and never retried by the kernel itself.

use thiserror::Error;

use crate::types::{EntityId, EventId, SimDuration, SimTime};

/// Errors raised by the simulation kernel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Cancel or lookup on an unknown, executed or already cancelled event.
    #[error("invalid event handle: {0}")]
    InvalidHandle(EventId),

    /// Scheduling into the past.
    #[error("invalid delay: {0} (simulated time never decreases)")]
    InvalidDelay(SimDuration),

    /// Entity lookup miss.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// Throughput requested over a non-positive duration.
    #[error("invalid duration for throughput: {0}")]
    InvalidDuration(SimTime),

    #[error("invalid channel configuration: {0}")]
    InvalidChannel(String),

    #[error("invalid mobility configuration: {0}")]
    InvalidMobility(String),

    #[error("invalid application configuration: {0}")]
    InvalidApplication(String),
}

/// Result type for kernel operations.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SimError::InvalidHandle(EventId::from_raw(4));
        assert_eq!(err.to_string(), "invalid event handle: event#4");

        let err = SimError::NotFound(EntityId::from_raw(9));
        assert_eq!(err.to_string(), "entity not found: entity#9");

        let err = SimError::InvalidDelay(SimDuration::from_millis(-1));
        assert!(err.to_string().contains("-0.001"));
    }
}
