//! The discrete-event scheduler.
//!
//! A [`Scheduler`] owns the simulated clock and the pending [`EventQueue`].
//! It repeatedly pops the earliest event, advances the clock to the event's
//! time and runs the event's action to completion before looking at the next
//! one. Actions receive the scheduler itself, so they can schedule follow-up
//! events, cancel pending ones or request a stop, and a mutable reference to
//! the context `C` that holds the simulated world.
//!
//! All observable ordering is sequential: there is exactly one action in
//! flight at any time, so no locking is needed on the context.
//!
//! # Example
//!
//! ```
//! use aerosim::scheduler::Scheduler;
//! use aerosim::types::{SimDuration, SimTime};
//!
//! let mut sched: Scheduler<Vec<u64>> = Scheduler::new();
//! let mut log = Vec::new();
//!
//! sched
//!     .schedule_at(SimTime::from_millis(5), |s, log: &mut Vec<u64>| {
//!         log.push(s.now().as_nanos());
//!         s.schedule_after(SimDuration::from_millis(1), |s, log: &mut Vec<u64>| {
//!             log.push(s.now().as_nanos());
//!         })
//!         .unwrap();
//!     })
//!     .unwrap();
//!
//! sched.run_until(&mut log, SimTime::from_secs(1));
//! assert_eq!(log, vec![5_000_000, 6_000_000]);
//! ```

use std::fmt;

use serde::Serialize;

use crate::error::{SimError, SimResult};
use crate::event::EventQueue;
use crate::types::{EventId, SimDuration, SimTime};

/// A deferred computation executed by the scheduler.
pub type Action<C> = Box<dyn FnOnce(&mut Scheduler<C>, &mut C)>;

/// Why a call to [`Scheduler::run_until`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// No events remain.
    QueueEmpty,
    /// The next event lies after the requested stop time.
    StopTimeReached,
    /// An action called [`Scheduler::stop`].
    StopRequested,
}

/// Outcome of a single [`Scheduler::run_until`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Why the run ended
    pub reason: StopReason,
    /// Clock value when the run ended
    pub final_time: SimTime,
    /// Number of actions executed during this call
    pub events_executed: u64,
}

/// Cumulative scheduler counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Events inserted into the queue
    pub events_scheduled: u64,
    /// Events whose action ran
    pub events_executed: u64,
    /// Events cancelled before firing
    pub events_cancelled: u64,
    /// Largest number of live events seen at once
    pub peak_queue_size: usize,
}

/// Drives the event queue and the simulated clock.
pub struct Scheduler<C> {
    /// Pending events
    queue: EventQueue<Action<C>>,
    /// Current simulated time; never decreases
    now: SimTime,
    /// Set by `stop()`, honoured after the running action returns
    stop_requested: bool,
    /// Statistics
    stats: SchedulerStats,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self {
            queue: EventQueue::new(),
            now: SimTime::ZERO,
            stop_requested: false,
            stats: SchedulerStats::default(),
        }
    }
}

impl<C> fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now)
            .field("pending", &self.queue.len())
            .field("stop_requested", &self.stop_requested)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<C> Scheduler<C> {
    /// Creates a scheduler with the clock at zero and an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedules `action` at an absolute time.
    ///
    /// # Errors
    /// [`SimError::InvalidDelay`] if `time` is earlier than [`now`](Self::now).
    /// The queue is left untouched in that case.
    pub fn schedule_at<F>(&mut self, time: SimTime, action: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut Scheduler<C>, &mut C) + 'static,
    {
        if time < self.now {
            return Err(SimError::InvalidDelay(time.since(self.now)));
        }
        Ok(self.insert(time, Box::new(action)))
    }

    /// Schedules `action` to fire `delay` after the current time.
    ///
    /// # Errors
    /// [`SimError::InvalidDelay`] if `delay` is negative or the target time
    /// overflows the clock. The queue is left untouched in that case.
    pub fn schedule_after<F>(&mut self, delay: SimDuration, action: F) -> SimResult<EventId>
    where
        F: FnOnce(&mut Scheduler<C>, &mut C) + 'static,
    {
        if delay.is_negative() {
            return Err(SimError::InvalidDelay(delay));
        }
        let time = self
            .now
            .checked_offset(delay)
            .ok_or(SimError::InvalidDelay(delay))?;
        Ok(self.insert(time, Box::new(action)))
    }

    fn insert(&mut self, time: SimTime, action: Action<C>) -> EventId {
        let id = self.queue.insert(time, action);
        self.stats.events_scheduled += 1;
        self.stats.peak_queue_size = self.stats.peak_queue_size.max(self.queue.len());
        id
    }

    /// Cancels a pending event.
    ///
    /// # Errors
    /// [`SimError::InvalidHandle`] if the event already ran or was cancelled.
    pub fn cancel(&mut self, id: EventId) -> SimResult<()> {
        self.queue.cancel(id)?;
        self.stats.events_cancelled += 1;
        tracing::trace!(target: "aerosim::scheduler", %id, "event cancelled");
        Ok(())
    }

    /// Returns true if the event has neither run nor been cancelled.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.queue.is_pending(id)
    }

    /// Requests that the current run ends once the running action returns.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    /// Returns the number of live pending events.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Returns the time of the next live event, if any.
    pub fn next_event_time(&mut self) -> Option<SimTime> {
        self.queue.peek_time()
    }

    /// Returns the cumulative statistics.
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Runs events in `(time, sequence)` order until the queue is empty,
    /// the next event lies after `stop_time`, or an action calls
    /// [`stop`](Self::stop).
    ///
    /// Events scheduled exactly at `stop_time` are executed. When the run
    /// ends on the stop time, the clock is advanced to `stop_time`; pending
    /// later events remain queued for a subsequent call.
    ///
    /// # Arguments
    /// * `ctx` - The context handed to every action
    /// * `stop_time` - Inclusive upper bound for event times
    pub fn run_until(&mut self, ctx: &mut C, stop_time: SimTime) -> RunSummary {
        self.stop_requested = false;
        let mut executed = 0u64;

        let reason = loop {
            match self.queue.peek_time() {
                None => break StopReason::QueueEmpty,
                Some(time) if time > stop_time => break StopReason::StopTimeReached,
                Some(_) => {}
            }

            let Some(event) = self.queue.pop_earliest() else {
                break StopReason::QueueEmpty;
            };
            debug_assert!(event.time >= self.now, "clock would move backwards");
            self.now = event.time;

            tracing::trace!(target: "aerosim::scheduler", id = %event.id, time = %event.time, "executing event");
            (event.action)(self, ctx);
            executed += 1;
            self.stats.events_executed += 1;

            if self.stop_requested {
                self.stop_requested = false;
                break StopReason::StopRequested;
            }
        };

        if reason == StopReason::StopTimeReached && self.now < stop_time {
            self.now = stop_time;
        }

        RunSummary {
            reason,
            final_time: self.now,
            events_executed: executed,
        }
    }

    /// Discards all pending events. The clock is left where it is.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
