//! Event definitions and the pending-event queue.
//!
//! Events carry a timestamp, an insertion sequence number and an action.
//! The [`EventQueue`] orders them strictly by `(time, sequence)`, which makes
//! equal-time events come out in insertion order and keeps repeated runs
//! bit-identical.
//!
//! # Example
//!
//! ```
//! use aerosim::event::EventQueue;
//! use aerosim::types::SimTime;
//!
//! let mut queue = EventQueue::new();
//! let late = queue.insert(SimTime::from_millis(20), "late");
//! queue.insert(SimTime::from_millis(10), "early");
//! queue.cancel(late).unwrap();
//!
//! assert_eq!(queue.pop_earliest().unwrap().action, "early");
//! assert!(queue.pop_earliest().is_none());
//! ```

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use crate::error::{SimError, SimResult};
use crate::types::{EventId, SimTime};

/// A scheduled event.
///
/// Events are never mutated after insertion. Cancellation removes the
/// action from the queue and leaves the ordering entry as a tombstone.
#[derive(Debug)]
pub struct Event<A> {
    /// The simulation time at which this event fires
    pub time: SimTime,
    /// The handle returned at insertion; also the tie-break sequence
    pub id: EventId,
    /// The deferred computation
    pub action: A,
}

/// Tombstone count below which the heap is never compacted.
const COMPACT_THRESHOLD: usize = 64;

/// Ordering key of a queued event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct EventKey {
    time: SimTime,
    sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of pending events.
///
/// Cancelled events stay in the heap as tombstones until they reach the
/// front, where [`pop_earliest`](Self::pop_earliest) and
/// [`peek_time`](Self::peek_time) discard them. Once tombstones outnumber
/// live events the heap is compacted, so memory stays proportional to
/// [`len`](Self::len).
#[derive(Debug)]
pub struct EventQueue<A> {
    /// Min-heap over ordering keys (tombstones included)
    heap: BinaryHeap<Reverse<EventKey>>,
    /// Live actions by sequence number
    pending: HashMap<u64, A>,
    /// Next sequence number to hand out
    next_sequence: u64,
}

impl<A> Default for EventQueue<A> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            next_sequence: 0,
        }
    }
}

impl<A> EventQueue<A> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an action to fire at `time` and returns its handle.
    pub fn insert(&mut self, time: SimTime, action: A) -> EventId {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Reverse(EventKey { time, sequence }));
        self.pending.insert(sequence, action);
        EventId::from_raw(sequence)
    }

    /// Removes and returns the earliest live event, skipping tombstones.
    pub fn pop_earliest(&mut self) -> Option<Event<A>> {
        while let Some(Reverse(key)) = self.heap.pop() {
            if let Some(action) = self.pending.remove(&key.sequence) {
                return Some(Event {
                    time: key.time,
                    id: EventId::from_raw(key.sequence),
                    action,
                });
            }
        }
        None
    }

    /// Returns the time of the earliest live event.
    ///
    /// Takes `&mut self` because tombstones found at the front are purged.
    pub fn peek_time(&mut self) -> Option<SimTime> {
        while let Some(Reverse(key)) = self.heap.peek().copied() {
            if self.pending.contains_key(&key.sequence) {
                return Some(key.time);
            }
            self.heap.pop();
        }
        None
    }

    /// Cancels a pending event.
    ///
    /// # Errors
    /// [`SimError::InvalidHandle`] if the event was already executed,
    /// already cancelled, or never issued by this queue.
    pub fn cancel(&mut self, id: EventId) -> SimResult<()> {
        if self.pending.remove(&id.sequence()).is_none() {
            return Err(SimError::InvalidHandle(id));
        }
        if self.tombstones() > self.pending.len().max(COMPACT_THRESHOLD) {
            self.compact();
        }
        Ok(())
    }

    /// Returns the number of cancelled entries still held in the heap.
    pub fn tombstones(&self) -> usize {
        self.heap.len() - self.pending.len()
    }

    fn compact(&mut self) {
        let pending = &self.pending;
        self.heap.retain(|Reverse(key)| pending.contains_key(&key.sequence));
    }

    /// Returns true if the event is still waiting to fire.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.pending.contains_key(&id.sequence())
    }

    /// Returns the number of live (non-cancelled) events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if no live events remain.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops every pending event.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.pending.clear();
    }
}
