//! Ordering and cancellation properties of the event queue and scheduler.
//!
//! Event times and operations are drawn from a seeded RNG so each case
//! covers many interleavings while staying reproducible.

use aerosim::event::EventQueue;
use aerosim::scheduler::{Scheduler, StopReason};
use aerosim::types::{EventId, SimDuration, SimTime};
use aerosim::SimError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

type Log = Vec<(SimTime, u64)>;

// ============================================================================
// Event queue
// ============================================================================

#[test]
fn test_pop_order_is_time_then_sequence() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut queue: EventQueue<u64> = EventQueue::new();

    for i in 0..2_000u64 {
        // Few distinct times, so plenty of ties.
        queue.insert(SimTime::from_nanos(rng.gen_range(0..50)), i);
    }

    let mut last: Option<(SimTime, EventId)> = None;
    while let Some(event) = queue.pop_earliest() {
        if let Some((time, id)) = last {
            assert!(
                (event.time, event.id) > (time, id),
                "{} at {} popped after {} at {}",
                event.id,
                event.time,
                id,
                time
            );
        }
        last = Some((event.time, event.id));
    }
    assert!(queue.is_empty());
}

#[test]
fn test_equal_times_keep_insertion_order() {
    let mut queue: EventQueue<&str> = EventQueue::new();
    let t = SimTime::from_millis(3);
    queue.insert(t, "first");
    queue.insert(t, "second");
    queue.insert(t, "third");

    let order: Vec<_> = std::iter::from_fn(|| queue.pop_earliest().map(|e| e.action)).collect();
    assert_eq!(order, vec!["first", "second", "third"]);
}

#[test]
fn test_cancelled_events_never_pop() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let mut queue: EventQueue<u64> = EventQueue::new();
    let mut cancelled = Vec::new();

    for i in 0..1_000u64 {
        let id = queue.insert(SimTime::from_nanos(rng.gen_range(0..10_000)), i);
        if rng.gen_bool(0.3) {
            queue.cancel(id).unwrap();
            cancelled.push(i);
        }
    }
    assert_eq!(queue.len(), 1_000 - cancelled.len());

    let mut popped = Vec::new();
    while let Some(event) = queue.pop_earliest() {
        popped.push(event.action);
    }
    assert_eq!(popped.len(), 1_000 - cancelled.len());
    for value in &cancelled {
        assert!(!popped.contains(value));
    }
}

#[test]
fn test_cancel_twice_or_after_pop_fails() {
    let mut queue: EventQueue<()> = EventQueue::new();
    let a = queue.insert(SimTime::from_nanos(1), ());
    let b = queue.insert(SimTime::from_nanos(2), ());

    queue.cancel(a).unwrap();
    assert_eq!(queue.cancel(a), Err(SimError::InvalidHandle(a)));

    let popped = queue.pop_earliest().unwrap();
    assert_eq!(popped.id, b);
    assert_eq!(queue.cancel(b), Err(SimError::InvalidHandle(b)));
    assert_eq!(
        queue.cancel(EventId::from_raw(999)),
        Err(SimError::InvalidHandle(EventId::from_raw(999)))
    );
}

// ============================================================================
// Scheduler
// ============================================================================

#[test]
fn test_clock_never_decreases() {
    let mut rng = ChaCha8Rng::seed_from_u64(23);
    let mut sched: Scheduler<Log> = Scheduler::new();
    let mut log = Log::new();

    for i in 0..500u64 {
        let at = SimTime::from_micros(rng.gen_range(0..1_000));
        sched
            .schedule_at(at, move |s, log: &mut Log| {
                log.push((s.now(), i));
                // Every third event spawns a follow-up at a random delay.
                if i % 3 == 0 {
                    let delay = SimDuration::from_nanos((i * 37 % 5_000) as i64);
                    s.schedule_after(delay, move |s, log: &mut Log| log.push((s.now(), i + 10_000)))
                        .unwrap();
                }
            })
            .unwrap();
    }

    let summary = sched.run_until(&mut log, SimTime::MAX);
    assert_eq!(summary.reason, StopReason::QueueEmpty);
    assert_eq!(summary.events_executed, log.len() as u64);
    assert!(log.windows(2).all(|pair| pair[0].0 <= pair[1].0));
}

#[test]
fn test_invalid_schedule_leaves_queue_untouched() {
    let mut sched: Scheduler<Log> = Scheduler::new();
    let mut log = Log::new();
    sched.schedule_at(SimTime::from_millis(10), |_, _| {}).unwrap();
    sched.run_until(&mut log, SimTime::from_millis(10));

    let before = sched.stats().clone();
    let pending = sched.pending();

    assert!(matches!(
        sched.schedule_after(SimDuration::from_millis(-1), |_, _| {}),
        Err(SimError::InvalidDelay(_))
    ));
    assert!(matches!(
        sched.schedule_at(SimTime::from_millis(5), |_, _| {}),
        Err(SimError::InvalidDelay(_))
    ));

    assert_eq!(sched.pending(), pending);
    assert_eq!(sched.stats(), &before);
}

#[test]
fn test_cancel_from_earlier_action_at_same_time() {
    let mut sched: Scheduler<Log> = Scheduler::new();
    let mut log = Log::new();
    let t = SimTime::from_secs(1);

    let victim = sched.schedule_at(t, |s, log: &mut Log| log.push((s.now(), 2))).unwrap();
    // Inserted later, so it runs later; the victim has already fired.
    sched
        .schedule_at(t, move |s, log: &mut Log| {
            log.push((s.now(), 1));
            assert_eq!(s.cancel(victim), Err(SimError::InvalidHandle(victim)));
        })
        .unwrap();

    sched.run_until(&mut log, t);
    assert_eq!(log, vec![(t, 2), (t, 1)]);
}

#[test]
fn test_resume_after_stop_time() {
    let mut sched: Scheduler<Log> = Scheduler::new();
    let mut log = Log::new();
    for secs in 1..=5 {
        sched
            .schedule_at(SimTime::from_secs(secs), move |s, log: &mut Log| log.push((s.now(), secs)))
            .unwrap();
    }

    let first = sched.run_until(&mut log, SimTime::from_millis(2_500));
    assert_eq!(first.reason, StopReason::StopTimeReached);
    assert_eq!(first.events_executed, 2);
    assert_eq!(sched.now(), SimTime::from_millis(2_500));

    let second = sched.run_until(&mut log, SimTime::from_secs(10));
    assert_eq!(second.reason, StopReason::QueueEmpty);
    assert_eq!(second.events_executed, 3);
    assert_eq!(sched.stats().events_executed, 5);
    assert_eq!(sched.now(), SimTime::from_secs(5));
}
