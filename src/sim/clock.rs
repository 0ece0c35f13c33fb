//! Virtual-time event scheduler.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::error::SchedulingError;

/// Handle to a scheduled event, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

struct Entry<E> {
    time: f64,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for Entry<E> {}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap by (time, seq).
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of future events keyed by `(time, insertion sequence)`.
///
/// Events at the same virtual time fire in the order they were scheduled.
/// Cancellation marks an event dead; it is discarded when it reaches the
/// head of the queue instead of being searched for.
///
/// # Examples
///
/// ```
/// use fleet_power_sim::sim::clock::Scheduler;
///
/// let mut sched = Scheduler::new();
/// sched.schedule(5.0, "b").unwrap();
/// sched.schedule(1.0, "a").unwrap();
/// let cancelled = sched.schedule(3.0, "x").unwrap();
/// assert!(sched.cancel(cancelled));
///
/// let mut fired = Vec::new();
/// sched.run_until(10.0, |_, ev| -> Result<(), ()> {
///     fired.push(ev);
///     Ok(())
/// }).unwrap();
/// assert_eq!(fired, vec!["a", "b"]);
/// assert_eq!(sched.now(), 10.0);
/// ```
pub struct Scheduler<E> {
    now: f64,
    next_seq: u64,
    queue: BinaryHeap<Entry<E>>,
    live: HashSet<u64>,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    /// Creates an empty scheduler at virtual time zero.
    pub fn new() -> Self {
        Self {
            now: 0.0,
            next_seq: 0,
            queue: BinaryHeap::new(),
            live: HashSet::new(),
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Enqueues `event` at `now + delay`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulingError` if `delay` is negative or non-finite.
    pub fn schedule(&mut self, delay: f64, event: E) -> Result<EventId, SchedulingError> {
        if !delay.is_finite() {
            return Err(SchedulingError::NonFinite);
        }
        self.schedule_at(self.now + delay, event)
    }

    /// Enqueues `event` at absolute time `time`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulingError` if `time` is before the current time or
    /// non-finite.
    pub fn schedule_at(&mut self, time: f64, event: E) -> Result<EventId, SchedulingError> {
        if !time.is_finite() {
            return Err(SchedulingError::NonFinite);
        }
        if time < self.now {
            return Err(SchedulingError::InPast {
                requested: time,
                now: self.now,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Entry { time, seq, event });
        self.live.insert(seq);
        Ok(EventId(seq))
    }

    /// Cancels a pending event.
    ///
    /// # Returns
    ///
    /// `true` if the event was pending, `false` if it already fired or was
    /// already cancelled.
    pub fn cancel(&mut self, id: EventId) -> bool {
        self.live.remove(&id.0)
    }

    /// Time of the earliest live event.
    pub fn peek_time(&mut self) -> Option<f64> {
        self.discard_dead_head();
        self.queue.peek().map(|e| e.time)
    }

    /// Removes the earliest live event and advances the clock to its time.
    pub fn pop_next(&mut self) -> Option<(EventId, f64, E)> {
        self.discard_dead_head();
        let entry = self.queue.pop()?;
        self.live.remove(&entry.seq);
        self.now = entry.time;
        Some((EventId(entry.seq), entry.time, entry.event))
    }

    /// Fires every event strictly before `horizon` in order, then moves the
    /// clock to `horizon`.
    ///
    /// The handler receives the scheduler so it can enqueue continuations.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first error produced by `handler`.
    pub fn run_until<F, Er>(&mut self, horizon: f64, mut handler: F) -> Result<u64, Er>
    where
        F: FnMut(&mut Self, E) -> Result<(), Er>,
    {
        let mut fired = 0;
        while let Some(t) = self.peek_time() {
            if t >= horizon {
                break;
            }
            if let Some((_, _, event)) = self.pop_next() {
                handler(self, event)?;
                fired += 1;
            }
        }
        if horizon.is_finite() && self.now < horizon {
            self.now = horizon;
        }
        Ok(fired)
    }

    /// Number of live pending events.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn discard_dead_head(&mut self) {
        while let Some(head) = self.queue.peek() {
            if self.live.contains(&head.seq) {
                break;
            }
            self.queue.pop();
        }
    }
}
