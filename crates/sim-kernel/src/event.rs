//! Min-time-ordered event pool with stable tie-breaking and O(1) cancellation.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::time::Time;

/// Handle to a scheduled event, usable for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

/// Pending event queue.
///
/// The heap orders by `(time_slot, insertion sequence)`, so events scheduled
/// for the same timestamp run in submission order. Cancellation removes the
/// payload from the side table; the stale heap entry is skipped at dequeue
/// rather than removed in place.
#[derive(Debug)]
pub struct EventPool<E> {
    heap: BinaryHeap<Reverse<(i64, u64)>>,
    payloads: HashMap<u64, E>,
    next_seq: u64,
    tc_slot: i64,
    te_slot: Option<i64>,
}

impl<E> EventPool<E> {
    /// Create a pool starting at `ts`. `te = None` means a continuous run.
    pub fn new(ts: i64, te: Option<i64>) -> Self {
        EventPool {
            heap: BinaryHeap::new(),
            payloads: HashMap::new(),
            next_seq: 0,
            tc_slot: ts,
            te_slot: te,
        }
    }

    /// Current time slot, advanced as events are dequeued.
    pub fn current_slot(&self) -> i64 {
        self.tc_slot
    }

    /// Insert an event.
    ///
    /// Returns `None` when the event falls beyond a finite end time (it will
    /// logically never run). Scheduling into the past is an invariant
    /// violation and aborts.
    pub fn add_event(&mut self, t: Time, payload: E) -> Option<EventId> {
        let slot = t.time_slot();
        assert!(
            slot >= self.tc_slot,
            "EventPool: scheduling into the past (t={} < tc={})",
            slot,
            self.tc_slot
        );
        if let Some(te) = self.te_slot {
            if slot > te {
                return None;
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((slot, seq)));
        self.payloads.insert(seq, payload);
        Some(EventId(seq))
    }

    /// Flag an event as cancelled. Unknown or already-fired ids are ignored.
    pub fn cancel(&mut self, id: EventId) {
        self.payloads.remove(&id.0);
    }

    /// Pop the earliest non-cancelled event and advance the current time to
    /// its timestamp. When the queue drains in a finite run, the current time
    /// advances to the end time.
    pub fn next_event(&mut self) -> Option<(i64, E)> {
        while let Some(Reverse((slot, seq))) = self.heap.pop() {
            if let Some(payload) = self.payloads.remove(&seq) {
                self.tc_slot = slot;
                return Some((slot, payload));
            }
            // cancelled entry, skip
        }
        if let Some(te) = self.te_slot {
            self.tc_slot = te;
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Number of live (non-cancelled) pending events.
    pub fn len(&self) -> usize {
        self.payloads.len()
    }
}
