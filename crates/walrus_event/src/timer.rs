//! Timer identifiers, entries and the heap ordering used by the dispatcher.

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

/// Opaque identifier returned by the scheduling calls.
///
/// Identifiers are allocated from a counter starting at 1; `0` is reserved
/// for [`TimerId::INVALID`], which is what scheduling returns when the event
/// loop is not initialised or not running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl TimerId {
    /// The null / invalid timer sentinel.
    pub const INVALID: TimerId = TimerId(0);

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is a valid (non-zero) timer id.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Timer({})", self.0)
    }
}

/// Callback owned by a timer entry.
pub(crate) enum Callback {
    /// Fires once, then the entry is gone.
    Once(Box<dyn FnOnce() + Send + 'static>),
    /// Fires every interval until cleared.
    Repeat(Arc<dyn Fn() + Send + Sync + 'static>),
}

/// A scheduled callback. Lives in the id map until it fires (one-shot) or
/// is cleared.
pub(crate) struct TimerEntry {
    pub(crate) callback: Callback,
    pub(crate) next_fire: Instant,
    /// Zero for one-shot timers.
    pub(crate) interval: Duration,
    /// Shared with in-flight fire tasks so a clear racing a fire can still
    /// suppress it if the task has not started.
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl TimerEntry {
    pub(crate) fn new(callback: Callback, next_fire: Instant, interval: Duration) -> Self {
        Self {
            callback,
            next_fire,
            interval,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Heap key. Ordered so that `BinaryHeap` pops the earliest deadline first;
/// ties break on the lower id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Deadline {
    pub(crate) at: Instant,
    pub(crate) id: TimerId,
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.at.cmp(&self.at).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;

    #[test]
    fn test_timer_id_invalid() {
        assert!(!TimerId::INVALID.is_valid());
        assert!(TimerId(1).is_valid());
        assert_eq!(TimerId(9).to_string(), "Timer(9)");
    }

    #[test]
    fn test_heap_pops_earliest_deadline_first() {
        let base = Instant::now();
        let mut heap = BinaryHeap::new();
        heap.push(Deadline {
            at: base + Duration::from_millis(30),
            id: TimerId(1),
        });
        heap.push(Deadline {
            at: base + Duration::from_millis(10),
            id: TimerId(2),
        });
        heap.push(Deadline {
            at: base + Duration::from_millis(20),
            id: TimerId(3),
        });
        heap.push(Deadline {
            at: base + Duration::from_millis(10),
            id: TimerId(4),
        });

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|d| d.id.id())).collect();
        assert_eq!(order, vec![2, 4, 3, 1]);
    }
}
