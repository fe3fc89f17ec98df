//! Two-lane resume queue.
//!
//! Resumptions waiting for delivery to suspended fibers:
//!
//! 1. Abort lane (highest priority) - cancellation wake-ups
//! 2. Ready lane - ordinary promise settlements
//!
//! Within each lane delivery is FIFO, preserving the order settlements were
//! enqueued; the abort lane is always drained first so an aborted fiber
//! resumes with its cancellation outcome ahead of unrelated settlements.

use crate::context::BoxedSettlement;
use crate::types::{FiberId, WaitToken};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A resumption waiting to be delivered to a suspended fiber.
pub(crate) enum Resumption {
    /// A promise settled; deliver its outcome to the fiber's pending wait.
    Settle {
        /// The waiting fiber.
        fiber: FiberId,
        /// The pending-wait token the settlement belongs to.
        token: WaitToken,
        /// The outcome `wait` should return.
        settlement: BoxedSettlement,
    },
    /// The fiber was aborted while suspended; wake it with the
    /// cancellation outcome.
    AbortWake {
        /// The aborted fiber.
        fiber: FiberId,
        /// The pending-wait token consumed by this wake-up.
        token: WaitToken,
    },
}

#[derive(Default)]
struct Lanes {
    abort: VecDeque<Resumption>,
    ready: VecDeque<Resumption>,
}

/// The two-lane resume queue.
#[derive(Default)]
pub(crate) struct ResumeQueue {
    lanes: Mutex<Lanes>,
}

impl ResumeQueue {
    /// Creates a new empty queue.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enqueues a resumption in its lane.
    pub(crate) fn push(&self, resumption: Resumption) {
        let mut lanes = self.lanes.lock();
        match resumption {
            r @ Resumption::AbortWake { .. } => lanes.abort.push_back(r),
            r @ Resumption::Settle { .. } => lanes.ready.push_back(r),
        }
    }

    /// Pops the next resumption to deliver: abort lane first, then ready.
    pub(crate) fn pop(&self) -> Option<Resumption> {
        let mut lanes = self.lanes.lock();
        lanes.abort.pop_front().or_else(|| lanes.ready.pop_front())
    }

    /// Returns the number of queued resumptions.
    pub(crate) fn len(&self) -> usize {
        let lanes = self.lanes.lock();
        lanes.abort.len() + lanes.ready.len()
    }

    /// Returns true if nothing is queued.
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(n: u64) -> Resumption {
        Resumption::Settle {
            fiber: FiberId::new_for_test(n),
            token: WaitToken(1),
            settlement: Ok(Box::new(())),
        }
    }

    fn abort_wake(n: u64) -> Resumption {
        Resumption::AbortWake {
            fiber: FiberId::new_for_test(n),
            token: WaitToken(1),
        }
    }

    fn fiber_of(r: &Resumption) -> FiberId {
        match r {
            Resumption::Settle { fiber, .. } | Resumption::AbortWake { fiber, .. } => *fiber,
        }
    }

    #[test]
    fn abort_lane_drains_first() {
        let queue = ResumeQueue::new();
        queue.push(settle(1));
        queue.push(abort_wake(2));
        queue.push(settle(3));

        assert_eq!(fiber_of(&queue.pop().unwrap()), FiberId::new_for_test(2));
        assert_eq!(fiber_of(&queue.pop().unwrap()), FiberId::new_for_test(1));
        assert_eq!(fiber_of(&queue.pop().unwrap()), FiberId::new_for_test(3));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn lanes_preserve_fifo_order() {
        let queue = ResumeQueue::new();
        queue.push(settle(1));
        queue.push(settle(2));
        assert_eq!(fiber_of(&queue.pop().unwrap()), FiberId::new_for_test(1));
        assert_eq!(fiber_of(&queue.pop().unwrap()), FiberId::new_for_test(2));
    }

    #[test]
    fn len_counts_both_lanes() {
        let queue = ResumeQueue::new();
        assert!(queue.is_empty());
        queue.push(settle(1));
        queue.push(abort_wake(2));
        assert_eq!(queue.len(), 2);
        assert!(!queue.is_empty());
    }
}
