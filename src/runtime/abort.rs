//! The abort propagator.
//!
//! Aborting a fiber cancels its whole subtree as one operation: every
//! member is transitioned under a single lock acquisition, so no promise
//! settlement can interleave with a partially-aborted tree. Suspended
//! members are woken through the abort lane with a cancellation outcome and
//! their eventual promise settlements become stale; running members are
//! flagged and observe the abort at their next suspension check; terminal
//! members are skipped. Waiters on aborted members are rejected
//! immediately so nobody awaiting the subtree can hang.

use crate::error::Error;
use crate::promise::Resolver;
use crate::record::AbortAction;
use crate::runtime::queue::Resumption;
use crate::runtime::Shared;
use crate::types::{AbortReason, FiberId, WaitToken};
use std::sync::Arc;
use tracing::debug;

/// Aborts `root` and every fiber transitively spawned inside it.
///
/// Returns true if any fiber's state changed (false when the whole subtree
/// was already terminal, making repeated aborts observable no-ops).
pub(crate) fn abort_tree(shared: &Arc<Shared>, root: FiberId, reason: AbortReason) -> bool {
    let mut wakes: Vec<(FiberId, WaitToken)> = Vec::new();
    let mut rejections: Vec<(Resolver<()>, AbortReason)> = Vec::new();
    let mut requested = false;

    {
        let mut state = shared.state.lock();
        let mut stack = vec![(root, reason)];
        let mut detached: Vec<(Option<FiberId>, FiberId)> = Vec::new();

        while let Some((id, reason)) = stack.pop() {
            let Some(rec) = state.fibers.get_mut(&id) else {
                continue;
            };
            // Children are independent; each is aborted for the cascading
            // reason regardless of what triggered the root.
            for child in rec.children().to_vec() {
                stack.push((child, AbortReason::parent()));
            }
            match rec.request_abort(reason.clone()) {
                AbortAction::AlreadyTerminal | AbortAction::AlreadyRequested => {}
                AbortAction::Flagged => {
                    debug!(fiber = %id, %reason, "abort flagged for running fiber");
                    requested = true;
                }
                AbortAction::WakeSuspended(token) => {
                    debug!(fiber = %id, %reason, "aborted suspended fiber");
                    requested = true;
                    wakes.push((id, token));
                    if let Some(done) = rec.take_done() {
                        rejections.push((done, reason.clone()));
                    }
                    detached.push((rec.parent, id));
                }
                AbortAction::AbortedBeforeStart => {
                    debug!(fiber = %id, %reason, "aborted fiber before first entry");
                    requested = true;
                    if let Some(done) = rec.take_done() {
                        rejections.push((done, reason.clone()));
                    }
                    detached.push((rec.parent, id));
                }
            }
        }

        for (parent, child) in detached {
            if let Some(rec) = parent.and_then(|p| state.fibers.get_mut(&p)) {
                rec.remove_child(child);
            }
        }
    }

    // Settle waiters and enqueue wake-ups outside the lock: rejecting a
    // completion signal runs its subscriber callback.
    for (done, reason) in rejections {
        done.reject(Error::aborted(reason));
    }
    for (fiber, token) in wakes {
        shared.queue.push(Resumption::AbortWake { fiber, token });
    }

    requested
}
