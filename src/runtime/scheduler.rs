//! The switch operation.
//!
//! This module is the only place the scheduler's `current` pointer is
//! mutated. A switch is a strict handshake: wake exactly one context, then
//! block until it yields back, so at most one execution context is ever
//! live. The switcher restores `current` to its previous value once the
//! target yields, which makes nested switches (a fiber running a fiber)
//! compose naturally.

use crate::context::{self, ResumeSignal, YieldSignal};
use crate::record::FiberRecord;
use crate::runtime::Shared;
use crate::types::FiberId;
use std::sync::mpsc;
use std::sync::Arc;
use tracing::trace;

/// Switches control into `fiber`, delivering `signal`.
///
/// Blocks the calling context until the fiber suspends or finishes.
/// `Enter` performs the `Created → Running` transition; a `Settled`
/// delivery expects the caller to have already consumed the pending wait.
pub(crate) fn switch_into(shared: &Arc<Shared>, fiber: FiberId, signal: ResumeSignal) -> YieldSignal {
    let (yield_tx, yield_rx) = mpsc::channel();

    let prev = {
        let mut state = shared.state.lock();
        let Some(rec) = state.fibers.get_mut(&fiber) else {
            return YieldSignal::Finished;
        };
        if matches!(signal, ResumeSignal::Enter) {
            rec.start_running();
        }
        rec.set_yield_tx(yield_tx);
        let woken = rec.resume_context(signal);
        let prev = state.current.replace(fiber);
        if !woken {
            // Context already gone; nothing will yield back.
            state.current = prev;
            return YieldSignal::Finished;
        }
        prev
    };

    trace!(fiber = %fiber, "switched in");
    let yielded = yield_rx.recv().unwrap_or(YieldSignal::Finished);
    trace!(fiber = %fiber, signal = ?yielded, "yielded back");

    shared.state.lock().current = prev;
    yielded
}

/// Yields control from the current fiber back to whichever context last
/// switched into it, then parks until resumed.
///
/// Returns the resume signal, or `None` if the runtime is gone.
pub(crate) fn yield_to_resumer(shared: &Arc<Shared>, fiber: FiberId) -> Option<ResumeSignal> {
    let yield_tx = {
        let mut state = shared.state.lock();
        state.fibers.get_mut(&fiber).and_then(FiberRecord::take_yield_tx)
    };
    if let Some(tx) = yield_tx {
        let _ = tx.send(YieldSignal::Suspended);
    }
    context::park_until_resumed()
}
