//! Fiber record and lifecycle state machine.
//!
//! Legal transitions:
//!
//! ```text
//! Created → Running                    first switch-in
//! Running → Suspended                  wait attaches a pending-wait record
//! Suspended → Running                  settlement delivered, switch back in
//! Running → Completed | Failed         task returns or raises
//! Running → AbortRequested             abort flags a running fiber
//! AbortRequested → Aborted             next wait / checkpoint acknowledges
//! Suspended → Aborted                  abort propagator, wake via abort lane
//! Created → Aborted                    abort before first switch-in
//! ```
//!
//! Terminal states (`Completed`, `Failed`, `Aborted`) are absorbing: no
//! transition ever leaves them, and an aborted fiber never reports
//! `Completed` even if its task later returns a value.

use crate::context::{BoxedSettlement, ExecutionContext, YieldSignal};
use crate::error::Error;
use crate::promise::Resolver;
use crate::types::{AbortReason, FiberId, WaitToken};
use std::sync::mpsc::Sender;

/// The state of a fiber in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FiberState {
    /// Created but not yet switched into.
    Created,
    /// Its execution context is live (or an ancestor of the live one).
    Running,
    /// Abort has been requested but the running fiber has not yet reached a
    /// suspension point to observe it.
    AbortRequested(AbortReason),
    /// Parked on a pending wait.
    Suspended,
    /// Terminal: the task returned a value.
    Completed,
    /// Terminal: the task raised an error.
    Failed,
    /// Terminal: the fiber was aborted.
    Aborted(AbortReason),
}

impl FiberState {
    /// Returns true if the fiber is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted(_))
    }

    /// Returns true if the fiber is executing (including the flagged
    /// abort-requested substate).
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running | Self::AbortRequested(_))
    }

    /// Returns true if the fiber is parked on a pending wait.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended)
    }
}

/// What the abort propagator must do for a fiber, decided by its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AbortAction {
    /// Already terminal; abort is a no-op.
    AlreadyTerminal,
    /// Abort was already requested; the first request wins.
    AlreadyRequested,
    /// Running: flagged only, observed at the next suspension check.
    Flagged,
    /// Suspended: now aborted; wake it through the abort lane so its
    /// pending wait raises the cancellation error.
    WakeSuspended(WaitToken),
    /// Aborted without a wake to deliver: the fiber never started, or its
    /// pending-wait record was lost.
    AbortedBeforeStart,
}

/// Internal record for a fiber in the runtime.
pub(crate) struct FiberRecord {
    /// Unique identifier for this fiber.
    pub id: FiberId,
    /// Current lifecycle state.
    state: FiberState,
    /// The fiber active when this one was created; abort propagation and
    /// fiber-local inheritance only, never ownership.
    pub parent: Option<FiberId>,
    /// Fibers spawned while this fiber was current. An entry is removed
    /// when the child reaches a terminal state.
    children: Vec<FiberId>,
    /// Pending-wait record: present while a wait is outstanding.
    pending: Option<WaitToken>,
    /// Token source for this fiber's waits.
    next_token: u64,
    /// The execution context carrying this fiber's stack.
    context: ExecutionContext,
    /// Where to yield control when this fiber suspends or finishes; set by
    /// the scheduler on every switch-in.
    yield_tx: Option<Sender<YieldSignal>>,
    /// Result slot: the value (`Completed`) or error (`Failed`). Empty for
    /// `Aborted`.
    result: Option<BoxedSettlement>,
    /// Settles the fiber's completion signal for waiters.
    done: Option<Resolver<()>>,
}

impl FiberRecord {
    /// Creates a new record in state `Created`.
    pub(crate) fn new(
        id: FiberId,
        parent: Option<FiberId>,
        context: ExecutionContext,
        done: Resolver<()>,
    ) -> Self {
        Self {
            id,
            state: FiberState::Created,
            parent,
            children: Vec::new(),
            pending: None,
            next_token: 0,
            context,
            yield_tx: None,
            result: None,
            done: Some(done),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub(crate) fn state(&self) -> &FiberState {
        &self.state
    }

    /// Returns true if the fiber is in a terminal state.
    #[must_use]
    pub(crate) fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns the children spawned by this fiber that are still live.
    #[must_use]
    pub(crate) fn children(&self) -> &[FiberId] {
        &self.children
    }

    /// Registers a child spawned while this fiber was current.
    pub(crate) fn add_child(&mut self, child: FiberId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    /// Removes a child that reached a terminal state.
    pub(crate) fn remove_child(&mut self, child: FiberId) {
        self.children.retain(|c| *c != child);
    }

    /// Marks the fiber running (`Created → Running`).
    ///
    /// Returns true if the state changed.
    pub(crate) fn start_running(&mut self) -> bool {
        match self.state {
            FiberState::Created => {
                self.state = FiberState::Running;
                true
            }
            _ => false,
        }
    }

    /// Begins a wait (`Running → Suspended`), issuing the pending token.
    ///
    /// This is also a suspension check: if abort was requested while the
    /// fiber ran, the request is acknowledged here (`AbortRequested →
    /// Aborted`) and the cancellation error is returned instead of a token.
    pub(crate) fn begin_wait(&mut self) -> Result<WaitToken, Error> {
        match &self.state {
            FiberState::Running => {
                self.next_token += 1;
                let token = WaitToken(self.next_token);
                self.pending = Some(token);
                self.state = FiberState::Suspended;
                Ok(token)
            }
            FiberState::AbortRequested(reason) => {
                let reason = reason.clone();
                self.state = FiberState::Aborted(reason.clone());
                Err(Error::aborted(reason))
            }
            FiberState::Aborted(reason) => Err(Error::aborted(reason.clone())),
            other => Err(Error::internal(format!(
                "wait from non-running fiber state {other:?}"
            ))),
        }
    }

    /// Consumes the pending wait for a settlement delivery
    /// (`Suspended → Running`).
    ///
    /// Returns false if the delivery is stale: the fiber is no longer
    /// suspended on this token (it was aborted, or the token was reissued),
    /// in which case the settlement must be discarded.
    pub(crate) fn resume_from_wait(&mut self, token: WaitToken) -> bool {
        if self.state == FiberState::Suspended && self.pending == Some(token) {
            self.pending = None;
            self.state = FiberState::Running;
            true
        } else {
            false
        }
    }

    /// Consumes the pending wait for an abort wake-up.
    ///
    /// Valid only for a fiber the propagator moved `Suspended → Aborted`
    /// while this token was pending. Returns the reason to deliver.
    pub(crate) fn take_abort_wake(&mut self, token: WaitToken) -> Option<AbortReason> {
        match &self.state {
            FiberState::Aborted(reason) if self.pending == Some(token) => {
                self.pending = None;
                Some(reason.clone())
            }
            _ => None,
        }
    }

    /// Requests abort of this fiber, returning what the propagator must do.
    ///
    /// Idempotent: the first request wins; later requests observe
    /// `AlreadyRequested` or `AlreadyTerminal` and have no effect.
    pub(crate) fn request_abort(&mut self, reason: AbortReason) -> AbortAction {
        match &self.state {
            FiberState::Completed | FiberState::Failed | FiberState::Aborted(_) => {
                AbortAction::AlreadyTerminal
            }
            FiberState::AbortRequested(_) => AbortAction::AlreadyRequested,
            FiberState::Running => {
                self.state = FiberState::AbortRequested(reason);
                AbortAction::Flagged
            }
            FiberState::Suspended => match self.pending {
                Some(token) => {
                    self.state = FiberState::Aborted(reason);
                    AbortAction::WakeSuspended(token)
                }
                // Suspended without a pending wait is a bookkeeping bug;
                // abort without a wake so waiters still settle.
                None => {
                    self.state = FiberState::Aborted(reason);
                    AbortAction::AbortedBeforeStart
                }
            },
            FiberState::Created => {
                self.state = FiberState::Aborted(reason);
                AbortAction::AbortedBeforeStart
            }
        }
    }

    /// Acknowledges a flagged abort outside a wait
    /// (`AbortRequested → Aborted`).
    ///
    /// This is the explicit cancellation check; returns the reason if the
    /// transition occurred.
    pub(crate) fn acknowledge_abort(&mut self) -> Option<AbortReason> {
        match &self.state {
            FiberState::AbortRequested(reason) => {
                let reason = reason.clone();
                self.state = FiberState::Aborted(reason.clone());
                Some(reason)
            }
            _ => None,
        }
    }

    /// Records the task's result, completing the fiber.
    ///
    /// `Running` becomes `Completed` or `Failed` with the result stored in
    /// the slot. A fiber that was aborted (or had abort requested) stays
    /// `Aborted` and the result is discarded: abort overrides the outcome.
    /// Returns the final state.
    pub(crate) fn finish(&mut self, result: BoxedSettlement) -> FiberState {
        match &self.state {
            FiberState::Running => {
                self.state = match &result {
                    Ok(_) => FiberState::Completed,
                    Err(_) => FiberState::Failed,
                };
                self.result = Some(result);
            }
            FiberState::AbortRequested(reason) | FiberState::Aborted(reason) => {
                let reason = reason.clone();
                self.state = FiberState::Aborted(reason);
            }
            // Created/Suspended cannot finish; keep the state observable.
            _ => {}
        }
        self.pending = None;
        self.state.clone()
    }

    /// Takes the result slot (value or error); `None` for aborted fibers
    /// or if already taken.
    pub(crate) fn take_result(&mut self) -> Option<BoxedSettlement> {
        self.result.take()
    }

    /// Takes the completion resolver, if not already settled.
    pub(crate) fn take_done(&mut self) -> Option<Resolver<()>> {
        self.done.take()
    }

    /// Stores the channel control yields back through; set on switch-in.
    pub(crate) fn set_yield_tx(&mut self, tx: Sender<YieldSignal>) {
        self.yield_tx = Some(tx);
    }

    /// Takes the yield channel for this slice of execution.
    pub(crate) fn take_yield_tx(&mut self) -> Option<Sender<YieldSignal>> {
        self.yield_tx.take()
    }

    /// Wakes this fiber's context with `signal`.
    ///
    /// Returns false if the context is gone.
    pub(crate) fn resume_context(&self, signal: crate::context::ResumeSignal) -> bool {
        self.context.resume(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AbortKind;

    fn record() -> FiberRecord {
        let (done, _promise) = crate::promise::Promise::<()>::pair();
        FiberRecord::new(FiberId::next(), None, ExecutionContext::inert(), done)
    }

    #[test]
    fn start_running_only_from_created() {
        let mut rec = record();
        assert!(matches!(rec.state(), FiberState::Created));
        assert!(rec.start_running());
        assert!(!rec.start_running());
        assert!(matches!(rec.state(), FiberState::Running));
    }

    #[test]
    fn begin_wait_suspends_and_issues_fresh_tokens() {
        let mut rec = record();
        rec.start_running();

        let t1 = rec.begin_wait().unwrap();
        assert!(rec.state().is_suspended());
        assert!(rec.resume_from_wait(t1));
        assert!(matches!(rec.state(), FiberState::Running));

        let t2 = rec.begin_wait().unwrap();
        assert_ne!(t1, t2);
    }

    #[test]
    fn stale_token_does_not_resume() {
        let mut rec = record();
        rec.start_running();
        let t1 = rec.begin_wait().unwrap();
        assert!(rec.resume_from_wait(t1));

        let _t2 = rec.begin_wait().unwrap();
        // Old token must not consume the new wait.
        assert!(!rec.resume_from_wait(t1));
        assert!(rec.state().is_suspended());
    }

    #[test]
    fn abort_of_suspended_fiber_wakes_through_pending_token() {
        let mut rec = record();
        rec.start_running();
        let token = rec.begin_wait().unwrap();

        let action = rec.request_abort(AbortReason::user("stop"));
        assert_eq!(action, AbortAction::WakeSuspended(token));
        assert!(matches!(rec.state(), FiberState::Aborted(_)));

        // The promise's own settlement is now stale.
        assert!(!rec.resume_from_wait(token));
        // The abort wake consumes the pending record exactly once.
        let reason = rec.take_abort_wake(token).unwrap();
        assert_eq!(reason.kind, AbortKind::User);
        assert!(rec.take_abort_wake(token).is_none());
    }

    #[test]
    fn abort_of_running_fiber_only_flags() {
        let mut rec = record();
        rec.start_running();

        assert_eq!(
            rec.request_abort(AbortReason::user("stop")),
            AbortAction::Flagged
        );
        assert!(rec.state().is_running());

        // Next suspension check observes the flag and unwinds.
        let err = rec.begin_wait().unwrap_err();
        assert!(err.is_aborted());
        assert!(matches!(rec.state(), FiberState::Aborted(_)));
    }

    #[test]
    fn abort_is_idempotent() {
        let mut rec = record();
        rec.start_running();
        rec.begin_wait().unwrap();

        assert!(matches!(
            rec.request_abort(AbortReason::user("first")),
            AbortAction::WakeSuspended(_)
        ));
        assert_eq!(
            rec.request_abort(AbortReason::user("second")),
            AbortAction::AlreadyTerminal
        );
        match rec.state() {
            FiberState::Aborted(reason) => assert_eq!(reason.message, Some("first")),
            other => panic!("expected Aborted, got {other:?}"),
        }
    }

    #[test]
    fn abort_before_start_never_enters_context() {
        let mut rec = record();
        assert_eq!(
            rec.request_abort(AbortReason::parent()),
            AbortAction::AbortedBeforeStart
        );
        assert!(rec.is_terminal());
        assert!(!rec.start_running());
    }

    #[test]
    fn finish_stores_value_and_completes() {
        let mut rec = record();
        rec.start_running();
        let state = rec.finish(Ok(Box::new(7_i32)));
        assert_eq!(state, FiberState::Completed);

        let value = rec.take_result().unwrap().unwrap();
        assert_eq!(*value.downcast::<i32>().unwrap(), 7);
        assert!(rec.take_result().is_none());
    }

    #[test]
    fn finish_stores_error_and_fails() {
        let mut rec = record();
        rec.start_running();
        let state = rec.finish(Err(Error::task("boom")));
        assert_eq!(state, FiberState::Failed);
        match rec.take_result().unwrap() {
            Err(err) => assert_eq!(err, Error::task("boom")),
            Ok(_) => panic!("expected the stored error"),
        }
    }

    #[test]
    fn abort_overrides_normal_return() {
        let mut rec = record();
        rec.start_running();
        rec.request_abort(AbortReason::user("stop"));

        // Task returned a value anyway; the fiber must not report Completed.
        let state = rec.finish(Ok(Box::new(1_i32)));
        assert!(matches!(state, FiberState::Aborted(_)));
        assert!(rec.take_result().is_none());
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let mut rec = record();
        rec.start_running();
        rec.finish(Ok(Box::new(())));

        assert_eq!(
            rec.request_abort(AbortReason::user("late")),
            AbortAction::AlreadyTerminal
        );
        assert_eq!(rec.finish(Err(Error::task("late"))), FiberState::Completed);
        assert!(rec.begin_wait().is_err());
    }

    #[test]
    fn acknowledge_abort_transitions_flagged_fiber() {
        let mut rec = record();
        rec.start_running();
        assert!(rec.acknowledge_abort().is_none());

        rec.request_abort(AbortReason::user("stop"));
        let reason = rec.acknowledge_abort().unwrap();
        assert_eq!(reason.message, Some("stop"));
        assert!(matches!(rec.state(), FiberState::Aborted(_)));
        assert!(rec.acknowledge_abort().is_none());
    }

    #[test]
    fn child_bookkeeping_is_set_like() {
        let mut rec = record();
        let a = FiberId::next();
        let b = FiberId::next();
        rec.add_child(a);
        rec.add_child(a);
        rec.add_child(b);
        assert_eq!(rec.children(), &[a, b]);

        rec.remove_child(a);
        assert_eq!(rec.children(), &[b]);
    }
}
