//! Fiber operations: spawn, wait, checkpoint, abort.
//!
//! These free functions operate on the current fiber, discovered through
//! thread-local state. [`run`] spawns a child of the current fiber (or a
//! root fiber when called from the host thread) and switches into it
//! synchronously; [`wait`] is the single suspension primitive; [`checkpoint`]
//! is the explicit cancellation check for long computations that do not
//! otherwise suspend.
//!
//! A spawned fiber runs immediately, as part of the `run` call, up to its
//! first `wait` or to termination. Control returns to the spawner at that
//! point with a [`FiberHandle`] for observing and joining the fiber.

use crate::context::{BoxedSettlement, ExecutionContext, ResumeSignal};
use crate::error::Error;
use crate::promise::Promise;
use crate::record::{FiberRecord, FiberState};
use crate::runtime::queue::Resumption;
use crate::runtime::{self, scheduler, Shared};
use crate::types::{AbortReason, FiberId, Outcome};
use std::any::Any;
use std::cell::Cell;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

thread_local! {
    /// The fiber whose stack lives on this thread, if any.
    static CURRENT_FIBER: Cell<Option<FiberId>> = const { Cell::new(None) };
}

/// Returns the id of the current fiber, or `None` on the host thread.
#[must_use]
pub fn current() -> Option<FiberId> {
    CURRENT_FIBER.get()
}

/// Spawns a fiber on the runtime installed on this thread and switches into
/// it synchronously.
///
/// When called from inside a fiber, the new fiber is registered as its
/// child: aborting the parent cascades into it. When called from the host
/// thread it is a root fiber.
///
/// By the time `run` returns, the fiber has executed up to its first
/// suspension point or to termination; a task that never waits runs to
/// completion here.
///
/// # Errors
///
/// Fails with `ErrorKind::NoRuntime` if no runtime is installed on this
/// thread, or `ErrorKind::Spawn` if the execution context could not be
/// created.
pub fn run<T, F>(task: F) -> Result<FiberHandle<T>, Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    let shared = runtime::installed_shared().ok_or_else(Error::no_runtime)?;
    run_on(&shared, task)
}

/// Spawns a fiber on `shared` and switches into it. See [`run`].
pub(crate) fn run_on<T, F>(shared: &Arc<Shared>, task: F) -> Result<FiberHandle<T>, Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    let id = FiberId::next();
    let parent = current();
    let (done_resolver, done_promise) = Promise::<()>::pair();

    let context = {
        let shared = shared.clone();
        ExecutionContext::spawn(
            format!("{}-{}", shared.config.name_prefix, id),
            shared.config.stack_size,
            move || fiber_main(shared, id, task),
        )?
    };

    {
        let mut state = shared.state.lock();
        state
            .fibers
            .insert(id, FiberRecord::new(id, parent, context, done_resolver));
        if let Some(rec) = parent.and_then(|p| state.fibers.get_mut(&p)) {
            rec.add_child(id);
        }
    }
    debug!(fiber = %id, parent = ?parent, "spawned fiber");

    scheduler::switch_into(shared, id, ResumeSignal::Enter);

    Ok(FiberHandle {
        id,
        shared: shared.clone(),
        done: Some(done_promise),
        _result: PhantomData,
    })
}

/// The body of every execution context: run the task, record its terminal
/// state, settle the completion signal, and yield control for the last time.
fn fiber_main<T, F>(shared: Arc<Shared>, id: FiberId, task: F)
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    CURRENT_FIBER.set(Some(id));
    runtime::install(shared.clone());

    let result: BoxedSettlement = match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(value)) => Ok(Box::new(value) as Box<dyn Any + Send>),
        Ok(Err(err)) => Err(err),
        Err(payload) => Err(Error::task_panicked(panic_message(payload.as_ref()))),
    };
    // Kept for the completion signal; the record's slot owns the original.
    let failure = result.as_ref().err().cloned();

    let (final_state, done, yield_tx) = {
        let mut state = shared.state.lock();
        let Some(rec) = state.fibers.get_mut(&id) else {
            error!(fiber = %id, "fiber record vanished before completion");
            return;
        };
        let final_state = rec.finish(result);
        let done = rec.take_done();
        let yield_tx = rec.take_yield_tx();
        let parent = rec.parent;
        if let Some(rec) = parent.and_then(|p| state.fibers.get_mut(&p)) {
            rec.remove_child(id);
        }
        (final_state, done, yield_tx)
    };
    debug!(fiber = %id, state = ?final_state, "fiber finished");

    // For an aborted fiber the propagator may already have rejected the
    // completion signal; `done` is then absent.
    if let Some(done) = done {
        match &final_state {
            FiberState::Completed => {
                done.fulfill(());
            }
            FiberState::Failed => {
                done.reject(failure.unwrap_or_else(|| Error::internal("failed without error")));
            }
            FiberState::Aborted(reason) => {
                done.reject(Error::aborted(reason.clone()));
            }
            _ => {}
        }
    }

    runtime::uninstall(&shared);
    CURRENT_FIBER.set(None);
    if let Some(tx) = yield_tx {
        let _ = tx.send(crate::context::YieldSignal::Finished);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Suspends the current fiber until `promise` settles, returning the
/// settlement.
///
/// This is the runtime's only suspension primitive. It consumes the
/// promise, subscribing to its settlement, and yields control; the fiber
/// resumes once the host delivers the queued settlement. A promise that has
/// already settled still suspends: its settlement is enqueued like any
/// other, so control always passes through the runtime at least once per
/// wait.
///
/// # Errors
///
/// - `ErrorKind::NotInFiber` when called outside any fiber
/// - `ErrorKind::Aborted` if the fiber was aborted while running (the
///   pending abort is observed here) or while suspended on this wait
/// - the promise's own rejection error, propagated verbatim
pub fn wait<T: Send + 'static>(promise: Promise<T>) -> Result<T, Error> {
    let id = current().ok_or_else(Error::not_in_fiber)?;
    let shared = runtime::installed_shared().ok_or_else(Error::no_runtime)?;

    let token = {
        let mut state = shared.state.lock();
        let rec = state
            .fibers
            .get_mut(&id)
            .ok_or_else(|| Error::internal("current fiber has no record"))?;
        rec.begin_wait()?
    };

    {
        let shared = shared.clone();
        promise.subscribe(move |settlement| {
            let settlement: BoxedSettlement =
                settlement.map(|value| Box::new(value) as Box<dyn Any + Send>);
            shared.queue.push(Resumption::Settle {
                fiber: id,
                token,
                settlement,
            });
        });
    }

    match scheduler::yield_to_resumer(&shared, id) {
        Some(ResumeSignal::Settled(Ok(boxed))) => match boxed.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(_) => Err(Error::internal("settlement type mismatch")),
        },
        Some(ResumeSignal::Settled(Err(err))) => Err(err),
        Some(ResumeSignal::Enter) => Err(Error::internal("re-entered suspended fiber")),
        // Resume channel gone: the runtime dropped this fiber.
        None => Err(Error::aborted(AbortReason::shutdown())),
    }
}

/// Explicit cancellation check for the current fiber.
///
/// A fiber aborted while running only observes the abort at its next
/// suspension point; a long computation that never waits calls `checkpoint`
/// periodically to stay abortable.
///
/// # Errors
///
/// - `ErrorKind::NotInFiber` when called outside any fiber
/// - `ErrorKind::Aborted` if abort was requested; the caller propagates it
pub fn checkpoint() -> Result<(), Error> {
    let id = current().ok_or_else(Error::not_in_fiber)?;
    let shared = runtime::installed_shared().ok_or_else(Error::no_runtime)?;

    let reason = {
        let mut state = shared.state.lock();
        state
            .fibers
            .get_mut(&id)
            .and_then(FiberRecord::acknowledge_abort)
    };
    match reason {
        Some(reason) => Err(Error::aborted(reason)),
        None => Ok(()),
    }
}

/// Aborts `fiber` and its whole subtree on the runtime installed on this
/// thread.
///
/// Returns true if any fiber's state changed. See [`FiberHandle::abort`]
/// for the semantics.
///
/// # Errors
///
/// Fails with `ErrorKind::NoRuntime` if no runtime is installed.
pub fn abort(fiber: FiberId, reason: AbortReason) -> Result<bool, Error> {
    let shared = runtime::installed_shared().ok_or_else(Error::no_runtime)?;
    Ok(runtime::abort::abort_tree(&shared, fiber, reason))
}

/// Owner's handle to a spawned fiber.
///
/// Observes the fiber's state, takes its terminal outcome, aborts it, or
/// joins it from inside another fiber with [`FiberHandle::wait`].
pub struct FiberHandle<T> {
    id: FiberId,
    shared: Arc<Shared>,
    done: Option<Promise<()>>,
    _result: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> FiberHandle<T> {
    /// Returns the fiber's id.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.id
    }

    /// Returns the fiber's current state.
    #[must_use]
    pub fn state(&self) -> Option<FiberState> {
        self.shared
            .state
            .lock()
            .fibers
            .get(&self.id)
            .map(|rec| rec.state().clone())
    }

    /// Returns true if the fiber has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state().is_some_and(|s| s.is_terminal())
    }

    /// Aborts the fiber and its whole subtree.
    ///
    /// Idempotent: the first abort wins and later requests are observable
    /// no-ops. A suspended fiber is woken immediately with the cancellation
    /// outcome (its pending settlement becomes stale); a running fiber is
    /// flagged and observes the abort at its next suspension point; a
    /// terminal fiber is untouched. Returns true if any state changed.
    pub fn abort(&self, reason: AbortReason) -> bool {
        runtime::abort::abort_tree(&self.shared, self.id, reason)
    }

    /// Takes the fiber's terminal outcome, if it has one.
    ///
    /// Returns `None` while the fiber is live. The completion value (or
    /// failure error) can be taken once; the abort outcome is repeatable
    /// since the reason lives in the terminal state itself.
    #[must_use]
    pub fn take_outcome(&self) -> Option<Outcome<T>> {
        let mut state = self.shared.state.lock();
        let rec = state.fibers.get_mut(&self.id)?;
        match rec.state().clone() {
            FiberState::Completed => match rec.take_result()? {
                Ok(boxed) => boxed.downcast::<T>().ok().map(|v| Outcome::Completed(*v)),
                Err(_) => None,
            },
            FiberState::Failed => match rec.take_result()? {
                Err(err) => Some(Outcome::Failed(err)),
                Ok(_) => None,
            },
            FiberState::Aborted(reason) => Some(Outcome::Aborted(reason)),
            _ => None,
        }
    }

    /// Takes the fiber's completion promise.
    ///
    /// The promise fulfills when the fiber completes and rejects with the
    /// failure or cancellation error otherwise. Subscribing to it is the
    /// promise-like observation path for callers outside any fiber, where
    /// [`FiberHandle::wait`] cannot suspend. One-shot: the joining `wait`
    /// consumes the same promise, so only the first taker gets it.
    #[must_use]
    pub fn completion(&mut self) -> Option<Promise<()>> {
        self.done.take()
    }

    /// Joins the fiber from inside another fiber, suspending until it
    /// terminates.
    ///
    /// Returns the completion value; a failure or abort of the joined fiber
    /// propagates as the corresponding error.
    ///
    /// # Errors
    ///
    /// - `ErrorKind::NotInFiber` when called outside any fiber (the host
    ///   thread drives with [`crate::Runtime::run_until_idle`] and observes
    ///   [`FiberHandle::completion`] or [`FiberHandle::take_outcome`]
    ///   instead)
    /// - the joined fiber's failure error or cancellation signal
    pub fn wait(mut self) -> Result<T, Error> {
        let done = self
            .done
            .take()
            .ok_or_else(|| Error::internal("completion signal already consumed"))?;
        wait(done)?;
        match self.take_outcome() {
            Some(outcome) => outcome.into_result(),
            None => Err(Error::internal("terminal fiber has no outcome")),
        }
    }
}

impl<T> core::fmt::Debug for FiberHandle<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FiberHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
