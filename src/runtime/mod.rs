//! Runtime state and the host-side driving API.
//!
//! A [`Runtime`] owns the fiber table, the scheduler's `current` pointer,
//! and the resume queue. It is scoped to the thread that created it: fibers
//! are spawned from it (or from inside other fibers), and the owning thread
//! drives delivery of queued resumptions with [`Runtime::step`] /
//! [`Runtime::run_until_idle`]. The runtime registers itself in
//! thread-local storage so the free functions in [`crate::fiber`] can find
//! it, both on the host thread and on fiber context threads.
//!
//! Dropping the runtime shuts it down: every live fiber is aborted with a
//! shutdown reason and the queue is drained until the tree is quiescent, so
//! suspended stacks always unwind.

pub(crate) mod abort;
pub(crate) mod queue;
pub(crate) mod scheduler;

use crate::context::ResumeSignal;
use crate::error::Error;
use crate::fiber::FiberHandle;
use crate::record::FiberRecord;
use crate::types::{AbortReason, FiberId};
use parking_lot::Mutex;
use queue::{Resumption, ResumeQueue};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::trace;

/// Mutable runtime state behind the lock.
pub(crate) struct RuntimeState {
    /// All fibers ever spawned on this runtime; records are retained after
    /// termination so handles can read state and take outcomes.
    pub(crate) fibers: HashMap<FiberId, FiberRecord>,
    /// The fiber whose execution context is presently live, if any.
    ///
    /// Mutated only by the switch operation in [`scheduler`].
    pub(crate) current: Option<FiberId>,
}

/// Configuration applied to every fiber of a runtime.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) name_prefix: String,
    pub(crate) stack_size: Option<usize>,
}

/// State shared between the runtime handle and its fiber contexts.
pub(crate) struct Shared {
    pub(crate) state: Mutex<RuntimeState>,
    pub(crate) queue: ResumeQueue,
    pub(crate) config: RuntimeConfig,
}

thread_local! {
    /// Runtimes installed on this thread, innermost last.
    static INSTALLED: RefCell<Vec<Arc<Shared>>> = const { RefCell::new(Vec::new()) };
}

/// Returns the innermost runtime installed on this thread.
pub(crate) fn installed_shared() -> Option<Arc<Shared>> {
    INSTALLED.with(|stack| stack.borrow().last().cloned())
}

/// Installs a runtime on this thread.
pub(crate) fn install(shared: Arc<Shared>) {
    INSTALLED.with(|stack| stack.borrow_mut().push(shared));
}

/// Removes the most recent installation of `shared` from this thread.
pub(crate) fn uninstall(shared: &Arc<Shared>) {
    INSTALLED.with(|stack| {
        let mut stack = stack.borrow_mut();
        if let Some(pos) = stack.iter().rposition(|s| Arc::ptr_eq(s, shared)) {
            stack.remove(pos);
        }
    });
}

/// Builder for a [`Runtime`].
#[derive(Debug, Clone)]
pub struct RuntimeBuilder {
    name_prefix: String,
    stack_size: Option<usize>,
}

impl RuntimeBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name_prefix: "fiber".to_string(),
            stack_size: None,
        }
    }

    /// Sets the thread-name prefix for fiber execution contexts.
    ///
    /// Contexts are named `{prefix}-{fiber id}`.
    #[must_use]
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Sets the stack size, in bytes, for fiber execution contexts.
    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Builds the runtime and installs it on the calling thread.
    #[must_use]
    pub fn finish(self) -> Runtime {
        let shared = Arc::new(Shared {
            state: Mutex::new(RuntimeState {
                fibers: HashMap::new(),
                current: None,
            }),
            queue: ResumeQueue::new(),
            config: RuntimeConfig {
                name_prefix: self.name_prefix,
                stack_size: self.stack_size,
            },
        });
        install(shared.clone());
        Runtime {
            shared,
            _not_send: PhantomData,
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A single-threaded cooperative fiber runtime.
///
/// Scoped to the creating thread (it is `!Send`): that thread spawns root
/// fibers and drives resumption delivery. See the crate docs for the model.
pub struct Runtime {
    shared: Arc<Shared>,
    // Thread-local installation ties the runtime to its creating thread.
    _not_send: PhantomData<*const ()>,
}

impl Runtime {
    /// Creates a runtime with default configuration.
    #[must_use]
    pub fn new() -> Self {
        RuntimeBuilder::new().finish()
    }

    /// Returns a builder for configuring a runtime.
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Spawns a root fiber and switches into it synchronously.
    ///
    /// By the time `spawn` returns, the fiber has run up to its first
    /// suspension point or to termination.
    ///
    /// # Errors
    ///
    /// Fails with `ErrorKind::Spawn` if the execution context could not be
    /// created.
    pub fn spawn<T, F>(&self, task: F) -> Result<FiberHandle<T>, Error>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, Error> + Send + 'static,
    {
        crate::fiber::run_on(&self.shared, task)
    }

    /// Delivers one queued resumption, if any.
    ///
    /// Returns true if a resumption was processed.
    pub fn step(&self) -> bool {
        match self.shared.queue.pop() {
            Some(resumption) => {
                process(&self.shared, resumption);
                true
            }
            None => false,
        }
    }

    /// Delivers queued resumptions until the queue is empty, including
    /// resumptions enqueued while draining.
    ///
    /// Returns the number of resumptions delivered. Fibers suspended on
    /// promises that never settle remain suspended.
    pub fn run_until_idle(&self) -> usize {
        let mut delivered = 0;
        while self.step() {
            delivered += 1;
        }
        delivered
    }

    /// Returns the fiber currently live on this runtime, if any.
    ///
    /// Always `None` when called from the host thread between steps.
    #[must_use]
    pub fn current_fiber(&self) -> Option<FiberId> {
        self.shared.state.lock().current
    }

    /// Returns the number of fibers that have not reached a terminal state.
    #[must_use]
    pub fn live_fibers(&self) -> usize {
        self.shared
            .state
            .lock()
            .fibers
            .values()
            .filter(|rec| !rec.is_terminal())
            .count()
    }

    /// Aborts every live fiber with a shutdown reason and drains the queue
    /// until the tree is quiescent.
    ///
    /// Invoked automatically on drop; calling it twice is harmless.
    pub fn shutdown(&self) {
        loop {
            let live: Vec<FiberId> = {
                let state = self.shared.state.lock();
                state
                    .fibers
                    .iter()
                    .filter(|(_, rec)| !rec.is_terminal())
                    .map(|(id, _)| *id)
                    .collect()
            };
            if live.is_empty() {
                break;
            }
            for id in live {
                abort::abort_tree(&self.shared, id, AbortReason::shutdown());
            }
            if self.run_until_idle() == 0 {
                break;
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
        uninstall(&self.shared);
    }
}

/// Delivers one resumption: validates it against the fiber's pending-wait
/// record and switches into the fiber, or drops it as stale.
fn process(shared: &Arc<Shared>, resumption: Resumption) {
    match resumption {
        Resumption::Settle {
            fiber,
            token,
            settlement,
        } => {
            let fresh = {
                let mut state = shared.state.lock();
                state
                    .fibers
                    .get_mut(&fiber)
                    .is_some_and(|rec| rec.resume_from_wait(token))
            };
            if fresh {
                scheduler::switch_into(shared, fiber, ResumeSignal::Settled(settlement));
            } else {
                // The fiber was aborted (or this token was superseded);
                // the settlement must not resume it.
                trace!(fiber = %fiber, token = %token, "dropped stale settlement");
            }
        }
        Resumption::AbortWake { fiber, token } => {
            let reason = {
                let mut state = shared.state.lock();
                state
                    .fibers
                    .get_mut(&fiber)
                    .and_then(|rec| rec.take_abort_wake(token))
            };
            if let Some(reason) = reason {
                scheduler::switch_into(
                    shared,
                    fiber,
                    ResumeSignal::Settled(Err(Error::aborted(reason))),
                );
            }
        }
    }
}
