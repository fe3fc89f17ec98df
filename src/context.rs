//! The execution context: a switchable, stackful unit of control.
//!
//! Each context owns a real call stack (a dedicated OS thread) and a resume
//! channel it parks on. Switching into a context means sending it a resume
//! signal and then blocking until it yields; at most one context is ever
//! unparked at a time, so the model stays strictly cooperative even though
//! the stacks live on separate threads. This is the "parking" realization
//! of stackful suspension: no assembly, no unsafe, arbitrary call depth.
//!
//! The handshake signals:
//!
//! - [`ResumeSignal::Enter`] starts a context for the first time.
//! - [`ResumeSignal::Settled`] re-enters a suspended context, carrying the
//!   outcome its pending `wait` should produce.
//! - [`YieldSignal::Suspended`] / [`YieldSignal::Finished`] flow the other
//!   way, back to whichever context performed the switch.

use crate::error::Error;
use crate::promise::Settlement;
use std::any::Any;
use std::cell::RefCell;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

/// A type-erased wait outcome, downcast by the waiting fiber.
pub(crate) type BoxedSettlement = Settlement<Box<dyn Any + Send>>;

/// Signal sent into a context to (re-)enter it.
pub(crate) enum ResumeSignal {
    /// First entry: run the context body from the top.
    Enter,
    /// Re-entry after suspension: the outcome `wait` should return.
    Settled(BoxedSettlement),
}

/// Signal sent back to the switching context when this one gives up control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum YieldSignal {
    /// The context suspended and expects to be re-entered later.
    Suspended,
    /// The context ran to completion; it will never run again.
    Finished,
}

thread_local! {
    /// The resume channel of the context living on this thread.
    ///
    /// Present only on context threads; the host thread has none, which is
    /// how `park_until_resumed` distinguishes a misplaced call.
    static CONTEXT_RX: RefCell<Option<Receiver<ResumeSignal>>> = const { RefCell::new(None) };
}

/// Handle to a context's resume channel.
///
/// Owned by the fiber record; the context thread itself holds the receiving
/// end. Dropping the handle closes the channel, which unparks the context
/// with a lost-runtime signal so its stack unwinds.
#[derive(Debug)]
pub(crate) struct ExecutionContext {
    resume_tx: Sender<ResumeSignal>,
}

impl ExecutionContext {
    /// Creates a new, not-yet-started context around `body`.
    ///
    /// The context parks immediately and runs `body` only once it receives
    /// [`ResumeSignal::Enter`]. If the channel closes before that, the
    /// context exits without running the body at all.
    pub(crate) fn spawn<F>(
        name: String,
        stack_size: Option<usize>,
        body: F,
    ) -> Result<Self, Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let (resume_tx, resume_rx) = mpsc::channel();

        let mut builder = thread::Builder::new().name(name);
        if let Some(bytes) = stack_size {
            builder = builder.stack_size(bytes);
        }

        builder
            .spawn(move || {
                CONTEXT_RX.with(|cell| *cell.borrow_mut() = Some(resume_rx));
                match park_until_resumed() {
                    Some(ResumeSignal::Enter) => body(),
                    // Channel closed before first entry, or a protocol bug:
                    // never run the body.
                    Some(ResumeSignal::Settled(_)) | None => {}
                }
                CONTEXT_RX.with(|cell| *cell.borrow_mut() = None);
            })
            .map_err(|e| Error::spawn(e.to_string()))?;

        Ok(Self { resume_tx })
    }

    /// Creates a context handle with no thread behind it.
    ///
    /// Resuming it reports failure. Used by state-machine unit tests that
    /// never switch.
    #[cfg(test)]
    pub(crate) fn inert() -> Self {
        let (resume_tx, _rx) = mpsc::channel();
        Self { resume_tx }
    }

    /// Wakes the context with `signal`.
    ///
    /// Returns `false` if the context is gone (its thread already exited).
    pub(crate) fn resume(&self, signal: ResumeSignal) -> bool {
        self.resume_tx.send(signal).is_ok()
    }
}

/// Parks the calling context until it is resumed.
///
/// Returns `None` if the resume channel is closed (the runtime dropped this
/// fiber's record) or if the calling thread is not a context thread; the
/// caller treats both as a lost runtime and unwinds.
pub(crate) fn park_until_resumed() -> Option<ResumeSignal> {
    CONTEXT_RX.with(|cell| {
        let borrow = cell.borrow();
        borrow.as_ref().and_then(|rx| rx.recv().ok())
    })
}
