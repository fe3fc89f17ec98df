//! Error types and error handling strategy for Strand.
//!
//! Error handling follows the runtime's principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Errors from an awaited promise propagate as if raised synchronously at
//!   the `wait` call site; nothing is silently swallowed
//! - Abort is an error from the aborted fiber's point of view, carrying the
//!   [`AbortReason`]
//! - Panics inside a task are isolated and surfaced as `TaskPanicked`
//!
//! # Taxonomy
//!
//! - **`NotInFiber`**: `wait` (or fiber-local access) with no current fiber
//! - **`NoRuntime`**: `fiber::run` with no runtime installed on the thread
//! - **`Aborted`**: the cancellation signal raised at the point a fiber
//!   observes it has been aborted
//! - **`Task`**: an application error raised by a task, carried verbatim
//! - **`TaskPanicked`**: the task panicked; carries the panic message
//! - **`Spawn`**: the execution context could not be created
//! - **`Internal`**: runtime bugs and invalid states

use crate::types::AbortReason;
use core::fmt;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `wait` was called with no current fiber.
    NotInFiber,
    /// `fiber::run` was called with no runtime installed on this thread.
    NoRuntime,
    /// The fiber was aborted.
    Aborted,
    /// An application-level error raised by a task.
    Task,
    /// The task panicked.
    TaskPanicked,
    /// Spawning the fiber's execution context failed.
    Spawn,
    /// Internal runtime error (invalid state).
    Internal,
}

impl ErrorKind {
    /// Returns a human-readable name for the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NotInFiber => "not in fiber",
            Self::NoRuntime => "no runtime",
            Self::Aborted => "aborted",
            Self::Task => "task error",
            Self::TaskPanicked => "task panicked",
            Self::Spawn => "spawn failed",
            Self::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The error type used throughout the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    reason: Option<AbortReason>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            reason: None,
        }
    }

    /// Attaches a message to this error.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Creates a `NotInFiber` error.
    #[must_use]
    pub const fn not_in_fiber() -> Self {
        Self::new(ErrorKind::NotInFiber)
    }

    /// Creates a `NoRuntime` error.
    #[must_use]
    pub const fn no_runtime() -> Self {
        Self::new(ErrorKind::NoRuntime)
    }

    /// Creates an `Aborted` error carrying the abort reason.
    #[must_use]
    pub const fn aborted(reason: AbortReason) -> Self {
        Self {
            kind: ErrorKind::Aborted,
            message: None,
            reason: Some(reason),
        }
    }

    /// Creates an application-level task error.
    ///
    /// This is the error a task raises itself; it propagates verbatim to
    /// whoever waits on the fiber.
    #[must_use]
    pub fn task(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Task).with_message(message)
    }

    /// Creates a `TaskPanicked` error from a panic message.
    #[must_use]
    pub fn task_panicked(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TaskPanicked).with_message(message)
    }

    /// Creates a `Spawn` error.
    #[must_use]
    pub fn spawn(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Spawn).with_message(message)
    }

    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(message)
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the abort reason if this is an `Aborted` error.
    #[must_use]
    pub const fn abort_reason(&self) -> Option<&AbortReason> {
        self.reason.as_ref()
    }

    /// Returns true if this error is the cancellation signal.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self.kind, ErrorKind::Aborted)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AbortKind;

    #[test]
    fn aborted_carries_reason() {
        let err = Error::aborted(AbortReason::user("stop"));
        assert!(err.is_aborted());
        assert_eq!(err.abort_reason().unwrap().kind, AbortKind::User);
        assert_eq!(err.to_string(), "aborted (user: stop)");
    }

    #[test]
    fn task_error_round_trips_message() {
        let err = Error::task("bad input");
        assert_eq!(err.kind(), ErrorKind::Task);
        assert_eq!(err.message(), Some("bad input"));
        assert_eq!(err.to_string(), "task error: bad input");
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(Error::task("x"), Error::task("x"));
        assert_ne!(Error::task("x"), Error::task("y"));
        assert_ne!(Error::not_in_fiber(), Error::no_runtime());
    }
}
