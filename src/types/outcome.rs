//! Three-valued terminal outcome type.
//!
//! The outcome of a fiber that has reached a terminal state:
//!
//! - `Completed(T)`: the task returned a value
//! - `Failed(Error)`: the task raised an error (or panicked)
//! - `Aborted(AbortReason)`: the fiber was cancelled before completion
//!
//! Outcomes form a severity order `Completed < Failed < Aborted`; abort
//! overrides any pending result for its subtree, so an aborted fiber never
//! reports `Completed`.

use super::abort::AbortReason;
use crate::error::Error;
use core::fmt;

/// The terminal outcome of a fiber.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The task returned a value.
    Completed(T),
    /// The task raised an error; carried verbatim.
    Failed(Error),
    /// The fiber was aborted before producing a result.
    Aborted(AbortReason),
}

impl<T> Outcome<T> {
    /// Returns the severity level of this outcome (0 = Completed).
    #[must_use]
    pub const fn severity(&self) -> u8 {
        match self {
            Self::Completed(_) => 0,
            Self::Failed(_) => 1,
            Self::Aborted(_) => 2,
        }
    }

    /// Returns true if this outcome is `Completed`.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns true if this outcome is `Failed`.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns true if this outcome is `Aborted`.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Maps the completion value using the provided function.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Completed(v) => Outcome::Completed(f(v)),
            Self::Failed(e) => Outcome::Failed(e),
            Self::Aborted(r) => Outcome::Aborted(r),
        }
    }

    /// Converts this outcome to a standard `Result`, with abort expressed
    /// as an [`Error`] of kind `Aborted`.
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Self::Completed(v) => Ok(v),
            Self::Failed(e) => Err(e),
            Self::Aborted(r) => Err(Error::aborted(r)),
        }
    }

    /// Returns the completion value or panics.
    ///
    /// # Panics
    ///
    /// Panics if the outcome is not `Completed`.
    #[track_caller]
    pub fn unwrap_completed(self) -> T {
        match self {
            Self::Completed(v) => v,
            Self::Failed(e) => {
                panic!("called `Outcome::unwrap_completed()` on a `Failed` value: {e}")
            }
            Self::Aborted(r) => {
                panic!("called `Outcome::unwrap_completed()` on an `Aborted` value: {r}")
            }
        }
    }

    /// Returns the abort reason if the outcome is `Aborted`.
    #[must_use]
    pub const fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            Self::Aborted(r) => Some(r),
            _ => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(v) => write!(f, "completed: {v}"),
            Self::Failed(e) => write!(f, "failed: {e}"),
            Self::Aborted(r) => write!(f, "aborted: {r}"),
        }
    }
}
