//! Identifier types for runtime entities.
//!
//! Fiber identity is stable for the record's lifetime and keys the fiber
//! table, the abort-tree bookkeeping, and the fiber-local store.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static FIBER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for a fiber.
///
/// Allocated from a process-wide counter so identities are never reused,
/// even across runtimes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiberId(u64);

impl FiberId {
    /// Allocates the next fiber ID.
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(FIBER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Creates a fiber ID for testing purposes.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FiberId({})", self.0)
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// A token identifying one suspension of one fiber.
///
/// Every `wait` issues a fresh token; a resumption is delivered only if its
/// token matches the fiber's pending-wait record. This is what makes a
/// promise settlement that races an abort harmless: the stale token (or the
/// fiber's state) fails the match and the delivery is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitToken(pub(crate) u64);

impl fmt::Display for WaitToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}", self.0)
    }
}
