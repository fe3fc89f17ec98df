//! Core types: identifiers, abort reasons, and terminal outcomes.

pub mod abort;
pub mod id;
pub mod outcome;

pub use abort::{AbortKind, AbortReason};
pub use id::{FiberId, WaitToken};
pub use outcome::Outcome;
