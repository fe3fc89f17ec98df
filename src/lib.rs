//! Strand: a stackful cooperative fiber runtime with tree-structured abort.
//!
//! # Overview
//!
//! Strand lets code written in ordinary synchronous style suspend on
//! promises without blocking the host thread. A *fiber* is a lightweight,
//! stackful execution context; any number of fibers exist, but exactly one
//! is live at a time on the owning thread. Suspension happens at a single
//! operation ([`fiber::wait`]); everything else runs to completion without
//! interruption. Aborting a fiber cancels it together with every fiber it
//! transitively spawned, as one operation.
//!
//! # Core guarantees
//!
//! - **Sequential switching**: at most one execution context is live at any
//!   instant; the scheduler's `current` pointer is mutated only by the
//!   switch operation.
//! - **Cooperative cancellation**: abort is observed at suspension points
//!   (or an explicit [`fiber::checkpoint`]), never mid-instruction.
//! - **No stale resumptions**: a promise that settles after its waiter was
//!   aborted can never resume the fiber.
//! - **Abort wins**: once a fiber is aborted it never reports `Completed`,
//!   and callers awaiting it receive the cancellation outcome, not a hang.
//! - **Panic isolation**: a panicking task becomes a `Failed` fiber; panics
//!   never cross onto the host thread.
//!
//! # Module structure
//!
//! - [`types`]: identifiers, abort reasons, the terminal [`Outcome`] type
//! - [`record`]: the per-fiber lifecycle state machine
//! - [`promise`]: the external promise boundary consumed by `wait`
//! - [`runtime`]: the [`Runtime`], resume queue, scheduler, abort propagator
//! - [`fiber`]: the public fiber surface (`run`, `wait`, `current`, ...)
//! - [`local`]: fiber-keyed storage that survives suspension
//! - [`error`]: error types
//!
//! # Example
//!
//! ```
//! use strand::{fiber, Promise, Runtime};
//!
//! let rt = Runtime::new();
//! let (resolver, promise) = Promise::<i32>::pair();
//!
//! let handle = rt
//!     .spawn(move || {
//!         let v = fiber::wait(promise)?;
//!         Ok(v + 1)
//!     })
//!     .unwrap();
//!
//! resolver.fulfill(5);
//! rt.run_until_idle();
//!
//! assert_eq!(handle.take_outcome().unwrap().unwrap_completed(), 6);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod fiber;
pub mod local;
pub mod promise;
pub mod record;
pub mod runtime;
pub mod types;

mod context;

pub use error::{Error, ErrorKind};
pub use fiber::FiberHandle;
pub use local::FiberLocal;
pub use promise::{Promise, Resolver, Settlement};
pub use record::FiberState;
pub use runtime::{Runtime, RuntimeBuilder};
pub use types::{AbortKind, AbortReason, FiberId, Outcome};
