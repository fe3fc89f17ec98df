//! Internal records for fibers.
//!
//! A fiber is a unit of cooperative execution wrapping one execution
//! context. This module defines the record structure the runtime keeps per
//! fiber: the lifecycle state machine, tree links, and the result slot.

pub mod fiber;

pub use fiber::FiberState;
pub(crate) use fiber::{AbortAction, FiberRecord};
