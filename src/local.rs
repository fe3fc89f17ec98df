//! Fiber-local storage.
//!
//! A [`FiberLocal`] is one storage slot keyed by fiber: every fiber sees
//! its own independent value, and interleaved fibers never observe each
//! other's writes. The handle itself is cheaply cloneable and shared; move
//! a clone into each task that needs the slot.
//!
//! [`FiberLocal::scope`] is the structured form: it sets a value for the
//! duration of a closure and restores the previous value afterwards (also
//! on unwind), which keeps nested scopes well bracketed even when the
//! closure suspends in the middle.

use crate::error::Error;
use crate::fiber;
use crate::runtime;
use crate::types::FiberId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A storage slot with one independent value per fiber.
///
/// All operations address the current fiber and fail with
/// `ErrorKind::NotInFiber` on the host thread.
pub struct FiberLocal<T: Send + 'static> {
    slots: Arc<Mutex<HashMap<FiberId, T>>>,
}

impl<T: Send + 'static> FiberLocal<T> {
    /// Creates a slot with no value set for any fiber.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sets the current fiber's value, returning the previous one.
    ///
    /// # Errors
    ///
    /// Fails with `ErrorKind::NotInFiber` outside any fiber.
    pub fn set(&self, value: T) -> Result<Option<T>, Error> {
        let id = fiber::current().ok_or_else(Error::not_in_fiber)?;
        Ok(self.slots.lock().insert(id, value))
    }

    /// Removes the current fiber's value, returning it.
    ///
    /// # Errors
    ///
    /// Fails with `ErrorKind::NotInFiber` outside any fiber.
    pub fn remove(&self) -> Result<Option<T>, Error> {
        let id = fiber::current().ok_or_else(Error::not_in_fiber)?;
        Ok(self.slots.lock().remove(&id))
    }

    /// Returns a clone of the current fiber's value, if set.
    ///
    /// # Errors
    ///
    /// Fails with `ErrorKind::NotInFiber` outside any fiber.
    pub fn get(&self) -> Result<Option<T>, Error>
    where
        T: Clone,
    {
        let id = fiber::current().ok_or_else(Error::not_in_fiber)?;
        Ok(self.slots.lock().get(&id).cloned())
    }

    /// Returns the current fiber's value, falling back to the nearest
    /// ancestor fiber that has one.
    ///
    /// Inheritance is read-only: the value is cloned, never shared, and a
    /// later `set` on the child does not touch the ancestor's slot.
    ///
    /// # Errors
    ///
    /// Fails with `ErrorKind::NotInFiber` outside any fiber, or
    /// `ErrorKind::NoRuntime` if no runtime is installed.
    pub fn get_inherited(&self) -> Result<Option<T>, Error>
    where
        T: Clone,
    {
        let id = fiber::current().ok_or_else(Error::not_in_fiber)?;
        let shared = runtime::installed_shared().ok_or_else(Error::no_runtime)?;

        let slots = self.slots.lock();
        let state = shared.state.lock();
        let mut cursor = Some(id);
        while let Some(fiber) = cursor {
            if let Some(value) = slots.get(&fiber) {
                return Ok(Some(value.clone()));
            }
            cursor = state.fibers.get(&fiber).and_then(|rec| rec.parent);
        }
        Ok(None)
    }

    /// Runs `f` with the current fiber's value set to `value`, restoring
    /// the previous value (or absence) afterwards.
    ///
    /// The restore happens when the closure returns and also if it unwinds,
    /// so nested scopes stay bracketed. The closure may suspend; the value
    /// stays set across the suspension.
    ///
    /// # Errors
    ///
    /// Fails with `ErrorKind::NotInFiber` outside any fiber.
    pub fn scope<R>(&self, value: T, f: impl FnOnce() -> R) -> Result<R, Error> {
        let id = fiber::current().ok_or_else(Error::not_in_fiber)?;
        let previous = self.slots.lock().insert(id, value);
        let _restore = ScopeGuard {
            slots: &self.slots,
            id,
            previous,
        };
        Ok(f())
    }
}

impl<T: Send + 'static> Default for FiberLocal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Clone for FiberLocal<T> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }
}

struct ScopeGuard<'a, T> {
    slots: &'a Mutex<HashMap<FiberId, T>>,
    id: FiberId,
    previous: Option<T>,
}

impl<T> Drop for ScopeGuard<'_, T> {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        match self.previous.take() {
            Some(value) => {
                slots.insert(self.id, value);
            }
            None => {
                slots.remove(&self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn access_outside_fiber_is_rejected() {
        let local = FiberLocal::<u32>::new();
        assert_eq!(local.get().unwrap_err().kind(), ErrorKind::NotInFiber);
        assert_eq!(local.set(1).unwrap_err().kind(), ErrorKind::NotInFiber);
        assert_eq!(local.remove().unwrap_err().kind(), ErrorKind::NotInFiber);
        assert_eq!(
            local.scope(1, || ()).unwrap_err().kind(),
            ErrorKind::NotInFiber
        );
    }

    #[test]
    fn clone_shares_the_slot_map() {
        let local = FiberLocal::<u32>::new();
        let other = local.clone();
        assert!(Arc::ptr_eq(&local.slots, &other.slots));
    }
}
