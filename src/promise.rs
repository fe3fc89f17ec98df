//! The promise boundary consumed by `wait`.
//!
//! A promise is the external asynchronous event source: it settles at most
//! once, with a value or an error, and delivers that settlement to at most
//! one subscriber. The producer half is the [`Resolver`]; the consumer half
//! is the [`Promise`] itself, which `fiber::wait` consumes (subscribing
//! exactly once).
//!
//! Delivery to the subscriber callback happens at settle time (or at
//! subscribe time for an already-settled promise). The runtime's suspension
//! bridge never resumes a fiber from that callback directly; it only
//! enqueues a resumption, so waiting on an already-settled promise still
//! yields control at least once.

use crate::error::Error;
use parking_lot::Mutex;
use std::mem;
use std::sync::Arc;

/// The settlement of a promise: a value or an error.
pub type Settlement<T> = Result<T, Error>;

type Subscriber<T> = Box<dyn FnOnce(Settlement<T>) + Send>;

enum Cell<T> {
    /// Not yet settled; a subscriber may be parked here.
    Pending(Option<Subscriber<T>>),
    /// Settled before anyone subscribed; the settlement waits for pickup.
    Settled(Option<Settlement<T>>),
    /// Settlement handed to the subscriber.
    Delivered,
}

/// The consumer half of a promise.
///
/// Not cloneable: a promise has at most one subscriber, and subscribing
/// consumes it.
pub struct Promise<T> {
    cell: Arc<Mutex<Cell<T>>>,
}

/// The producer half of a promise.
///
/// Settling is idempotent at the boundary: the first of `fulfill`/`reject`
/// wins and later calls report `false`. Dropping the resolver without
/// settling leaves the promise pending forever.
pub struct Resolver<T> {
    cell: Arc<Mutex<Cell<T>>>,
}

impl<T: Send + 'static> Promise<T> {
    /// Creates a (producer, consumer) pair.
    #[must_use]
    pub fn pair() -> (Resolver<T>, Self) {
        let cell = Arc::new(Mutex::new(Cell::Pending(None)));
        (Resolver { cell: cell.clone() }, Self { cell })
    }

    /// Creates a promise already fulfilled with `value`.
    #[must_use]
    pub fn settled(value: T) -> Self {
        Self {
            cell: Arc::new(Mutex::new(Cell::Settled(Some(Ok(value))))),
        }
    }

    /// Creates a promise already rejected with `error`.
    #[must_use]
    pub fn rejected(error: Error) -> Self {
        Self {
            cell: Arc::new(Mutex::new(Cell::Settled(Some(Err(error))))),
        }
    }

    /// Returns true if the promise has settled (whether or not the
    /// settlement was delivered).
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(&*self.cell.lock(), Cell::Settled(_) | Cell::Delivered)
    }

    /// Subscribes to this promise's settlement, consuming the promise.
    ///
    /// If the promise is already settled the callback is invoked before
    /// `subscribe` returns; otherwise it is invoked from whichever call
    /// settles the promise. The callback runs outside the promise's lock.
    pub fn subscribe(self, callback: impl FnOnce(Settlement<T>) + Send + 'static) {
        let mut guard = self.cell.lock();
        match mem::replace(&mut *guard, Cell::Delivered) {
            Cell::Pending(_) => {
                *guard = Cell::Pending(Some(Box::new(callback)));
            }
            Cell::Settled(Some(settlement)) => {
                drop(guard);
                callback(settlement);
            }
            Cell::Settled(None) | Cell::Delivered => {}
        }
    }
}

impl<T: Send + 'static> Resolver<T> {
    /// Fulfills the promise with a value.
    ///
    /// Returns `false` if the promise had already settled.
    pub fn fulfill(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Rejects the promise with an error.
    ///
    /// Returns `false` if the promise had already settled.
    pub fn reject(&self, error: Error) -> bool {
        self.settle(Err(error))
    }

    fn settle(&self, settlement: Settlement<T>) -> bool {
        let mut guard = self.cell.lock();
        match mem::replace(&mut *guard, Cell::Delivered) {
            Cell::Pending(Some(subscriber)) => {
                drop(guard);
                subscriber(settlement);
                true
            }
            Cell::Pending(None) => {
                *guard = Cell::Settled(Some(settlement));
                true
            }
            settled @ Cell::Settled(_) => {
                *guard = settled;
                false
            }
            Cell::Delivered => false,
        }
    }
}
