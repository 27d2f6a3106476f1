//! [`LatestSlot`] – single-capacity, latest-wins mailbox.
//!
//! One [`Mutex`] guards the value and a publish counter; one [`Condvar`]
//! wakes blocked takers.  Every operation swaps or copies the whole value
//! under the lock, so no reader can observe fields from two different
//! publishes.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//! use sensorbridge_middleware::LatestSlot;
//!
//! let slot = Arc::new(LatestSlot::new());
//! let producer = Arc::clone(&slot);
//! thread::spawn(move || {
//!     producer.publish(1);
//!     producer.publish(2);
//! })
//! .join()
//! .unwrap();
//!
//! // Only the latest value survives.
//! assert_eq!(slot.take_blocking(), 2);
//! assert!(slot.is_empty());
//! ```

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::trace;

struct Inner<T> {
    value: Option<T>,
    /// Total number of publishes since construction.
    sequence: u64,
}

/// Thread-safe mailbox holding zero or one value.
///
/// * [`publish`](Self::publish) replaces the contents and wakes one blocked
///   taker.
/// * [`take_blocking`](Self::take_blocking) /
///   [`take_timeout`](Self::take_timeout) remove the value, leaving the slot
///   empty.  Each published value is handed to at most one taker.
/// * [`peek`](Self::peek) copies the value out without removing it.
///
/// Share it between threads with an `Arc`.
pub struct LatestSlot<T> {
    inner: Mutex<Inner<T>>,
    ready: Condvar,
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestSlot<T> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                value: None,
                sequence: 0,
            }),
            ready: Condvar::new(),
        }
    }

    // A panic while holding the lock cannot leave `Inner` half-written
    // (every mutation is a single assignment), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the contents with `value` and wake one blocked taker.
    ///
    /// Returns the previous value if it was never consumed; it is dropped
    /// from the slot either way.
    pub fn publish(&self, value: T) -> Option<T> {
        let displaced = {
            let mut inner = self.lock();
            inner.sequence += 1;
            trace!(sequence = inner.sequence, "slot publish");
            inner.value.replace(value)
        };
        self.ready.notify_one();
        displaced
    }

    /// Atomically derive the next value from the current one and publish it.
    ///
    /// `f` runs under the lock; keep it short.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(Option<&T>) -> T,
    {
        {
            let mut inner = self.lock();
            let next = f(inner.value.as_ref());
            inner.sequence += 1;
            inner.value = Some(next);
        }
        self.ready.notify_one();
    }

    /// Block until a value is available, then remove and return it.
    ///
    /// Returns immediately if a value is already waiting.  There is no
    /// deadline; use [`take_timeout`](Self::take_timeout) when the producer
    /// may never publish.
    pub fn take_blocking(&self) -> T {
        let mut inner = self.lock();
        loop {
            if let Some(value) = inner.value.take() {
                return value;
            }
            // Spurious wakeups and values stolen by another taker both land
            // here and go back to sleep.
            inner = self
                .ready
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`take_blocking`](Self::take_blocking) but gives up after
    /// `timeout`, returning `None`.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let guard = self.lock();
        let (mut inner, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |inner| inner.value.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        inner.value.take()
    }

    /// Remove and return the value if one is present, without waiting.
    pub fn try_take(&self) -> Option<T> {
        self.lock().value.take()
    }

    /// `true` when nothing is waiting in the slot.
    pub fn is_empty(&self) -> bool {
        self.lock().value.is_none()
    }

    /// Number of publishes so far, including overwritten ones.
    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }
}

impl<T: Clone> LatestSlot<T> {
    /// Copy of the current value, or `None` if nothing has been published
    /// (or the last value was taken).
    pub fn peek(&self) -> Option<T> {
        self.lock().value.clone()
    }
}
