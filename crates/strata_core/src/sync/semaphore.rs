//! # Counting Semaphore
//!
//! Backpressure for the staging arena: one permit per free slot.

use super::CancelToken;
use crate::error::{StrataError, StrataResult};
use parking_lot::{Condvar, Mutex};

/// A counting semaphore whose waits can be interrupted by a [`CancelToken`].
pub struct Semaphore {
    /// Available permits.
    permits: Mutex<usize>,
    /// Signalled whenever permits are added or waiters must re-check the token.
    available: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `permits` permits.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Takes one permit, blocking until one is available.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Cancelled`] if `cancel` is set before a permit
    /// could be taken. No permit is consumed in that case.
    pub fn acquire(&self, cancel: &CancelToken) -> StrataResult<()> {
        let mut permits = self.permits.lock();
        loop {
            if cancel.is_cancelled() {
                return Err(StrataError::Cancelled);
            }
            if *permits > 0 {
                *permits -= 1;
                return Ok(());
            }
            self.available.wait(&mut permits);
        }
    }

    /// Takes one permit if available, without blocking.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits > 0 {
            *permits -= 1;
            true
        } else {
            false
        }
    }

    /// Returns `count` permits and wakes as many waiters.
    pub fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut permits = self.permits.lock();
        *permits += count;
        drop(permits);
        if count == 1 {
            self.available.notify_one();
        } else {
            self.available.notify_all();
        }
    }

    /// Wakes every waiter so it re-checks its cancel token.
    pub fn interrupt(&self) {
        let permits = self.permits.lock();
        self.available.notify_all();
        drop(permits);
    }

    /// Overwrites the permit count. Only meaningful while nobody is waiting.
    pub fn reset(&self, permits: usize) {
        *self.permits.lock() = permits;
        self.available.notify_all();
    }

    /// Returns the number of permits currently available.
    #[must_use]
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}
