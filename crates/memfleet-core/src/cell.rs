//! Guarded cell for values read and written by different tasks.
//!
//! A [`GuardedCell`] pairs a value with one mutex and only exposes two
//! operations: take a consistent copy ([`GuardedCell::read`]) and swap in a
//! whole new value ([`GuardedCell::replace`]). Callers cannot mutate fields in
//! place, so a reader never observes a half-updated value.

use std::sync::{Mutex, PoisonError};

/// A value guarded by a single mutex.
#[derive(Debug, Default)]
pub struct GuardedCell<T> {
    inner: Mutex<T>,
}

impl<T: Clone> GuardedCell<T> {
    /// Create a new cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Return a consistent copy of the current value.
    pub fn read(&self) -> T {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atomically replace the value, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_read_and_replace() {
        let cell = GuardedCell::new((1.0_f64, 2_u64));
        assert_eq!(cell.read(), (1.0, 2));

        let previous = cell.replace((3.0, 4));
        assert_eq!(previous, (1.0, 2));
        assert_eq!(cell.read(), (3.0, 4));
    }

    #[test]
    fn test_readers_only_see_whole_pairs() {
        // The writer always stores (n, n); a torn read would break equality.
        let cell = Arc::new(GuardedCell::new((0_u64, 0_u64)));

        let writer = {
            let cell = Arc::clone(&cell);
            std::thread::spawn(move || {
                for n in 1..=10_000 {
                    cell.replace((n, n));
                }
            })
        };

        for _ in 0..10_000 {
            let (a, b) = cell.read();
            assert_eq!(a, b);
        }

        writer.join().unwrap();
        assert_eq!(cell.read(), (10_000, 10_000));
    }
}
