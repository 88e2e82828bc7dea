//! # Latest-value bus
//!
//! A single slot shared between two pipeline stages. Writes overwrite whatever is in the slot and
//! reads return a copy of the newest value without removing it, so a slow reader skips stale
//! values instead of falling behind and a fast reader sees the same value again.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex, MutexGuard};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Single slot, overwrite-on-write bus.
///
/// Clones share the same slot.
#[derive(Debug)]
pub struct Bus<T> {
    slot: Arc<Mutex<Option<T>>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: Clone> Bus<T> {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Write a value, replacing any previous one whether or not it was read.
    pub fn write(&self, value: T) {
        *self.lock() = Some(value);
    }

    /// Read the most recently written value, or `None` if nothing has been written yet.
    pub fn read(&self) -> Option<T> {
        self.lock().clone()
    }

    /// A panic in another stage while holding the lock can't leave the slot half written, so
    /// poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Clone> Default for Bus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Bus<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn test_bus_latest_value() {
        let bus = Bus::new();
        assert_eq!(bus.read(), None);

        // Last write wins
        bus.write(1.0);
        bus.write(2.0);
        assert_eq!(bus.read(), Some(2.0));

        // Reads don't consume
        assert_eq!(bus.read(), Some(2.0));
        assert_eq!(bus.read(), Some(2.0));
    }

    #[test]
    fn test_bus_shared_between_threads() {
        let bus = Bus::new();
        let writer = bus.clone();

        thread::spawn(move || {
            for i in 0..1000u32 {
                writer.write(i);
            }
        })
        .join()
        .unwrap();

        assert_eq!(bus.read(), Some(999));
    }

    #[test]
    fn test_bus_survives_poisoning() {
        let bus = Bus::new();
        bus.write(String::from("before"));

        let poisoner = bus.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.slot.lock().unwrap();
            panic!("poison the slot");
        })
        .join();

        assert_eq!(bus.read(), Some(String::from("before")));
        bus.write(String::from("after"));
        assert_eq!(bus.read(), Some(String::from("after")));
    }
}
