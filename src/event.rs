//! Binary wake-up event between the consumer and a blocked producer.

use std::sync::{Condvar, Mutex};

/// A single-waiter, single-signaler "something was consumed" event.
///
/// The consumer calls [`signal`](Self::signal) after reclaiming space; a
/// producer that found the ring full parks in [`wait`](Self::wait) until the
/// next signal. Repeated signals before a wait coalesce into one.
///
/// The mutex acquire/release on both paths gives the full barrier the ring
/// protocol needs: a producer returning from `wait()` observes every store
/// the consumer made before `signal()`, including the head advance that was
/// published with relaxed ordering.
pub struct ConsumedEvent {
    set: Mutex<bool>,
    cond: Condvar,
}

impl ConsumedEvent {
    pub fn new() -> Self {
        Self {
            set: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Marks the event as set and wakes the waiter, if any. Idempotent.
    pub fn signal(&self) {
        let mut set = self.set.lock().expect("consumed event lock poisoned");
        *set = true;
        self.cond.notify_one();
    }

    /// Consumes a pending signal, blocking until one arrives.
    pub fn wait(&self) {
        let mut set = self.set.lock().expect("consumed event lock poisoned");
        while !*set {
            set = self.cond.wait(set).expect("consumed event lock poisoned");
        }
        *set = false;
    }
}

impl Default for ConsumedEvent {
    fn default() -> Self {
        Self::new()
    }
}
