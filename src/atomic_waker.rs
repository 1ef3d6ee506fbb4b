//! Waker slot guarded by critical sections.
//!
//! Holds the waker of the single task awaiting [`crate::PingPong::drained`];
//! the completion interrupt wakes it when the peripheral goes idle.

use core::{cell::UnsafeCell, task::Waker};

pub(crate) struct AtomicWaker {
    waker: UnsafeCell<Option<Waker>>,
}

// SAFETY: Every access to the `UnsafeCell` happens inside a critical section.
unsafe impl Send for AtomicWaker {}
// SAFETY: Every access to the `UnsafeCell` happens inside a critical section.
unsafe impl Sync for AtomicWaker {}

impl AtomicWaker {
    pub(crate) const fn new() -> Self {
        Self {
            waker: UnsafeCell::new(None),
        }
    }

    /// Stores `new_waker`, replacing the previous one unless both wake the same task.
    pub(crate) fn register(&self, new_waker: &Waker) {
        critical_section::with(|_| {
            // SAFETY: Inside a critical section, and neither this nor `wake`
            // holds the reference past the closure.
            let slot = unsafe { &mut *self.waker.get() };
            match slot {
                Some(w) if w.will_wake(new_waker) => {}
                _ => *slot = Some(new_waker.clone()),
            }
        });
    }

    /// Takes the registered waker, if any, and wakes it outside the critical section.
    pub(crate) fn wake(&self) {
        // SAFETY: Inside a critical section, and neither this nor `register`
        // holds the reference past the closure.
        if let Some(w) = critical_section::with(|_| unsafe { &mut *self.waker.get() }.take()) {
            w.wake();
        }
    }
}
