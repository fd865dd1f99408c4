//! Cooperative thread suspension.
//!
//! A thread must never be frozen while it holds an internal lock, or the
//! whole runtime can deadlock. Instead of OS-level force-suspend, a
//! thread wishing to suspend another raises a suspend request and waits;
//! the target notices at its next safepoint — a point where it is
//! guaranteed to hold no lightweight critical section — and parks itself
//! on a condition variable until resumed.
//!
//! Safepoints are polled explicitly ([`SafepointState::poll`]) and on
//! every critical-section exit.

use std::sync::{Condvar, Mutex};

#[derive(Default)]
struct SuspendInner {
    /// Another thread has asked this one to park
    suspend_requested: bool,
    /// This thread is parked at a safepoint
    suspended: bool,
    /// Depth of lightweight critical sections currently held
    critical_depth: u32,
}

/// Per-thread suspension state, shared between the owning thread and the
/// threads that want to suspend it.
#[derive(Default)]
pub struct SafepointState {
    inner: Mutex<SuspendInner>,
    changed: Condvar,
}

/// Holds a lightweight critical section; suspension of the owning thread
/// is deferred until the last guard drops.
pub struct CriticalGuard<'a> {
    state: &'a SafepointState,
}

impl SafepointState {
    /// Fresh state: not suspended, nothing requested.
    #[must_use]
    pub fn new() -> SafepointState {
        SafepointState::default()
    }

    /// Enter a lightweight critical section. While any guard is held the
    /// thread cannot be parked.
    #[must_use]
    pub fn enter_critical(&self) -> CriticalGuard<'_> {
        let mut inner = self.inner.lock().expect("safepoint state poisoned");
        inner.critical_depth += 1;
        CriticalGuard { state: self }
    }

    /// A safepoint: if suspension was requested and no critical section
    /// is held, park here until resumed. Called by the owning thread.
    pub fn poll(&self) {
        let mut inner = self.inner.lock().expect("safepoint state poisoned");
        if !inner.suspend_requested || inner.critical_depth > 0 {
            return;
        }
        inner.suspended = true;
        self.changed.notify_all();
        while inner.suspend_requested {
            inner = self
                .changed
                .wait(inner)
                .expect("safepoint state poisoned");
        }
        inner.suspended = false;
        self.changed.notify_all();
    }

    /// Ask the owning thread to park, and wait until it actually has.
    /// The target keeps running until it reaches a safepoint outside all
    /// critical sections; only then is it considered truly suspended.
    pub fn request_suspend(&self) {
        let mut inner = self.inner.lock().expect("safepoint state poisoned");
        inner.suspend_requested = true;
        while !inner.suspended {
            inner = self
                .changed
                .wait(inner)
                .expect("safepoint state poisoned");
        }
    }

    /// Release a parked thread.
    pub fn resume(&self) {
        let mut inner = self.inner.lock().expect("safepoint state poisoned");
        inner.suspend_requested = false;
        self.changed.notify_all();
    }

    /// True while the owning thread is parked at a safepoint.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.inner
            .lock()
            .expect("safepoint state poisoned")
            .suspended
    }
}

impl Drop for CriticalGuard<'_> {
    fn drop(&mut self) {
        {
            let mut inner = self
                .state
                .inner
                .lock()
                .expect("safepoint state poisoned");
            inner.critical_depth -= 1;
            if inner.critical_depth > 0 {
                return;
            }
        }
        // Leaving the outermost critical section is itself a safepoint
        self.state.poll();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn poll_without_request_is_free() {
        let state = SafepointState::new();
        state.poll();
        assert!(!state.is_suspended());
    }

    #[test]
    fn suspend_waits_for_a_safepoint() {
        let state = Arc::new(SafepointState::new());
        let stop = Arc::new(AtomicBool::new(false));

        let worker_state = state.clone();
        let worker_stop = stop.clone();
        let worker = std::thread::spawn(move || {
            while !worker_stop.load(Ordering::SeqCst) {
                worker_state.poll();
                std::thread::yield_now();
            }
        });

        state.request_suspend();
        assert!(state.is_suspended());
        state.resume();
        stop.store(true, Ordering::SeqCst);
        worker.join().unwrap();
        assert!(!state.is_suspended());
    }

    #[test]
    fn critical_sections_defer_suspension() {
        let state = Arc::new(SafepointState::new());
        let stop = Arc::new(AtomicBool::new(false));

        let worker_state = state.clone();
        let worker_stop = stop.clone();
        let worker = std::thread::spawn(move || {
            {
                let _guard = worker_state.enter_critical();
                // Polling inside a critical section must not park
                worker_state.poll();
                assert!(!worker_state.is_suspended());
                std::thread::sleep(std::time::Duration::from_millis(20));
                // Dropping the guard reaches the safepoint
            }
            while !worker_stop.load(Ordering::SeqCst) {
                worker_state.poll();
                std::thread::yield_now();
            }
        });

        state.request_suspend();
        // The worker only counts as suspended once it left the critical
        // section
        assert!(state.is_suspended());
        state.resume();
        stop.store(true, Ordering::SeqCst);
        worker.join().unwrap();
    }
}
