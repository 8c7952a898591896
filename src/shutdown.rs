//! Process-wide shutdown coordination.
//! A one-way flag set from the Ctrl-C handler; long-running CLI commands poll it.
//!
//! Relaxed atomics are enough for a flag that only ever goes false -> true.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Request a cooperative shutdown (idempotent, signal-handler safe).
#[inline]
pub fn request() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

#[inline]
pub fn is_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Block the calling thread until a shutdown is requested, checking every `poll`.
pub fn wait(poll: Duration) {
    while !is_requested() {
        thread::sleep(poll);
    }
}

/// Test-only: clear the flag.
#[cfg(any(test, feature = "test-helpers"))]
#[inline]
pub fn reset() {
    SHUTDOWN.store(false, Ordering::Relaxed);
}
