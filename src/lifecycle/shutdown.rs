//! Bounded joins for background threads.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Joins `handle` if it finishes within `timeout`.
///
/// Returns `false` when the deadline passed; the thread is then detached.
pub fn join_with_deadline(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let name = handle.thread().name().unwrap_or("unnamed").to_string();
    let deadline = Instant::now() + timeout;

    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!(thread = %name, "Thread still running at shutdown deadline");
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }

    if handle.join().is_err() {
        tracing::error!(thread = %name, "Thread panicked before shutdown");
    }
    true
}
