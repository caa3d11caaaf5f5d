//! Bounded thread joins
//!
//! `std::thread::JoinHandle` has no timed join, so a worker is polled with
//! `is_finished` until the deadline. A worker that misses the deadline is
//! detached and reported; its loop still observes the cleared run flag.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Join `handle` if it finishes within `timeout`.
///
/// Returns `true` when the thread was joined, `false` when it was detached.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let name = handle.thread().name().unwrap_or("unnamed").to_string();
    let deadline = Instant::now() + timeout;

    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!("Thread {} did not stop within {:?}, detaching", name, timeout);
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }

    if handle.join().is_err() {
        tracing::error!("Thread {} panicked", name);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joins_finished_thread() {
        let handle = thread::spawn(|| {});
        assert!(join_with_timeout(handle, Duration::from_secs(1)));
    }

    #[test]
    fn test_detaches_stuck_thread() {
        let handle = thread::spawn(|| thread::sleep(Duration::from_millis(300)));
        assert!(!join_with_timeout(handle, Duration::from_millis(20)));
    }
}
