//! Drift-free frame pacing
//!
//! The next deadline is `max(now, deadline + interval)`. A late frame pulls
//! the deadline forward to "now" instead of queueing a burst, and sleep
//! overshoot never accumulates because the schedule advances from the
//! previous deadline rather than from the wake-up time.

use std::thread;
use std::time::{Duration, Instant};

/// Fixed-cadence pacer
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Pacer for a frame rate; zero fps is treated as 1
    pub fn from_fps(fps: u32) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / fps.max(1) as f64))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep until the current deadline, then schedule the next one.
    /// The first call returns immediately. Sleeps never exceed one interval.
    pub fn wait(&mut self) {
        let deadline = *self.deadline.get_or_insert_with(Instant::now);
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
        self.deadline = Some(Instant::now().max(deadline + self.interval));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_wait_is_immediate() {
        let mut pacer = Pacer::from_fps(1);
        let start = Instant::now();
        pacer.wait();
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_no_cumulative_drift() {
        let mut pacer = Pacer::new(Duration::from_millis(5));
        let start = Instant::now();
        for _ in 0..100 {
            pacer.wait();
        }
        // 99 full intervals after the immediate first wait
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(495), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(560), "{:?}", elapsed);
    }

    #[test]
    fn test_late_caller_does_not_burst() {
        let mut pacer = Pacer::new(Duration::from_millis(10));
        pacer.wait();
        thread::sleep(Duration::from_millis(50));

        // Deadline is in the past: returns at once, next one is a full interval out
        let start = Instant::now();
        pacer.wait();
        pacer.wait();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(9), "{:?}", elapsed);
    }
}
