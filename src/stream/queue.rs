//! Drop-oldest frame ring for the stream path
//!
//! Single producer (orchestrator), single consumer (stream thread). A push
//! on a full ring overwrites the oldest entry, so the producer never blocks
//! and the newest frame is never the one discarded.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::frame::Frame;

/// Fixed-capacity FIFO of frames with overwrite-on-full
pub struct FrameQueue {
    queue: ArrayQueue<Frame>,
    dropped: AtomicUsize,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Insert a frame, evicting and returning the oldest one if full
    pub fn push(&self, frame: Frame) -> Option<Frame> {
        let evicted = self.queue.force_push(frame);
        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Take the oldest frame
    pub fn pop(&self) -> Option<Frame> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Frames evicted by overflow since creation
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Discard everything queued, returning how many frames were removed
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        while self.queue.pop().is_some() {
            removed += 1;
        }
        removed
    }
}

/// Thread-safe handle to a frame queue
pub type SharedFrameQueue = Arc<FrameQueue>;
