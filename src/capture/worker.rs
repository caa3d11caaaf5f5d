//! Capture thread
//!
//! Runs a [`FrameSource`] on its own thread and publishes every frame into
//! the shared [`LatestFrameSlot`]. Read failures are logged and retried
//! after a short backoff; they never end the pipeline.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::capture::slot::LatestFrameSlot;
use crate::capture::source::FrameSource;
use crate::constants::{CAPTURE_RETRY_DELAY, THREAD_JOIN_TIMEOUT};
use crate::error::CaptureError;
use crate::shutdown::join_with_timeout;

/// Owns the device-read concurrency boundary
pub struct CaptureSource {
    /// Run flag of the current capture thread; replaced on every start
    running: Arc<AtomicBool>,

    /// Destination for captured frames
    slot: Arc<LatestFrameSlot>,

    /// Capture thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Next sequence number to assign
    sequence: Arc<AtomicU64>,

    /// Failed reads since start
    read_failures: Arc<AtomicU64>,
}

impl CaptureSource {
    pub fn new(slot: Arc<LatestFrameSlot>) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            slot,
            thread_handle: None,
            sequence: Arc::new(AtomicU64::new(0)),
            read_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start reading from `source` on a dedicated thread
    pub fn start(&mut self, mut source: Box<dyn FrameSource>) -> Result<(), CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        // a thread left behind by an earlier stop keeps its own flag
        let running = Arc::new(AtomicBool::new(true));
        self.running = running.clone();
        let slot = self.slot.clone();
        let sequence = self.sequence.clone();
        let read_failures = self.read_failures.clone();

        self.read_failures.store(0, Ordering::SeqCst);
        let start_time = Instant::now();
        let description = source.describe();

        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                tracing::info!("Capture started from {}", description);

                while running.load(Ordering::Relaxed) {
                    match source.read_frame() {
                        Ok(frame) => {
                            let seq = sequence.fetch_add(1, Ordering::Relaxed);
                            let timestamp = start_time.elapsed().as_micros() as u64;
                            slot.store_raw(frame.with_sequence(seq).with_timestamp(timestamp));
                        }
                        Err(e) => {
                            let failures = read_failures.fetch_add(1, Ordering::Relaxed) + 1;
                            if failures == 1 || failures % 50 == 0 {
                                tracing::warn!("Frame read failed ({} so far): {}", failures, e);
                            }
                            thread::sleep(CAPTURE_RETRY_DELAY);
                        }
                    }
                }

                tracing::info!("Capture stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CaptureError::Spawn(e.to_string())
            })?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop capturing. Safe to call repeatedly or before `start`.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            join_with_timeout(handle, THREAD_JOIN_TIMEOUT);
        }
    }

    /// Check if capture is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Frames captured since creation
    pub fn frames_captured(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Failed reads since the last start
    pub fn read_failures(&self) -> u64 {
        self.read_failures.load(Ordering::Relaxed)
    }

    pub fn slot(&self) -> &Arc<LatestFrameSlot> {
        &self.slot
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}
