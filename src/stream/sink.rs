//! Paced stream sink
//!
//! A drop-oldest [`FrameQueue`] in front of a consumer thread that writes
//! one frame per interval into the encoder's input pipe. A broken pipe ends
//! the consumer and is reported on a failure channel; the producer side is
//! never blocked by either.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::constants::{ENCODER_TERMINATE_TIMEOUT, STREAM_IDLE_WAIT, STREAM_JOIN_TIMEOUT};
use crate::error::StreamError;
use crate::frame::Frame;
use crate::pacing::Pacer;
use crate::shutdown::join_with_timeout;
use crate::stream::encoder::{EncoderProcess, EncoderSpec, FrameWriter};
use crate::stream::queue::{FrameQueue, SharedFrameQueue};

/// Sink lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Stopped,
    Running,
}

/// Counters for monitoring the stream path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Frames successfully handed to the encoder
    pub frames_written: u64,
    /// Frames evicted from the queue on overflow
    pub frames_dropped: usize,
    /// Frames currently waiting
    pub queue_len: usize,
}

/// Bounded queue plus paced consumer feeding an external encoder
pub struct StreamSink {
    spec: EncoderSpec,
    queue: SharedFrameQueue,
    encoder: Box<dyn EncoderProcess>,
    /// Run flag of the current consumer; replaced on every start
    running: Arc<AtomicBool>,
    consumer: Option<JoinHandle<()>>,
    /// Failure signal of the current run; replaced on every start
    failure_rx: Receiver<StreamError>,
    frames_written: Arc<AtomicU64>,
}

impl StreamSink {
    pub fn new(spec: EncoderSpec, capacity: usize, encoder: Box<dyn EncoderProcess>) -> Self {
        let (_, failure_rx) = bounded(1);
        Self {
            spec,
            queue: Arc::new(FrameQueue::new(capacity)),
            encoder,
            running: Arc::new(AtomicBool::new(false)),
            consumer: None,
            failure_rx,
            frames_written: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Launch the encoder and the consumer thread
    pub fn start(&mut self) -> Result<(), StreamError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        let writer = self.encoder.start(&self.spec)?;

        // per-run flag and channel; a consumer left behind by stop() only sees its own
        let running = Arc::new(AtomicBool::new(true));
        let (failure_tx, failure_rx) = bounded(1);
        self.running = running.clone();
        self.failure_rx = failure_rx;

        let queue = self.queue.clone();
        let frames_written = self.frames_written.clone();
        let pacer = Pacer::from_fps(self.spec.fps);
        let interval = pacer.interval();

        let spawned = thread::Builder::new()
            .name("stream".to_string())
            .spawn(move || consume(writer, queue, pacer, running, failure_tx, frames_written));

        match spawned {
            Ok(handle) => {
                self.consumer = Some(handle);
                tracing::info!(
                    "Stream sink running: {}x{}@{} (every {:?}) -> {}",
                    self.spec.width,
                    self.spec.height,
                    self.spec.fps,
                    interval,
                    self.spec.url
                );
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.encoder.stop(ENCODER_TERMINATE_TIMEOUT);
                Err(StreamError::Spawn(e.to_string()))
            }
        }
    }

    /// Queue a frame for emission, resizing it to the stream resolution.
    ///
    /// Never blocks. Returns false if the sink is not running or the frame
    /// cannot be converted to the encoder's format.
    pub fn push(&self, frame: Frame) -> bool {
        if !self.running.load(Ordering::Relaxed) {
            return false;
        }

        let frame = if frame.width != self.spec.width || frame.height != self.spec.height {
            match frame.resized(self.spec.width, self.spec.height) {
                Ok(resized) => resized,
                Err(e) => {
                    tracing::warn!("Rejecting frame {}: {}", frame.sequence, e);
                    return false;
                }
            }
        } else {
            frame
        };

        if let Some(evicted) = self.queue.push(frame) {
            tracing::trace!("Stream queue full, dropped frame {}", evicted.sequence);
        }
        true
    }

    /// Stop the consumer and the encoder, then drain the queue.
    /// Safe to call repeatedly or before `start`.
    pub fn stop(&mut self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);

        if let Some(handle) = self.consumer.take() {
            join_with_timeout(handle, STREAM_JOIN_TIMEOUT);
        }
        self.encoder.stop(ENCODER_TERMINATE_TIMEOUT);

        let drained = self.queue.clear();
        if was_running || drained > 0 {
            tracing::info!("Stream sink stopped ({} queued frames discarded)", drained);
        }
    }

    /// Tear down and start a fresh encoder process
    pub fn restart(&mut self) -> Result<(), StreamError> {
        tracing::info!("Restarting stream sink");
        self.stop();
        self.start()
    }

    pub fn state(&self) -> SinkState {
        if self.running.load(Ordering::SeqCst) {
            SinkState::Running
        } else {
            SinkState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SinkState::Running
    }

    /// Take the pending stream-failed condition, if the consumer raised one
    pub fn take_failure(&self) -> Option<StreamError> {
        self.failure_rx.try_recv().ok()
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            frames_written: self.frames_written.load(Ordering::Relaxed),
            frames_dropped: self.queue.dropped_count(),
            queue_len: self.queue.len(),
        }
    }

    pub fn spec(&self) -> &EncoderSpec {
        &self.spec
    }
}

impl Drop for StreamSink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Consumer loop: one frame per deadline, idle without consuming a slot
fn consume(
    mut writer: Box<dyn FrameWriter>,
    queue: SharedFrameQueue,
    mut pacer: Pacer,
    running: Arc<AtomicBool>,
    failure_tx: Sender<StreamError>,
    frames_written: Arc<AtomicU64>,
) {
    while running.load(Ordering::Relaxed) {
        let Some(frame) = queue.pop() else {
            thread::sleep(STREAM_IDLE_WAIT);
            continue;
        };

        pacer.wait();
        if !running.load(Ordering::Relaxed) {
            break;
        }

        match writer.write_frame(&frame) {
            Ok(()) => {
                frames_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(StreamError::PipeClosed(reason)) => {
                tracing::error!("Encoder input closed: {}", reason);
                running.store(false, Ordering::SeqCst);
                let _ = failure_tx.try_send(StreamError::PipeClosed(reason));
                break;
            }
            Err(e) => {
                tracing::warn!("Skipping frame {}: {}", frame.sequence, e);
            }
        }
    }

    tracing::debug!("Stream consumer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::encoder::RecordingEncoder;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    fn spec(fps: u32) -> EncoderSpec {
        EncoderSpec {
            program: "unused".into(),
            url: "rtmp://127.0.0.1/live/test".into(),
            width: 8,
            height: 4,
            fps,
            bitrate: "100k".into(),
        }
    }

    fn frame(seq: u64) -> Frame {
        Frame::filled(8, 4, 3, 50).with_sequence(seq)
    }

    /// Records the shape of every frame written
    #[derive(Default)]
    struct ShapeEncoder {
        shapes: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    struct ShapeWriter {
        shapes: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    impl FrameWriter for ShapeWriter {
        fn write_frame(&mut self, frame: &Frame) -> Result<(), StreamError> {
            self.shapes.lock().push((frame.width, frame.height));
            Ok(())
        }
    }

    impl EncoderProcess for ShapeEncoder {
        fn start(&mut self, _spec: &EncoderSpec) -> Result<Box<dyn FrameWriter>, StreamError> {
            Ok(Box::new(ShapeWriter {
                shapes: self.shapes.clone(),
            }))
        }

        fn stop(&mut self, _timeout: Duration) {}

        fn is_running(&mut self) -> bool {
            true
        }
    }

    /// First writer blocks past the join timeout, then reports a closed pipe
    #[derive(Default)]
    struct StallingEncoder {
        starts: usize,
        shapes: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    struct StalledWriter;

    impl FrameWriter for StalledWriter {
        fn write_frame(&mut self, _frame: &Frame) -> Result<(), StreamError> {
            thread::sleep(STREAM_JOIN_TIMEOUT + Duration::from_millis(500));
            Err(StreamError::PipeClosed("old encoder killed".into()))
        }
    }

    impl EncoderProcess for StallingEncoder {
        fn start(&mut self, _spec: &EncoderSpec) -> Result<Box<dyn FrameWriter>, StreamError> {
            self.starts += 1;
            if self.starts == 1 {
                Ok(Box::new(StalledWriter))
            } else {
                Ok(Box::new(ShapeWriter {
                    shapes: self.shapes.clone(),
                }))
            }
        }

        fn stop(&mut self, _timeout: Duration) {}

        fn is_running(&mut self) -> bool {
            true
        }
    }

    #[test]
    fn test_pacing_converges_to_target_interval() {
        let encoder = RecordingEncoder::new();
        let log = encoder.log();
        let mut sink = StreamSink::new(spec(100), 10, Box::new(encoder));
        sink.start().unwrap();

        let give_up = Instant::now() + Duration::from_secs(10);
        let mut seq = 0;
        while log.lock().len() < 101 && Instant::now() < give_up {
            sink.push(frame(seq));
            seq += 1;
            thread::sleep(Duration::from_millis(2));
        }
        sink.stop();

        let emissions = log.lock();
        assert!(emissions.len() >= 101);
        let span = emissions[100].at.duration_since(emissions[0].at);
        let mean_ms = span.as_secs_f64() * 1000.0 / 100.0;
        assert!((9.5..12.0).contains(&mean_ms), "mean interval {mean_ms}ms");

        // emitted in queue order
        assert!(emissions.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[test]
    fn test_broken_pipe_signals_failure_and_stops() {
        let mut sink = StreamSink::new(spec(200), 10, Box::new(RecordingEncoder::failing_after(3)));
        sink.start().unwrap();

        let give_up = Instant::now() + Duration::from_secs(3);
        let mut failure = None;
        let mut seq = 0;
        while failure.is_none() && Instant::now() < give_up {
            sink.push(frame(seq));
            seq += 1;
            thread::sleep(Duration::from_millis(2));
            failure = sink.take_failure();
        }

        assert!(matches!(failure, Some(StreamError::PipeClosed(_))));
        assert_eq!(sink.state(), SinkState::Stopped);
        assert!(!sink.push(frame(seq)));
        assert_eq!(sink.stats().frames_written, 3);
    }

    #[test]
    fn test_restart_after_failure_resumes_emission() {
        let encoder = RecordingEncoder::failing_after(2);
        let log = encoder.log();
        let mut sink = StreamSink::new(spec(200), 10, Box::new(encoder));
        sink.start().unwrap();

        let give_up = Instant::now() + Duration::from_secs(3);
        let mut seq = 0;
        while log.lock().len() < 4 && Instant::now() < give_up {
            if sink.take_failure().is_some() {
                sink.restart().unwrap();
            }
            sink.push(frame(seq));
            seq += 1;
            thread::sleep(Duration::from_millis(2));
        }
        sink.stop();

        assert_eq!(log.lock().len(), 4);
    }

    #[test]
    fn test_push_on_stopped_sink_fails() {
        let sink = StreamSink::new(spec(30), 4, Box::new(RecordingEncoder::new()));
        assert!(!sink.push(frame(0)));
        assert_eq!(sink.stats().queue_len, 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut sink = StreamSink::new(spec(30), 4, Box::new(RecordingEncoder::new()));
        sink.stop();
        sink.start().unwrap();
        assert!(sink.is_running());
        sink.stop();
        sink.stop();
        assert_eq!(sink.state(), SinkState::Stopped);
    }

    #[test]
    fn test_overflow_drops_oldest_without_blocking() {
        let mut sink = StreamSink::new(spec(5), 4, Box::new(RecordingEncoder::new()));
        sink.start().unwrap();

        let started = Instant::now();
        for seq in 0..25 {
            assert!(sink.push(frame(seq)));
        }
        assert!(started.elapsed() < Duration::from_millis(100));

        let stats = sink.stats();
        assert!(stats.queue_len <= 4);
        assert!(stats.frames_dropped >= 19, "dropped {}", stats.frames_dropped);

        sink.stop();
        assert_eq!(sink.stats().queue_len, 0);
    }

    #[test]
    fn test_push_resizes_to_stream_resolution() {
        let encoder = ShapeEncoder::default();
        let shapes = encoder.shapes.clone();
        let mut sink = StreamSink::new(spec(200), 4, Box::new(encoder));
        sink.start().unwrap();

        assert!(sink.push(Frame::filled(16, 8, 3, 10)));
        assert!(!sink.push(Frame::filled(16, 8, 4, 10)));

        let give_up = Instant::now() + Duration::from_secs(2);
        while shapes.lock().is_empty() && Instant::now() < give_up {
            thread::sleep(Duration::from_millis(2));
        }
        sink.stop();

        assert_eq!(shapes.lock().as_slice(), &[(8, 4)]);
    }

    #[test]
    fn test_detached_consumer_cannot_disturb_restarted_run() {
        let encoder = StallingEncoder::default();
        let shapes = encoder.shapes.clone();
        let mut sink = StreamSink::new(spec(200), 4, Box::new(encoder));
        sink.start().unwrap();

        assert!(sink.push(frame(0)));
        let give_up = Instant::now() + Duration::from_secs(2);
        while sink.stats().queue_len > 0 && Instant::now() < give_up {
            thread::sleep(Duration::from_millis(2));
        }

        // the stalled consumer outlives the join and is left behind
        sink.restart().unwrap();
        thread::sleep(Duration::from_secs(1));

        assert_eq!(sink.state(), SinkState::Running);
        assert!(sink.take_failure().is_none());

        assert!(sink.push(frame(1)));
        let give_up = Instant::now() + Duration::from_secs(2);
        while shapes.lock().is_empty() && Instant::now() < give_up {
            thread::sleep(Duration::from_millis(2));
        }
        sink.stop();

        assert_eq!(shapes.lock().as_slice(), &[(8, 4)]);
    }
}
