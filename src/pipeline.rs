//! Pipeline orchestration
//!
//! Wires the three concurrency units together: the capture thread fills
//! the raw side of the [`LatestFrameSlot`], the compositor thread turns
//! each new raw frame into a panorama on the processed side, and
//! [`Orchestrator::forward`] hands new panoramas to the [`StreamSink`].
//! A dead encoder only takes the stream path down; it is restarted
//! wholesale on the next forward.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::capture::{CaptureSource, FrameSource, LatestFrameSlot};
use crate::compose::FrameCompositor;
use crate::config::PipelineConfig;
use crate::constants::{COMPOSITOR_IDLE_WAIT, THREAD_JOIN_TIMEOUT};
use crate::error::{CalibrationError, Error, Result};
use crate::frame::Frame;
use crate::projection::CalibrationSet;
use crate::shutdown::join_with_timeout;
use crate::stream::{EncoderProcess, EncoderSpec, SinkStats, StreamSink};

/// Pipeline-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_captured: u64,
    pub read_failures: u64,
    pub frames_forwarded: u64,
    pub sink_restarts: u64,
    pub sink: SinkStats,
}

/// Owns every thread and process of a running pipeline
pub struct Orchestrator {
    slot: Arc<LatestFrameSlot>,
    compositor: Arc<FrameCompositor>,
    capture: CaptureSource,
    compositing: Arc<AtomicBool>,
    compositor_thread: Option<JoinHandle<()>>,
    sink: StreamSink,
    last_forwarded: Option<u64>,
    frames_forwarded: u64,
    sink_restarts: u64,
    started: bool,
}

impl Orchestrator {
    pub fn new(
        config: &PipelineConfig,
        calibration: CalibrationSet,
        encoder: Box<dyn EncoderProcess>,
    ) -> Result<Self> {
        config.validate()?;
        let slot = Arc::new(LatestFrameSlot::new());
        let compositor = Arc::new(FrameCompositor::new(config, calibration)?);
        let sink = StreamSink::new(
            EncoderSpec::from_output(&config.output),
            config.output.queue_capacity,
            encoder,
        );

        Ok(Self {
            capture: CaptureSource::new(slot.clone()),
            slot,
            compositor,
            compositing: Arc::new(AtomicBool::new(false)),
            compositor_thread: None,
            sink,
            last_forwarded: None,
            frames_forwarded: 0,
            sink_restarts: 0,
            started: false,
        })
    }

    /// Start the stream sink, the compositor and capture from `source`.
    /// Anything already started is shut down again if a later step fails.
    pub fn start(&mut self, source: Box<dyn FrameSource>) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;

        if let Err(e) = self.start_units(source) {
            tracing::error!("Pipeline failed to start: {}", e);
            self.shutdown();
            return Err(e);
        }

        tracing::info!("Pipeline running");
        Ok(())
    }

    fn start_units(&mut self, source: Box<dyn FrameSource>) -> Result<()> {
        self.sink.start()?;
        self.start_compositor()?;
        self.capture.start(source)?;
        Ok(())
    }

    fn start_compositor(&mut self) -> Result<()> {
        let running = self.compositing.clone();
        let slot = self.slot.clone();
        let compositor = self.compositor.clone();
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("compositor".to_string())
            .spawn(move || {
                let mut last_seen = None;
                while running.load(Ordering::Relaxed) {
                    match slot.raw_newer_than(last_seen) {
                        Some(raw) => {
                            last_seen = Some(raw.sequence);
                            slot.store_processed(compositor.process(&raw));
                        }
                        None => thread::sleep(COMPOSITOR_IDLE_WAIT),
                    }
                }
                tracing::debug!("Compositor exiting");
            })
            .map_err(|e| {
                self.compositing.store(false, Ordering::SeqCst);
                Error::Io(e)
            })?;

        self.compositor_thread = Some(handle);
        Ok(())
    }

    /// Hand the newest processed frame to the stream sink.
    ///
    /// Restarts the sink first if its encoder died. Returns whether a new
    /// frame was queued.
    pub fn forward(&mut self) -> Result<bool> {
        if let Some(failure) = self.sink.take_failure() {
            tracing::warn!("Stream failed ({}), restarting encoder", failure);
            self.sink.restart()?;
            self.sink_restarts += 1;
        }

        let Some(frame) = self.slot.processed_newer_than(self.last_forwarded) else {
            return Ok(false);
        };
        self.last_forwarded = Some(frame.sequence);

        let queued = self.sink.push(frame);
        if queued {
            self.frames_forwarded += 1;
        }
        Ok(queued)
    }

    /// Copy of the latest finished panorama, if any
    pub fn latest_processed(&self) -> Option<Frame> {
        self.slot.latest_processed()
    }

    /// Publish new lens parameters without pausing the pipeline
    pub fn recalibrate(
        &self,
        calibration: CalibrationSet,
    ) -> std::result::Result<(), CalibrationError> {
        self.compositor.recalibrate(calibration)
    }

    pub fn compositor(&self) -> &Arc<FrameCompositor> {
        &self.compositor
    }

    pub fn is_running(&self) -> bool {
        self.capture.is_running()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            frames_captured: self.capture.frames_captured(),
            read_failures: self.capture.read_failures(),
            frames_forwarded: self.frames_forwarded,
            sink_restarts: self.sink_restarts,
            sink: self.sink.stats(),
        }
    }

    /// Ordered shutdown: capture, compositor, stream and encoder, then any
    /// projection rebuilds. Safe to call repeatedly or before `start`.
    pub fn shutdown(&mut self) {
        self.capture.stop();

        self.compositing.store(false, Ordering::SeqCst);
        if let Some(handle) = self.compositor_thread.take() {
            join_with_timeout(handle, THREAD_JOIN_TIMEOUT);
        }

        self.sink.stop();
        self.compositor.shutdown();

        if std::mem::take(&mut self.started) {
            tracing::info!("Pipeline stopped");
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
