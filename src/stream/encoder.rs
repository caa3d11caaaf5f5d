//! External encoder process adapter
//!
//! The sink talks to the encoder through two narrow traits: an
//! [`EncoderProcess`] that owns the process lifecycle and a [`FrameWriter`]
//! that owns the input pipe. The writer moves into the stream thread, so
//! the sink can still terminate the process while a write is blocked.

use parking_lot::Mutex;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::OutputConfig;
use crate::constants::ENCODER_CHANNELS;
use crate::error::StreamError;
use crate::frame::Frame;
use crate::shutdown::join_with_timeout;

/// Fixed stream parameters negotiated at encoder start
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSpec {
    pub program: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate: String,
}

impl EncoderSpec {
    pub fn from_output(output: &OutputConfig) -> Self {
        Self {
            program: output.encoder_program.clone(),
            url: output.url.clone(),
            width: output.width,
            height: output.height,
            fps: output.fps,
            bitrate: output.bitrate.clone(),
        }
    }

    /// Exact byte count of one frame on the pipe
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * ENCODER_CHANNELS
    }
}

/// Input end of a running encoder
pub trait FrameWriter: Send {
    /// Write one frame's raw bytes. A closed pipe is [`StreamError::PipeClosed`].
    fn write_frame(&mut self, frame: &Frame) -> Result<(), StreamError>;
}

/// Encoder process lifecycle: Stopped → Running → Stopped
pub trait EncoderProcess: Send {
    /// Launch the process and hand back its input end
    fn start(&mut self, spec: &EncoderSpec) -> Result<Box<dyn FrameWriter>, StreamError>;

    /// Ask the process to exit, killing it if it outlives `timeout`
    fn stop(&mut self, timeout: Duration);

    fn is_running(&mut self) -> bool;
}

/// Reject frames that do not match the negotiated shape
fn check_frame(spec_bytes: usize, frame: &Frame) -> Result<(), StreamError> {
    if frame.channels as usize != ENCODER_CHANNELS || frame.data.len() != spec_bytes {
        return Err(StreamError::UnsupportedFormat(format!(
            "{}x{}x{} frame ({} bytes), encoder expects {} bytes",
            frame.width,
            frame.height,
            frame.channels,
            frame.data.len(),
            spec_bytes
        )));
    }
    Ok(())
}

/// ffmpeg pushing H.264 over FLV (RTMP)
#[derive(Default)]
pub struct FfmpegEncoder {
    child: Option<Child>,
    stderr_reader: Option<JoinHandle<()>>,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command-line arguments for a spec
    pub fn args(spec: &EncoderSpec) -> Vec<String> {
        let size = format!("{}x{}", spec.width, spec.height);
        let fps = spec.fps.to_string();
        [
            "-y",
            "-f",
            "rawvideo",
            "-vcodec",
            "rawvideo",
            "-pix_fmt",
            "bgr24",
            "-s",
            size.as_str(),
            "-r",
            fps.as_str(),
            "-i",
            "-",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-preset",
            "ultrafast",
            "-tune",
            "zerolatency",
            "-b:v",
            spec.bitrate.as_str(),
            "-f",
            "flv",
            spec.url.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

struct PipeWriter {
    stdin: ChildStdin,
    frame_bytes: usize,
}

impl FrameWriter for PipeWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), StreamError> {
        check_frame(self.frame_bytes, frame)?;
        self.stdin
            .write_all(&frame.data)
            .map_err(|e| StreamError::PipeClosed(e.to_string()))
    }
}

/// Wait up to `timeout` for `child` to exit on its own, then kill it
fn terminate(child: &mut Child, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    let exited = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
            Ok(None) => break None,
            Err(e) => {
                tracing::warn!("Failed to poll encoder: {}", e);
                break None;
            }
        }
    };

    match exited {
        Some(status) => tracing::info!("Encoder exited: {}", status),
        None => {
            tracing::warn!("Encoder did not exit within {:?}, killing", timeout);
            if let Err(e) = child.kill() {
                tracing::error!("Failed to kill encoder: {}", e);
            }
            let _ = child.wait();
        }
    }
}

impl EncoderProcess for FfmpegEncoder {
    fn start(&mut self, spec: &EncoderSpec) -> Result<Box<dyn FrameWriter>, StreamError> {
        if self.is_running() {
            return Err(StreamError::EncoderStart("encoder already running".into()));
        }

        let mut child = Command::new(&spec.program)
            .args(Self::args(spec))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| StreamError::EncoderStart(format!("{}: {}", spec.program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| StreamError::EncoderStart("encoder stdin unavailable".into()))?;

        // Drain stderr so a chatty encoder never stalls on a full pipe
        if let Some(stderr) = child.stderr.take() {
            let spawned = thread::Builder::new()
                .name("encoder-stderr".to_string())
                .spawn(move || {
                    for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                        tracing::debug!(target: "encoder", "{}", line);
                    }
                });
            match spawned {
                Ok(reader) => self.stderr_reader = Some(reader),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(StreamError::Spawn(e.to_string()));
                }
            }
        }

        tracing::info!(
            "Started {} (pid {}) -> {} at {}x{}@{}",
            spec.program,
            child.id(),
            spec.url,
            spec.width,
            spec.height,
            spec.fps
        );
        self.child = Some(child);

        Ok(Box::new(PipeWriter {
            stdin,
            frame_bytes: spec.frame_bytes(),
        }))
    }

    fn stop(&mut self, timeout: Duration) {
        if let Some(mut child) = self.child.take() {
            // stdin closed when the writer dropped; give the encoder time to flush
            terminate(&mut child, timeout);
        }

        if let Some(reader) = self.stderr_reader.take() {
            join_with_timeout(reader, Duration::from_secs(1));
        }
    }

    fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.stop(Duration::from_millis(500));
    }
}

/// Discards frames; for dry runs without an ingest server
#[derive(Default)]
pub struct NullEncoder {
    running: Arc<AtomicBool>,
}

impl NullEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

struct NullWriter {
    frame_bytes: usize,
    running: Arc<AtomicBool>,
}

impl FrameWriter for NullWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), StreamError> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(StreamError::PipeClosed("null encoder stopped".into()));
        }
        check_frame(self.frame_bytes, frame)
    }
}

impl EncoderProcess for NullEncoder {
    fn start(&mut self, spec: &EncoderSpec) -> Result<Box<dyn FrameWriter>, StreamError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Null encoder accepting {}x{}@{}", spec.width, spec.height, spec.fps);
        Ok(Box::new(NullWriter {
            frame_bytes: spec.frame_bytes(),
            running: self.running.clone(),
        }))
    }

    fn stop(&mut self, _timeout: Duration) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&mut self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// One frame as seen by a [`RecordingEncoder`]
#[derive(Debug, Clone, Copy)]
pub struct Emission {
    pub sequence: u64,
    pub at: Instant,
}

/// Shared log of emitted frames
pub type EmissionLog = Arc<Mutex<Vec<Emission>>>;

/// Records sequence numbers and emission instants instead of encoding.
///
/// `fail_after` simulates an encoder that dies after that many frames.
#[derive(Default)]
pub struct RecordingEncoder {
    log: EmissionLog,
    fail_after: Option<usize>,
    running: Arc<AtomicBool>,
}

impl RecordingEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(frames: usize) -> Self {
        Self {
            fail_after: Some(frames),
            ..Self::default()
        }
    }

    pub fn log(&self) -> EmissionLog {
        self.log.clone()
    }
}

struct RecordingWriter {
    log: EmissionLog,
    remaining: Option<usize>,
    running: Arc<AtomicBool>,
}

impl FrameWriter for RecordingWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), StreamError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                self.running.store(false, Ordering::SeqCst);
                return Err(StreamError::PipeClosed("Broken pipe (os error 32)".into()));
            }
            *remaining -= 1;
        }
        self.log.lock().push(Emission {
            sequence: frame.sequence,
            at: Instant::now(),
        });
        Ok(())
    }
}

impl EncoderProcess for RecordingEncoder {
    fn start(&mut self, _spec: &EncoderSpec) -> Result<Box<dyn FrameWriter>, StreamError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(Box::new(RecordingWriter {
            log: self.log.clone(),
            remaining: self.fail_after,
            running: self.running.clone(),
        }))
    }

    fn stop(&mut self, _timeout: Duration) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&mut self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
