//! # Panorama Streamer
//!
//! Real-time dual-fisheye to equirectangular stitching with paced live streaming.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                             CAPTURE THREAD                               │
//! │  ┌──────────────┐      ┌─────────────────────────────────────────────┐   │
//! │  │ FrameSource  │ ───▶ │ LatestFrameSlot (raw side, copy-in/out)     │   │
//! │  └──────────────┘      └──────────────────────┬──────────────────────┘   │
//! └─────────────────────────────────────────────────┼────────────────────────┘
//!                                                   ▼
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                            COMPOSITOR THREAD                             │
//! │  ┌────────────────┐   ┌────────────┐   ┌──────────────┐   ┌──────────┐   │
//! │  │ProjectionTable │──▶│   Remap    │──▶│ SeamBlender  │──▶│ Filters  │   │
//! │  │ (Arc, swapped) │   │ (bilinear) │   │ (2 seams)    │   │ (chain)  │   │
//! │  └────────────────┘   └────────────┘   └──────────────┘   └────┬─────┘   │
//! │                         LatestFrameSlot (processed side) ◀─────┘         │
//! └─────────────────────────────────────────────────┬────────────────────────┘
//!                                                   ▼ Orchestrator::forward
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                              STREAM THREAD                               │
//! │  FrameQueue (drop-oldest ring) ──▶ paced consumer ──▶ encoder stdin      │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod calibration_tools;
pub mod capture;
pub mod compose;
pub mod config;
pub mod error;
pub mod frame;
pub mod pacing;
pub mod pipeline;
pub mod projection;
pub mod stream;

pub(crate) mod shutdown;

pub use error::{Error, Result};
pub use frame::Frame;

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Default capture width (dual-fisheye side-by-side)
    pub const DEFAULT_CAPTURE_WIDTH: u32 = 1920;

    /// Default capture height
    pub const DEFAULT_CAPTURE_HEIGHT: u32 = 960;

    /// Default equirectangular output width
    pub const DEFAULT_OUTPUT_WIDTH: u32 = 3840;

    /// Default equirectangular output height
    pub const DEFAULT_OUTPUT_HEIGHT: u32 = 1920;

    /// Default capture and output frame rate
    pub const DEFAULT_FPS: u32 = 30;

    /// Default encoder bitrate
    pub const DEFAULT_BITRATE: &str = "4000k";

    /// Default RTMP ingest URL
    pub const DEFAULT_STREAM_URL: &str = "rtmp://127.0.0.1:1935/live/livestream";

    /// Stream queue capacity (frames); small to keep latency low
    pub const STREAM_QUEUE_CAPACITY: usize = 10;

    /// Seam overlap as a percentage of the output width
    pub const DEFAULT_OVERLAP_PERCENT: u32 = 10;

    /// Channels per pixel on the encoder pipe (BGR24)
    pub const ENCODER_CHANNELS: usize = 3;

    /// Backoff after a failed device read
    pub const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

    /// Consumer idle wait when the stream queue is empty
    pub const STREAM_IDLE_WAIT: Duration = Duration::from_millis(1);

    /// Compositor idle wait when no new raw frame is available
    pub const COMPOSITOR_IDLE_WAIT: Duration = Duration::from_millis(2);

    /// Bounded join for the capture and compositor threads
    pub const THREAD_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

    /// Bounded join for the stream consumer thread
    pub const STREAM_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

    /// Grace period for the encoder to exit before it is killed
    pub const ENCODER_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default calibration document path
    pub const CALIBRATION_FILE: &str = "fisheye_params.json";

    /// Default configuration file path
    pub const CONFIG_FILE: &str = "config.toml";
}
