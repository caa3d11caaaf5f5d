//! Capture subsystem module

pub mod slot;
pub mod source;
pub mod worker;

pub use slot::LatestFrameSlot;
pub use source::{load_image, FrameSource, RawPipeSource, StillImageSource, SyntheticSource};
pub use worker::CaptureSource;
