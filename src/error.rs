//! Error types for the panorama streaming pipeline

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Upstream frame acquisition errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Frame read failed: {0}")]
    ReadFailed(String),

    #[error("End of stream")]
    EndOfStream,

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(String),
}

/// Stream sink and encoder process errors
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Encoder failed to start: {0}")]
    EncoderStart(String),

    #[error("Encoder input pipe closed: {0}")]
    PipeClosed(String),

    #[error("Unsupported frame format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to spawn stream thread: {0}")]
    Spawn(String),
}

/// Calibration document errors
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Failed to read calibration document: {0}")]
    Read(String),

    #[error("Failed to write calibration document: {0}")]
    Write(String),

    #[error("Invalid lens parameters: {0}")]
    InvalidParams(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
