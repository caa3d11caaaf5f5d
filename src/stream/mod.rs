//! Stream emission: drop-oldest queue, paced consumer, encoder adapters

pub mod encoder;
pub mod queue;
pub mod sink;

pub use encoder::{
    EncoderProcess, EncoderSpec, Emission, EmissionLog, FfmpegEncoder, FrameWriter, NullEncoder,
    RecordingEncoder,
};
pub use queue::{FrameQueue, SharedFrameQueue};
pub use sink::{SinkState, SinkStats, StreamSink};
