//! Panorama composition: remap, seam blending, post-filters

pub mod compositor;
pub mod filters;
pub mod seam;

pub use compositor::FrameCompositor;
pub use filters::{BrightnessEqualizer, ColorBalance, FilterChain, FrameFilter};
pub use seam::SeamBlender;
