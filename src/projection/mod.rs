//! Dual-fisheye to equirectangular projection

pub mod calibration;
pub mod mapper;
pub mod remap;

pub use calibration::{apply_tuning_key, CalibrationParams, CalibrationSet, Lens, TuningAction};
pub use mapper::{ProjectionMapper, ProjectionTable, Resolution, TableKey, UNMAPPED};
pub use remap::remap;
