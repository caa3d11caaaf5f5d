//! Frame compositor
//!
//! Turns a raw dual-fisheye frame into a finished panorama:
//! projection table lookup, bilinear remap, seam blend, filter chain.
//!
//! The active table is an `Arc` snapshot. A frame in flight keeps the
//! table it started with; recalibration builds the replacement on a
//! background thread and swaps it in only if it still matches the current
//! calibration and source resolution.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::compose::filters::FilterChain;
use crate::compose::seam::SeamBlender;
use crate::config::PipelineConfig;
use crate::constants::THREAD_JOIN_TIMEOUT;
use crate::error::{CalibrationError, Result};
use crate::frame::Frame;
use crate::projection::{remap, CalibrationSet, ProjectionMapper, ProjectionTable, Resolution};
use crate::shutdown::join_with_timeout;

/// Calibration and the table built from it, published independently.
/// Lock order when nesting: `table` before `calibration`.
struct TableState {
    calibration: RwLock<CalibrationSet>,
    table: RwLock<Option<Arc<ProjectionTable>>>,
}

impl TableState {
    /// Install `table` if nothing newer has superseded it
    fn install_if_current(&self, table: Arc<ProjectionTable>) -> bool {
        let mut slot = self.table.write();
        let current_source = slot.as_ref().map(|t| t.source());
        let calibration = *self.calibration.read();
        if table.key().calibration != calibration || current_source != Some(table.source()) {
            return false;
        }
        *slot = Some(table);
        true
    }
}

/// Remap → seam blend → filters, with a cached projection table
pub struct FrameCompositor {
    output: Resolution,
    blender: SeamBlender,
    filters: FilterChain,
    background: u8,
    state: Arc<TableState>,
    rebuilds: Mutex<Vec<JoinHandle<()>>>,
}

impl FrameCompositor {
    pub fn new(config: &PipelineConfig, calibration: CalibrationSet) -> Result<Self> {
        calibration.validate()?;
        let output = Resolution::new(config.output.width, config.output.height);
        let filters = FilterChain::from_config(&config.processing)?;
        let blender = SeamBlender::new(config.processing.overlap_width(output.width));

        tracing::info!(
            "Compositor: {}x{} output, seam window {} px, filters {:?}",
            output.width,
            output.height,
            blender.overlap(),
            filters.names()
        );

        Ok(Self {
            output,
            blender,
            filters,
            background: config.processing.background,
            state: Arc::new(TableState {
                calibration: RwLock::new(calibration),
                table: RwLock::new(None),
            }),
            rebuilds: Mutex::new(Vec::new()),
        })
    }

    pub fn output(&self) -> Resolution {
        self.output
    }

    /// Calibration new tables are built from
    pub fn calibration(&self) -> CalibrationSet {
        *self.state.calibration.read()
    }

    /// Snapshot of the table currently used for frames
    pub fn active_table(&self) -> Option<Arc<ProjectionTable>> {
        self.state.table.read().clone()
    }

    /// Table for a source resolution. Built synchronously on first use
    /// or when the source resolution changes, otherwise reused.
    pub fn table_for(&self, source: Resolution) -> Arc<ProjectionTable> {
        loop {
            if let Some(table) = self.state.table.read().as_ref() {
                if table.source() == source {
                    return table.clone();
                }
            }

            let calibration = *self.state.calibration.read();
            tracing::info!(
                "Building projection table for {}x{} source",
                source.width,
                source.height
            );
            let table = Arc::new(ProjectionMapper::build(&calibration, self.output, source));

            let mut slot = self.state.table.write();
            // recalibrated while building: go around with the new parameters
            if *self.state.calibration.read() == calibration {
                *slot = Some(table.clone());
                return table;
            }
        }
    }

    /// Publish a new calibration. The matching table is built in the
    /// background; frames keep using the previous table until it lands.
    pub fn recalibrate(
        &self,
        calibration: CalibrationSet,
    ) -> std::result::Result<(), CalibrationError> {
        calibration.validate()?;
        *self.state.calibration.write() = calibration;

        let Some(source) = self.active_table().map(|t| t.source()) else {
            // nothing built yet; the first frame builds with this calibration
            return Ok(());
        };

        let state = self.state.clone();
        let output = self.output;
        let rebuild = move || {
            let table = Arc::new(ProjectionMapper::build(&calibration, output, source));
            if state.install_if_current(table) {
                tracing::info!("Projection table swapped after recalibration");
            } else {
                tracing::debug!("Discarded superseded projection table");
            }
        };

        let mut rebuilds = self.rebuilds.lock();
        rebuilds.retain(|handle| !handle.is_finished());
        match thread::Builder::new()
            .name("projection-rebuild".to_string())
            .spawn(rebuild)
        {
            Ok(handle) => rebuilds.push(handle),
            Err(e) => {
                tracing::warn!("Rebuild thread unavailable ({}), rebuilding inline", e);
                let table = Arc::new(ProjectionMapper::build(&calibration, output, source));
                self.state.install_if_current(table);
            }
        }
        Ok(())
    }

    /// Wait for pending rebuilds. Returns false if any outlived `timeout`.
    pub fn wait_for_rebuild(&self, timeout: Duration) -> bool {
        let pending: Vec<_> = self.rebuilds.lock().drain(..).collect();
        pending
            .into_iter()
            .fold(true, |all_done, handle| join_with_timeout(handle, timeout) && all_done)
    }

    /// Stitch one raw frame into a finished panorama
    pub fn process(&self, raw: &Frame) -> Frame {
        let table = self.table_for(Resolution::new(raw.width, raw.height));
        let panorama = remap(raw, &table, self.background);
        let blended = self.blender.blend(&panorama);
        self.filters.apply(blended)
    }

    /// Join any rebuild threads still running
    pub fn shutdown(&self) {
        if !self.wait_for_rebuild(THREAD_JOIN_TIMEOUT) {
            tracing::warn!("Projection rebuild still running at shutdown");
        }
    }
}
