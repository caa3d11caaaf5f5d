//! Dual-fisheye lens calibration
//!
//! A [`CalibrationSet`] is a value: recalibration builds a new set and
//! publishes it, nothing edits the fields of a set another thread holds.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::CalibrationError;

/// Per-lens fisheye parameters, normalized to the source frame size
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CalibrationParams {
    /// Circle center x in [0, 1] of source width
    pub cx: f64,
    /// Circle center y in [0, 1] of source height
    pub cy: f64,
    /// Circle radius, normalized to the source dimensions
    pub radius: f64,
    /// Rotation about the optical axis, radians
    pub offset_angle: f64,
}

impl CalibrationParams {
    pub fn new(cx: f64, cy: f64, radius: f64, offset_angle: f64) -> Self {
        Self {
            cx,
            cy,
            radius,
            offset_angle,
        }
    }

    fn validate(&self, lens: Lens) -> Result<(), CalibrationError> {
        let values = [self.cx, self.cy, self.radius, self.offset_angle];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CalibrationError::InvalidParams(format!(
                "{:?} lens has non-finite parameters",
                lens
            )));
        }
        if self.radius <= 0.0 {
            return Err(CalibrationError::InvalidParams(format!(
                "{:?} lens radius must be positive, got {}",
                lens, self.radius
            )));
        }
        Ok(())
    }
}

/// Which of the two back-to-back lenses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lens {
    Left,
    Right,
}

/// Tunable lens field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LensField {
    Cx,
    Cy,
    Radius,
}

/// Calibration for both lenses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CalibrationSet {
    pub left: CalibrationParams,
    pub right: CalibrationParams,
}

impl Default for CalibrationSet {
    /// Side-by-side circles on a 2:1 dual-fisheye frame
    fn default() -> Self {
        Self {
            left: CalibrationParams::new(0.25, 0.5, 0.25, 0.0),
            right: CalibrationParams::new(0.75, 0.5, 0.25, 0.0),
        }
    }
}

impl CalibrationSet {
    pub fn new(left: CalibrationParams, right: CalibrationParams) -> Self {
        Self { left, right }
    }

    pub fn lens(&self, lens: Lens) -> &CalibrationParams {
        match lens {
            Lens::Left => &self.left,
            Lens::Right => &self.right,
        }
    }

    /// Copy of this set with one lens replaced
    pub fn with_lens(&self, lens: Lens, params: CalibrationParams) -> Self {
        let mut next = *self;
        match lens {
            Lens::Left => next.left = params,
            Lens::Right => next.right = params,
        }
        next
    }

    /// Copy of this set with one field moved by `delta`
    pub fn adjusted(&self, lens: Lens, field: LensField, delta: f64) -> Self {
        let mut params = *self.lens(lens);
        match field {
            LensField::Cx => params.cx += delta,
            LensField::Cy => params.cy += delta,
            LensField::Radius => params.radius += delta,
        }
        self.with_lens(lens, params)
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.left.validate(Lens::Left)?;
        self.right.validate(Lens::Right)
    }

    /// Load a calibration document (JSON)
    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CalibrationError::Read(format!("{}: {}", path.display(), e)))?;
        let set: CalibrationSet = serde_json::from_str(&text)
            .map_err(|e| CalibrationError::Read(format!("{}: {}", path.display(), e)))?;
        set.validate()?;
        Ok(set)
    }

    /// Load if the document exists and is valid, otherwise built-in defaults
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(set) => {
                tracing::info!("Loaded fisheye calibration from {}", path.display());
                set
            }
            Err(e) => {
                tracing::warn!("{}, using default calibration", e);
                Self::default()
            }
        }
    }

    /// Persist as a calibration document (JSON)
    pub fn save(&self, path: &Path) -> Result<(), CalibrationError> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| CalibrationError::Write(e.to_string()))?;
        std::fs::write(path, text)
            .map_err(|e| CalibrationError::Write(format!("{}: {}", path.display(), e)))
    }
}

/// Result of a tuning keystroke
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TuningAction {
    /// Publish this adjusted calibration
    Adjust(CalibrationSet),
    /// Leave tuning and persist
    Finish,
    /// Key has no binding
    Ignore,
}

/// Map a tuning key onto the current calibration.
///
/// `a/d w/s z/x` move the left lens cx, cy and radius down/up,
/// `j/l i/k n/m` do the same for the right lens, `q` finishes.
pub fn apply_tuning_key(current: &CalibrationSet, key: char, step: f64) -> TuningAction {
    let (lens, field, sign) = match key {
        'a' => (Lens::Left, LensField::Cx, -1.0),
        'd' => (Lens::Left, LensField::Cx, 1.0),
        'w' => (Lens::Left, LensField::Cy, -1.0),
        's' => (Lens::Left, LensField::Cy, 1.0),
        'z' => (Lens::Left, LensField::Radius, -1.0),
        'x' => (Lens::Left, LensField::Radius, 1.0),
        'j' => (Lens::Right, LensField::Cx, -1.0),
        'l' => (Lens::Right, LensField::Cx, 1.0),
        'i' => (Lens::Right, LensField::Cy, -1.0),
        'k' => (Lens::Right, LensField::Cy, 1.0),
        'n' => (Lens::Right, LensField::Radius, -1.0),
        'm' => (Lens::Right, LensField::Radius, 1.0),
        'q' => return TuningAction::Finish,
        _ => return TuningAction::Ignore,
    };
    TuningAction::Adjust(current.adjusted(lens, field, sign * step))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_returns_new_set() {
        let original = CalibrationSet::default();
        let adjusted = original.adjusted(Lens::Right, LensField::Radius, 0.01);

        assert_eq!(original.right.radius, 0.25);
        assert!((adjusted.right.radius - 0.26).abs() < 1e-12);
        assert_eq!(adjusted.left, original.left);
    }

    #[test]
    fn test_tuning_keys() {
        let set = CalibrationSet::default();

        match apply_tuning_key(&set, 'a', 0.01) {
            TuningAction::Adjust(next) => assert!((next.left.cx - 0.24).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
        match apply_tuning_key(&set, 'k', 0.01) {
            TuningAction::Adjust(next) => assert!((next.right.cy - 0.51).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(apply_tuning_key(&set, 'q', 0.01), TuningAction::Finish);
        assert_eq!(apply_tuning_key(&set, '?', 0.01), TuningAction::Ignore);
    }

    #[test]
    fn test_document_roundtrip_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fisheye_params.json");

        let set = CalibrationSet::default().adjusted(Lens::Left, LensField::Cx, 0.03);
        set.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value["left"]["offset_angle"].is_number());
        assert!(value["right"]["radius"].is_number());

        assert_eq!(CalibrationSet::load(&path).unwrap(), set);
    }

    #[test]
    fn test_missing_document_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let set = CalibrationSet::load_or_default(&dir.path().join("absent.json"));
        assert_eq!(set, CalibrationSet::default());
    }

    #[test]
    fn test_rejects_non_positive_radius() {
        let set = CalibrationSet::default().with_lens(
            Lens::Left,
            CalibrationParams::new(0.25, 0.5, 0.0, 0.0),
        );
        assert!(set.validate().is_err());
    }
}
