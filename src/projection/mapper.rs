//! Equirectangular remap table construction
//!
//! Every output pixel (x, y) is turned into spherical angles, then into a
//! unit direction, and finally into a source pixel on one of the two
//! fisheye circles:
//!
//! ```text
//! θ = 2π·x/W − π            φ = π·y/H − π/2
//! v = (cosφ·cosθ, cosφ·sinθ, sinφ)
//! lens  = right if θ ∈ [−π/2, π/2] else left
//! az    = atan2(vy, vx) + offset
//! ρ     = acos(vz / |v|) / π
//! src_x = cx·Sw + radius·Sw·ρ·cos(az)
//! src_y = cy·Sh + radius·Sh·ρ·sin(az)
//! ```
//!
//! Pixels at the pole singularity or outside the source frame hold
//! [`UNMAPPED`].

use std::f64::consts::{FRAC_PI_2, PI};

use crate::projection::calibration::{CalibrationSet, Lens};

/// Sentinel for output pixels with no source sample
pub const UNMAPPED: f32 = -1.0;

/// Image dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Everything a table depends on. A table is rebuilt iff this changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableKey {
    pub calibration: CalibrationSet,
    pub output: Resolution,
    pub source: Resolution,
}

/// Immutable per-output-pixel source coordinate lookup
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionTable {
    key: TableKey,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl ProjectionTable {
    pub fn key(&self) -> &TableKey {
        &self.key
    }

    pub fn output(&self) -> Resolution {
        self.key.output
    }

    pub fn source(&self) -> Resolution {
        self.key.source
    }

    pub fn map_x(&self) -> &[f32] {
        &self.map_x
    }

    pub fn map_y(&self) -> &[f32] {
        &self.map_y
    }

    /// Source coordinate for output pixel (x, y), `None` when unmapped
    pub fn lookup(&self, x: u32, y: u32) -> Option<(f32, f32)> {
        let idx = y as usize * self.key.output.width as usize + x as usize;
        let sx = self.map_x[idx];
        if sx == UNMAPPED {
            None
        } else {
            Some((sx, self.map_y[idx]))
        }
    }

    /// Number of output pixels with a source sample
    pub fn mapped_count(&self) -> usize {
        self.map_x.iter().filter(|&&v| v != UNMAPPED).count()
    }

    /// FNV-1a over the raw bits of both maps
    pub fn checksum(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        self.map_x
            .iter()
            .chain(self.map_y.iter())
            .flat_map(|v| v.to_bits().to_le_bytes())
            .fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
    }
}

/// Builds [`ProjectionTable`]s from calibration and resolutions
pub struct ProjectionMapper;

impl ProjectionMapper {
    /// Spherical angles (θ, φ) of output pixel (x, y)
    pub fn angles(x: u32, y: u32, output: Resolution) -> (f64, f64) {
        let theta = 2.0 * PI * x as f64 / output.width as f64 - PI;
        let phi = PI * y as f64 / output.height as f64 - FRAC_PI_2;
        (theta, phi)
    }

    /// Lens that sees horizontal angle θ; the boundary belongs to the right lens
    pub fn select_lens(theta: f64) -> Lens {
        if (-FRAC_PI_2..=FRAC_PI_2).contains(&theta) {
            Lens::Right
        } else {
            Lens::Left
        }
    }

    /// Source pixel for direction (θ, φ), `None` at the pole or out of frame
    pub fn project(
        calibration: &CalibrationSet,
        theta: f64,
        phi: f64,
        source: Resolution,
    ) -> Option<(f64, f64)> {
        let vx = phi.cos() * theta.cos();
        let vy = phi.cos() * theta.sin();
        let vz = phi.sin();

        let params = calibration.lens(Self::select_lens(theta));

        let r = (vx * vx + vz * vz).sqrt();
        if r == 0.0 {
            return None;
        }

        let norm = (vx * vx + vy * vy + vz * vz).sqrt();
        let azimuth = vy.atan2(vx) + params.offset_angle;
        let radial = (vz / norm).clamp(-1.0, 1.0).acos() / PI;

        let sw = source.width as f64;
        let sh = source.height as f64;
        let src_x = params.cx * sw + params.radius * sw * radial * azimuth.cos();
        let src_y = params.cy * sh + params.radius * sh * radial * azimuth.sin();

        if (0.0..sw).contains(&src_x) && (0.0..sh).contains(&src_y) {
            Some((src_x, src_y))
        } else {
            None
        }
    }

    /// Build the full table. O(W·H); callers cache the result by [`TableKey`].
    pub fn build(
        calibration: &CalibrationSet,
        output: Resolution,
        source: Resolution,
    ) -> ProjectionTable {
        let mut map_x = vec![UNMAPPED; output.pixel_count()];
        let mut map_y = vec![UNMAPPED; output.pixel_count()];

        for y in 0..output.height {
            let row = y as usize * output.width as usize;
            for x in 0..output.width {
                let (theta, phi) = Self::angles(x, y, output);
                if let Some((sx, sy)) = Self::project(calibration, theta, phi, source) {
                    map_x[row + x as usize] = sx as f32;
                    map_y[row + x as usize] = sy as f32;
                }
            }
        }

        let table = ProjectionTable {
            key: TableKey {
                calibration: *calibration,
                output,
                source,
            },
            map_x,
            map_y,
        };

        tracing::debug!(
            "Built projection table {}x{} from {}x{}: {} of {} pixels mapped",
            output.width,
            output.height,
            source.width,
            source.height,
            table.mapped_count(),
            output.pixel_count()
        );

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::calibration::CalibrationParams;
    use proptest::prelude::*;

    fn scenario_calibration() -> CalibrationSet {
        CalibrationSet::new(
            CalibrationParams::new(0.25, 0.5, 0.25, 0.0),
            CalibrationParams::new(0.75, 0.5, 0.25, 0.0),
        )
    }

    #[test]
    fn test_front_center_maps_to_right_lens_equator() {
        // θ = 0, φ = 0: v = (1, 0, 0), az = 0, ρ = 0.5
        // src = (0.75·1920 + 0.25·1920·0.5, 0.5·960) = (1680, 480)
        let output = Resolution::new(400, 200);
        let source = Resolution::new(1920, 960);
        let table = ProjectionMapper::build(&scenario_calibration(), output, source);

        let (sx, sy) = table.lookup(200, 100).expect("front center is mapped");
        assert!((sx - 1680.0).abs() < 1e-3, "sx = {}", sx);
        assert!((sy - 480.0).abs() < 1e-3, "sy = {}", sy);
    }

    #[test]
    fn test_lens_selection_boundary_goes_right() {
        assert_eq!(ProjectionMapper::select_lens(FRAC_PI_2), Lens::Right);
        assert_eq!(ProjectionMapper::select_lens(-FRAC_PI_2), Lens::Right);
        assert_eq!(ProjectionMapper::select_lens(0.0), Lens::Right);
        assert_eq!(ProjectionMapper::select_lens(PI), Lens::Left);
        assert_eq!(ProjectionMapper::select_lens(-PI), Lens::Left);
    }

    #[test]
    fn test_out_of_frame_is_unmapped() {
        // Circles centered on the frame edges: the right lens always lands right of Sw
        let edge = CalibrationSet::new(
            CalibrationParams::new(0.0, 0.5, 0.48, 0.0),
            CalibrationParams::new(1.0, 0.5, 0.48, 0.0),
        );
        let source = Resolution::new(1920, 960);
        assert!(ProjectionMapper::project(&edge, 0.3, 0.1, source).is_none());
    }

    #[test]
    fn test_edge_centered_right_lens_maps_nothing_in_front() {
        let edge = CalibrationSet::new(
            CalibrationParams::new(0.0, 0.5, 0.48, 0.0),
            CalibrationParams::new(1.0, 0.5, 0.48, 0.0),
        );
        let output = Resolution::new(64, 32);
        let table = ProjectionMapper::build(&edge, output, Resolution::new(1920, 960));

        for y in 0..output.height {
            for x in (output.width / 4 + 1)..(3 * output.width / 4) {
                assert!(table.lookup(x, y).is_none(), "({}, {}) mapped", x, y);
            }
        }
    }

    #[test]
    fn test_offset_angle_rotates_source() {
        let source = Resolution::new(1920, 960);
        let base = scenario_calibration();
        let rotated = base.with_lens(
            Lens::Right,
            CalibrationParams::new(0.75, 0.5, 0.25, FRAC_PI_2),
        );

        let (_, y0) = ProjectionMapper::project(&base, 0.0, 0.0, source).unwrap();
        let (x1, y1) = ProjectionMapper::project(&rotated, 0.0, 0.0, source).unwrap();
        assert!((y0 - 480.0).abs() < 1e-6);
        assert!((x1 - 1440.0).abs() < 1e-6);
        assert!((y1 - 600.0).abs() < 1e-6);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_build_is_deterministic(
            cx in 0.1f64..0.9,
            cy in 0.2f64..0.8,
            radius in 0.05f64..0.5,
            offset in -1.0f64..1.0,
        ) {
            let set = CalibrationSet::new(
                CalibrationParams::new(1.0 - cx, cy, radius, -offset),
                CalibrationParams::new(cx, cy, radius, offset),
            );
            let output = Resolution::new(96, 48);
            let source = Resolution::new(320, 160);

            let a = ProjectionMapper::build(&set, output, source);
            let b = ProjectionMapper::build(&set, output, source);
            prop_assert_eq!(a.checksum(), b.checksum());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_theta_increases_along_rows(
            width in 2u32..4096,
            height in 1u32..2048,
            y in 0u32..2048,
        ) {
            let output = Resolution::new(width, height);
            let y = y % height;
            let mut previous = f64::NEG_INFINITY;
            for x in 0..width {
                let (theta, _) = ProjectionMapper::angles(x, y, output);
                prop_assert!(theta > previous);
                prop_assert!((-PI..PI).contains(&theta));
                previous = theta;
            }
        }
    }
}
