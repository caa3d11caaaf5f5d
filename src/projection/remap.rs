//! Apply a projection table to a source frame

use crate::frame::Frame;
use crate::projection::mapper::{ProjectionTable, UNMAPPED};

/// Remap `source` through `table` with bilinear interpolation.
///
/// Unmapped output pixels, and any lookups that fall outside `source`,
/// are written as `background` in every channel.
pub fn remap(source: &Frame, table: &ProjectionTable, background: u8) -> Frame {
    let output = table.output();
    let channels = source.channels as usize;
    let mut out = Frame::filled(output.width, output.height, source.channels, background);
    out.sequence = source.sequence;
    out.timestamp_us = source.timestamp_us;

    let sw = source.width as usize;
    let sh = source.height as usize;
    if sw == 0 || sh == 0 {
        return out;
    }
    let stride = source.stride();
    let max_x = (sw - 1) as f32;
    let max_y = (sh - 1) as f32;

    let map_x = table.map_x();
    let map_y = table.map_y();

    for (idx, dst) in out.data.chunks_exact_mut(channels).enumerate() {
        let fx = map_x[idx];
        if fx == UNMAPPED {
            continue;
        }
        let fy = map_y[idx];
        if !(0.0..sw as f32).contains(&fx) || !(0.0..sh as f32).contains(&fy) {
            continue;
        }

        let x0 = fx.floor().min(max_x);
        let y0 = fy.floor().min(max_y);
        let dx = fx - x0;
        let dy = fy - y0;
        let x0 = x0 as usize;
        let y0 = y0 as usize;
        let x1 = (x0 + 1).min(sw - 1);
        let y1 = (y0 + 1).min(sh - 1);

        let p00 = y0 * stride + x0 * channels;
        let p10 = y0 * stride + x1 * channels;
        let p01 = y1 * stride + x0 * channels;
        let p11 = y1 * stride + x1 * channels;

        for (c, value) in dst.iter_mut().enumerate() {
            let top = source.data[p00 + c] as f32 * (1.0 - dx) + source.data[p10 + c] as f32 * dx;
            let bottom =
                source.data[p01 + c] as f32 * (1.0 - dx) + source.data[p11 + c] as f32 * dx;
            *value = (top * (1.0 - dy) + bottom * dy).round().clamp(0.0, 255.0) as u8;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::calibration::{CalibrationParams, CalibrationSet};
    use crate::projection::mapper::{ProjectionMapper, Resolution};

    #[test]
    fn test_marked_point_lands_at_front_center() {
        // Synthetic 1920x960 dual-fisheye frame with a bright blob where the
        // forward direction hits the right lens: (1680, 480)
        let mut source = Frame::filled(1920, 960, 3, 0);
        for y in 476..=484 {
            for x in 1676..=1684 {
                source.pixel_mut(x, y).copy_from_slice(&[255, 255, 255]);
            }
        }

        let calibration = CalibrationSet::new(
            CalibrationParams::new(0.25, 0.5, 0.25, 0.0),
            CalibrationParams::new(0.75, 0.5, 0.25, 0.0),
        );
        let output = Resolution::new(960, 480);
        let table = ProjectionMapper::build(&calibration, output, Resolution::new(1920, 960));
        let pano = remap(&source, &table, 0);

        let mut sum_x = 0u64;
        let mut sum_y = 0u64;
        let mut count = 0u64;
        for y in 0..output.height {
            for x in 0..output.width {
                if pano.pixel(x, y)[0] > 128 {
                    sum_x += x as u64;
                    sum_y += y as u64;
                    count += 1;
                }
            }
        }

        assert!(count > 0, "marker not found in panorama");
        let cx = sum_x as f64 / count as f64;
        let cy = sum_y as f64 / count as f64;
        assert!((cx - 480.0).abs() < 3.0, "marker x = {}", cx);
        assert!((cy - 240.0).abs() < 3.0, "marker y = {}", cy);
    }

    #[test]
    fn test_unmapped_pixels_use_background() {
        let edge = CalibrationSet::new(
            CalibrationParams::new(0.0, 0.5, 0.48, 0.0),
            CalibrationParams::new(1.0, 0.5, 0.48, 0.0),
        );
        let source = Frame::filled(64, 32, 3, 90);
        let table =
            ProjectionMapper::build(&edge, Resolution::new(32, 16), Resolution::new(64, 32));
        let pano = remap(&source, &table, 7);

        // Front of the right lens is never mapped with an edge-centered circle
        assert_eq!(pano.pixel(16, 8), &[7, 7, 7]);
        assert_eq!(pano.data.len(), 32 * 16 * 3);
    }

    #[test]
    fn test_uniform_source_stays_uniform_where_mapped() {
        let source = Frame::filled(320, 160, 3, 123).with_sequence(9);
        let table = ProjectionMapper::build(
            &CalibrationSet::default(),
            Resolution::new(64, 32),
            Resolution::new(320, 160),
        );
        let pano = remap(&source, &table, 0);

        assert_eq!(pano.sequence, 9);
        for y in 0..32 {
            for x in 0..64 {
                if table.lookup(x, y).is_some() {
                    assert_eq!(pano.pixel(x, y), &[123, 123, 123]);
                }
            }
        }
    }
}
