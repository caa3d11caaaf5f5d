//! Offline calibration helpers
//!
//! Not used by the live path. Both return `None` instead of failing when
//! the input cannot produce a result.

use nalgebra::{DMatrix, Matrix3, Vector3};
use std::f64::consts::SQRT_2;

use crate::frame::Frame;

/// Join two images side by side, crossfading `overlap` columns where the
/// right edge of `left` meets the left edge of `right`.
///
/// The output is `left.width + right.width - overlap` wide. Returns `None`
/// if heights or channel counts differ, or `overlap` exceeds either width.
pub fn optimize_seams(left: &Frame, right: &Frame, overlap: u32) -> Option<Frame> {
    if left.height != right.height
        || left.channels != right.channels
        || overlap > left.width
        || overlap > right.width
        || !left.is_consistent()
        || !right.is_consistent()
    {
        return None;
    }

    let width = left.width + right.width - overlap;
    let keep_left = left.width - overlap;
    let mut out = Frame::filled(width, left.height, left.channels, 0);

    for y in 0..left.height {
        for x in 0..keep_left {
            out.pixel_mut(x, y).copy_from_slice(left.pixel(x, y));
        }
        for i in 0..overlap {
            let weight = (overlap - i) as f32 / overlap as f32;
            let a = left.pixel(keep_left + i, y);
            let b = right.pixel(i, y);
            for (c, value) in out.pixel_mut(keep_left + i, y).iter_mut().enumerate() {
                *value = (a[c] as f32 * weight + b[c] as f32 * (1.0 - weight)).round() as u8;
            }
        }
        for x in overlap..right.width {
            out.pixel_mut(left.width + x - overlap, y)
                .copy_from_slice(right.pixel(x, y));
        }
    }

    Some(out)
}

/// Planar projective transform, `x' ~ H x`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    m: Matrix3<f64>,
}

impl Homography {
    pub fn identity() -> Self {
        Self::from_matrix(Matrix3::identity())
    }

    pub fn from_matrix(m: Matrix3<f64>) -> Self {
        Self { m }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        self.m
    }

    /// Map a point. `None` if it lands on the line at infinity.
    pub fn apply(&self, (x, y): (f64, f64)) -> Option<(f64, f64)> {
        let p = self.m * Vector3::new(x, y, 1.0);
        if p.z.abs() < 1e-12 {
            return None;
        }
        Some((p.x / p.z, p.y / p.z))
    }
}

/// Hartley normalization: centroid to the origin, mean distance √2.
/// Returns the normalized points and the transform that produced them.
fn normalize_points(points: &[(f64, f64)]) -> Option<(Vec<(f64, f64)>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist <= f64::EPSILON {
        return None;
    }

    let s = SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = points.iter().map(|p| (s * (p.0 - cx), s * (p.1 - cy))).collect();
    Some((normalized, t))
}

/// Homography mapping `src` onto `dst` by normalized DLT (SVD of the
/// design matrix).
///
/// Needs at least four correspondences in general position; returns
/// `None` for fewer points, mismatched lengths or a degenerate layout.
pub fn estimate_homography(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Homography> {
    let n = src.len();
    if n < 4 || dst.len() != n {
        return None;
    }

    let (src_n, t_src) = normalize_points(src)?;
    let (dst_n, t_dst) = normalize_points(dst)?;

    // padded to at least 9 rows so the SVD exposes the full null space
    let mut a = DMatrix::<f64>::zeros((2 * n).max(9), 9);
    for (i, (&(x, y), &(u, v))) in src_n.iter().zip(&dst_n).enumerate() {
        let (r0, r1) = (2 * i, 2 * i + 1);
        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    // rank below 8 means the correspondences do not pin down H
    let largest = svd.singular_values[0];
    if largest <= f64::EPSILON || svd.singular_values[7] < 1e-9 * largest {
        return None;
    }
    let v_t = svd.v_t?;
    let h = v_t.row(8);

    let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    let mut m = t_dst.try_inverse()? * normalized * t_src;

    let scale = m[(2, 2)];
    if scale.abs() <= f64::EPSILON {
        return None;
    }
    m /= scale;
    Some(Homography::from_matrix(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f64, f64), b: (f64, f64), tol: f64) -> bool {
        (a.0 - b.0).abs() < tol && (a.1 - b.1).abs() < tol
    }

    #[test]
    fn test_seam_join_crossfades_overlap() {
        let left = Frame::filled(10, 2, 3, 200);
        let right = Frame::filled(10, 2, 3, 100);
        let joined = optimize_seams(&left, &right, 4).unwrap();

        assert_eq!((joined.width, joined.height), (16, 2));
        assert_eq!(joined.pixel(0, 0), &[200, 200, 200]);
        assert_eq!(joined.pixel(6, 1), &[200, 200, 200]);
        assert_eq!(joined.pixel(8, 0), &[150, 150, 150]);
        assert_eq!(joined.pixel(15, 1), &[100, 100, 100]);
    }

    #[test]
    fn test_seam_join_rejects_bad_input() {
        let left = Frame::filled(10, 2, 3, 0);
        assert!(optimize_seams(&left, &Frame::filled(10, 3, 3, 0), 2).is_none());
        assert!(optimize_seams(&left, &Frame::filled(10, 2, 1, 0), 2).is_none());
        assert!(optimize_seams(&left, &Frame::filled(4, 2, 3, 0), 5).is_none());
    }

    #[test]
    fn test_zero_overlap_concatenates() {
        let left = Frame::filled(3, 1, 3, 1);
        let right = Frame::filled(2, 1, 3, 2);
        let joined = optimize_seams(&left, &right, 0).unwrap();
        assert_eq!(joined.width, 5);
        assert_eq!(joined.pixel(2, 0), &[1, 1, 1]);
        assert_eq!(joined.pixel(3, 0), &[2, 2, 2]);
    }

    #[test]
    fn test_recovers_projective_transform() {
        let truth = Homography::from_matrix(Matrix3::new(
            1.2, 0.1, 5.0,
            -0.05, 0.9, 3.0,
            0.001, 0.0005, 1.0,
        ));
        let src = [
            (0.0, 0.0),
            (100.0, 0.0),
            (100.0, 80.0),
            (0.0, 80.0),
            (50.0, 40.0),
            (20.0, 70.0),
        ];
        let dst: Vec<_> = src.iter().map(|&p| truth.apply(p).unwrap()).collect();

        let estimated = estimate_homography(&src, &dst).unwrap();
        for (&s, &d) in src.iter().zip(&dst) {
            assert!(close(estimated.apply(s).unwrap(), d, 1e-6));
        }
        let probe = (70.0, 10.0);
        assert!(close(estimated.apply(probe).unwrap(), truth.apply(probe).unwrap(), 1e-6));
    }

    #[test]
    fn test_four_points_exact_fit() {
        let src = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        let dst = [(10.0, 10.0), (30.0, 12.0), (28.0, 35.0), (9.0, 30.0)];

        let estimated = estimate_homography(&src, &dst).unwrap();
        for (&s, &d) in src.iter().zip(&dst) {
            assert!(close(estimated.apply(s).unwrap(), d, 1e-7));
        }
    }

    #[test]
    fn test_insufficient_or_degenerate_input_yields_none() {
        let square = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        assert!(estimate_homography(&square[..3], &square[..3]).is_none());
        assert!(estimate_homography(&square, &square[..3]).is_none());

        let line = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)];
        assert!(estimate_homography(&line, &square).is_none());

        let point = [(5.0, 5.0); 4];
        assert!(estimate_homography(&point, &square).is_none());
    }

    #[test]
    fn test_identity_maps_points_unchanged() {
        assert_eq!(Homography::identity().apply((3.5, -2.0)), Some((3.5, -2.0)));
    }
}
