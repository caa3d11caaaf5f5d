//! Seam removal for remapped panoramas
//!
//! Two seams exist in a dual-fisheye equirectangular frame: the wrap at
//! column 0 / W−1 (θ = ±π) and the lens switch at column W/2. Each seam gets
//! a window of `overlap` columns, half on either side. Inside the window
//! every column is crossfaded with its reflection across the seam, so the
//! left-hand image fades out while the right-hand one fades in:
//!
//! ```text
//!            seam
//!   k:  0 1 2 | 3 4 5        w_k = k / (2h − 1)
//!   A:  own   | mirror       out = A·(1 − w) + B·w
//!   B: mirror | own
//! ```
//!
//! Columns are indexed modulo W, so the wrap seam is one contiguous region.

use crate::frame::Frame;

/// Windowed linear crossfade over both panorama seams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeamBlender {
    overlap: u32,
}

impl SeamBlender {
    /// Blender with a window of `overlap` columns per seam
    pub fn new(overlap: u32) -> Self {
        Self { overlap }
    }

    /// Window as a percentage of the output width
    pub fn from_percent(output_width: u32, percent: u32) -> Self {
        Self::new((output_width as u64 * percent as u64 / 100) as u32)
    }

    pub fn overlap(&self) -> u32 {
        self.overlap
    }

    /// Columns on each side of a seam, capped so the two windows never meet
    pub fn half_window(&self, width: u32) -> u32 {
        (self.overlap / 2).min(width / 4)
    }

    /// Blend both seams. Dimensions are unchanged and columns outside the
    /// two windows are copied verbatim.
    pub fn blend(&self, panorama: &Frame) -> Frame {
        let mut out = panorama.clone();
        let half = self.half_window(panorama.width);
        if half == 0 || panorama.height == 0 {
            return out;
        }

        Self::blend_window(panorama, &mut out, 0, half);
        Self::blend_window(panorama, &mut out, panorama.width / 2, half);
        out
    }

    fn blend_window(src: &Frame, out: &mut Frame, seam: u32, half: u32) {
        let width = src.width as i64;
        let span = 2 * half as i64;
        let channels = src.channels as usize;
        let stride = src.stride();

        let column = |offset: i64| -> usize { (seam as i64 + offset).rem_euclid(width) as usize };

        for k in 0..span {
            let own = column(k - half as i64);
            let mirror = column(half as i64 - 1 - k);
            let (a_col, b_col) = if k < half as i64 {
                (own, mirror)
            } else {
                (mirror, own)
            };
            let w = k as f32 / (span - 1) as f32;

            for y in 0..src.height as usize {
                let row = y * stride;
                let a = row + a_col * channels;
                let b = row + b_col * channels;
                let dst = row + own * channels;
                for c in 0..channels {
                    let blended = src.data[a + c] as f32 * (1.0 - w) + src.data[b + c] as f32 * w;
                    out.data[dst + c] = blended.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}
