//! Stateless full-frame filters and the ordered chain that runs them

use crate::config::ProcessingConfig;
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Full-size image in, full-size image out, no state between frames
pub trait FrameFilter: Send + Sync {
    /// Name used in `processing.filter_order`
    fn name(&self) -> &'static str;

    fn apply(&self, frame: &Frame) -> Frame;
}

/// Contrast-limited adaptive histogram equalization on luma.
///
/// Every channel is shifted by the luma change, which leaves the chroma
/// differences (B − Y, R − Y) intact up to clamping.
#[derive(Debug, Clone, Copy)]
pub struct BrightnessEqualizer {
    pub clip_limit: f32,
    pub tiles: u32,
}

impl Default for BrightnessEqualizer {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tiles: 8,
        }
    }
}

impl BrightnessEqualizer {
    fn luma(px: &[u8]) -> u8 {
        // BGR, BT.601 weights
        let y = 0.114 * px[0] as f32 + 0.587 * px[1] as f32 + 0.299 * px[2] as f32;
        y.round().clamp(0.0, 255.0) as u8
    }

    /// Equalization LUT for one tile's histogram
    fn tile_lut(&self, hist: &mut [u32; 256], pixels: u32) -> [u8; 256] {
        let limit = ((self.clip_limit * pixels as f32 / 256.0) as u32).max(1);

        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        let share = excess / 256;
        let mut residual = excess % 256;
        for bin in hist.iter_mut() {
            *bin += share;
        }
        if residual > 0 {
            // remainder goes to every step-th bin
            let step = (256 / residual).max(1) as usize;
            for bin in hist.iter_mut().step_by(step) {
                if residual == 0 {
                    break;
                }
                *bin += 1;
                residual -= 1;
            }
        }

        let mut lut = [0u8; 256];
        let mut cdf = 0u32;
        let scale = 255.0 / pixels.max(1) as f32;
        for (i, &count) in hist.iter().enumerate() {
            cdf += count;
            lut[i] = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
        }
        lut
    }

    /// Lower tile index and weight of the upper one for a pixel coordinate
    fn interpolation(pos: u32, extent: u32, tiles: u32) -> (usize, usize, f32) {
        let size = extent as f32 / tiles as f32;
        let f = (pos as f32 + 0.5) / size - 0.5;
        if f <= 0.0 {
            return (0, 0, 0.0);
        }
        let lower = f.floor() as usize;
        if lower + 1 >= tiles as usize {
            let last = tiles as usize - 1;
            return (last, last, 0.0);
        }
        (lower, lower + 1, f - lower as f32)
    }
}

impl FrameFilter for BrightnessEqualizer {
    fn name(&self) -> &'static str {
        "brightness_equalization"
    }

    fn apply(&self, frame: &Frame) -> Frame {
        if frame.channels < 3 || frame.width == 0 || frame.height == 0 {
            return frame.clone();
        }
        let channels = frame.channels as usize;
        let (w, h) = (frame.width, frame.height);
        let tiles_x = self.tiles.clamp(1, w);
        let tiles_y = self.tiles.clamp(1, h);

        let luma: Vec<u8> = frame.data.chunks_exact(channels).map(Self::luma).collect();

        let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
        for ty in 0..tiles_y {
            let (y0, y1) = (ty * h / tiles_y, (ty + 1) * h / tiles_y);
            for tx in 0..tiles_x {
                let (x0, x1) = (tx * w / tiles_x, (tx + 1) * w / tiles_x);
                let mut hist = [0u32; 256];
                for y in y0..y1 {
                    let row = (y * w) as usize;
                    for x in x0..x1 {
                        hist[luma[row + x as usize] as usize] += 1;
                    }
                }
                luts.push(self.tile_lut(&mut hist, (x1 - x0) * (y1 - y0)));
            }
        }

        let mut out = frame.clone();
        for y in 0..h {
            let (ty0, ty1, ay) = Self::interpolation(y, h, tiles_y);
            for x in 0..w {
                let (tx0, tx1, ax) = Self::interpolation(x, w, tiles_x);
                let idx = (y * w + x) as usize;
                let v = luma[idx] as usize;
                let at = |ty: usize, tx: usize| luts[ty * tiles_x as usize + tx][v] as f32;

                let top = at(ty0, tx0) * (1.0 - ax) + at(ty0, tx1) * ax;
                let bottom = at(ty1, tx0) * (1.0 - ax) + at(ty1, tx1) * ax;
                let delta = top * (1.0 - ay) + bottom * ay - v as f32;

                for value in &mut out.data[idx * channels..idx * channels + 3] {
                    *value = (*value as f32 + delta).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
        out
    }
}

/// Per-channel percentile stretch (automatic white balance)
#[derive(Debug, Clone, Copy)]
pub struct ColorBalance {
    pub low_cut: f64,
    pub high_cut: f64,
}

impl Default for ColorBalance {
    fn default() -> Self {
        Self {
            low_cut: 0.01,
            high_cut: 0.99,
        }
    }
}

impl ColorBalance {
    /// First bin whose normalized cumulative count reaches `cut`
    fn percentile_bin(cdf: &[u64; 256], total: u64, cut: f64) -> usize {
        cdf.iter()
            .position(|&c| c as f64 / total as f64 >= cut)
            .unwrap_or(255)
    }

    fn channel_lut(&self, hist: &[u64; 256]) -> [u8; 256] {
        let mut cdf = [0u64; 256];
        let mut running = 0u64;
        for (i, &count) in hist.iter().enumerate() {
            running += count;
            cdf[i] = running;
        }

        let mut lut = [0u8; 256];
        let low = Self::percentile_bin(&cdf, running, self.low_cut);
        let high = Self::percentile_bin(&cdf, running, self.high_cut);
        if running == 0 || high <= low {
            for (i, entry) in lut.iter_mut().enumerate() {
                *entry = i as u8;
            }
            return lut;
        }

        for (i, entry) in lut.iter_mut().enumerate() {
            *entry = if i < low {
                0
            } else if i > high {
                255
            } else {
                (255.0 * (i - low) as f64 / (high - low) as f64).round() as u8
            };
        }
        lut
    }
}

impl FrameFilter for ColorBalance {
    fn name(&self) -> &'static str {
        "color_balance"
    }

    fn apply(&self, frame: &Frame) -> Frame {
        let channels = frame.channels as usize;
        if channels == 0 {
            return frame.clone();
        }

        let mut hists = vec![[0u64; 256]; channels];
        for px in frame.data.chunks_exact(channels) {
            for (c, &v) in px.iter().enumerate() {
                hists[c][v as usize] += 1;
            }
        }
        let luts: Vec<[u8; 256]> = hists.iter().map(|h| self.channel_lut(h)).collect();

        let mut out = frame.clone();
        for px in out.data.chunks_exact_mut(channels) {
            for (c, v) in px.iter_mut().enumerate() {
                *v = luts[c][*v as usize];
            }
        }
        out
    }
}

/// Ordered filter chain
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn FrameFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `processing.filter_order`, skipping disabled filters
    pub fn from_config(config: &ProcessingConfig) -> Result<Self> {
        let mut chain = Self::new();
        for name in &config.filter_order {
            let filter: Box<dyn FrameFilter> = match name.as_str() {
                "brightness_equalization" => Box::new(BrightnessEqualizer::default()),
                "color_balance" => Box::new(ColorBalance::default()),
                other => return Err(Error::Config(format!("unknown filter '{}'", other))),
            };
            if config.is_enabled(name) {
                chain.push(filter);
            }
        }
        Ok(chain)
    }

    pub fn push(&mut self, filter: Box<dyn FrameFilter>) {
        self.filters.push(filter);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run every filter in order
    pub fn apply(&self, frame: Frame) -> Frame {
        self.filters.iter().fold(frame, |current, filter| filter.apply(&current))
    }
}
