//! Upstream frame sources
//!
//! Device acquisition itself lives outside this crate. A [`FrameSource`]
//! yields frames at the device-native resolution; the capture thread owns it.

use std::io::Read;
use std::path::Path;

use crate::error::CaptureError;
use crate::frame::Frame;
use crate::pacing::Pacer;

/// Blocking producer of raw dual-fisheye frames
pub trait FrameSource: Send {
    /// Read the next frame. May block for up to one device frame period.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Generated dual-fisheye test pattern
///
/// Two side-by-side circles with colored quadrants and a marker that
/// circles the right lens, so motion is visible downstream.
pub struct SyntheticSource {
    base: Frame,
    pacer: Pacer,
    tick: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            base: Self::pattern(width, height),
            pacer: Pacer::from_fps(fps),
            tick: 0,
        }
    }

    fn pattern(width: u32, height: u32) -> Frame {
        let mut frame = Frame::filled(width, height, 3, 16);
        let radius = (width / 4).min(height / 2) as f32;
        let centers = [
            (width as f32 * 0.25, height as f32 * 0.5),
            (width as f32 * 0.75, height as f32 * 0.5),
        ];
        // BGR quadrant colors per lens
        let palettes = [
            [[40, 40, 200], [40, 200, 40], [200, 40, 40], [40, 200, 200]],
            [[200, 200, 40], [200, 40, 200], [120, 120, 120], [220, 220, 220]],
        ];

        for y in 0..height {
            for x in 0..width {
                for (lens, &(cx, cy)) in centers.iter().enumerate() {
                    let dx = x as f32 + 0.5 - cx;
                    let dy = y as f32 + 0.5 - cy;
                    if dx * dx + dy * dy <= radius * radius {
                        let quadrant = match (dx >= 0.0, dy >= 0.0) {
                            (true, false) => 0,
                            (false, false) => 1,
                            (false, true) => 2,
                            (true, true) => 3,
                        };
                        frame.pixel_mut(x, y).copy_from_slice(&palettes[lens][quadrant]);
                    }
                }
            }
        }
        frame
    }

    fn draw_marker(frame: &mut Frame, tick: u64) {
        let (w, h) = (frame.width as f32, frame.height as f32);
        let angle = tick as f32 * 0.05;
        let orbit = (w / 8.0).min(h / 4.0);
        let mx = (w * 0.75 + orbit * angle.cos()) as i64;
        let my = (h * 0.5 + orbit * angle.sin()) as i64;

        for y in (my - 4)..=(my + 4) {
            for x in (mx - 4)..=(mx + 4) {
                if (0..frame.width as i64).contains(&x) && (0..frame.height as i64).contains(&y) {
                    frame.pixel_mut(x as u32, y as u32).copy_from_slice(&[255, 255, 255]);
                }
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        self.pacer.wait();
        let mut frame = self.base.clone();
        Self::draw_marker(&mut frame, self.tick);
        self.tick += 1;
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.base.width, self.base.height)
    }
}

/// Decode an image file into a BGR frame
pub fn load_image(path: &Path) -> Result<Frame, CaptureError> {
    let image = image::open(path)
        .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {}", path.display(), e)))?;
    Ok(Frame::from_rgb_image(&image.to_rgb8()))
}

/// One still image replayed at a fixed rate
pub struct StillImageSource {
    frame: Frame,
    label: String,
    pacer: Pacer,
}

impl StillImageSource {
    pub fn open(path: &Path, fps: u32) -> Result<Self, CaptureError> {
        Ok(Self::from_frame(load_image(path)?, path.display().to_string(), fps))
    }

    pub fn from_frame(frame: Frame, label: String, fps: u32) -> Self {
        Self {
            frame,
            label,
            pacer: Pacer::from_fps(fps),
        }
    }
}

impl FrameSource for StillImageSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        self.pacer.wait();
        Ok(self.frame.clone())
    }

    fn describe(&self) -> String {
        format!("still image {} ({}x{})", self.label, self.frame.width, self.frame.height)
    }
}

/// Fixed-size raw BGR24 frames from a byte stream
///
/// Pairs with an external grabber, e.g.
/// `ffmpeg -f v4l2 -i /dev/video0 -f rawvideo -pix_fmt bgr24 - | streamer --source stdin`.
pub struct RawPipeSource<R: Read + Send> {
    reader: R,
    width: u32,
    height: u32,
}

impl<R: Read + Send> RawPipeSource<R> {
    pub fn new(reader: R, width: u32, height: u32) -> Self {
        Self {
            reader,
            width,
            height,
        }
    }
}

impl<R: Read + Send> FrameSource for RawPipeSource<R> {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let mut frame = Frame::filled(self.width, self.height, 3, 0);
        self.reader.read_exact(&mut frame.data).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                CaptureError::EndOfStream
            } else {
                CaptureError::ReadFailed(e.to_string())
            }
        })?;
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("raw bgr24 pipe {}x{}", self.width, self.height)
    }
}
