//! Raw interleaved 8-bit image frames

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};

use crate::error::StreamError;

/// Interleaved 8-bit frame (BGR order for 3-channel frames)
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Pixel data, row-major, `width * height * channels` bytes
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Channels per pixel
    pub channels: u8,
    /// Capture timestamp in microseconds
    pub timestamp_us: u64,
    /// Monotonic sequence number assigned at capture
    pub sequence: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        Self {
            data,
            width,
            height,
            channels,
            timestamp_us: 0,
            sequence: 0,
        }
    }

    /// Frame filled with a single value in every channel
    pub fn filled(width: u32, height: u32, channels: u8, value: u8) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self::new(vec![value; len], width, height, channels)
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Whether the buffer length agrees with the declared shape
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.stride() * self.height as usize
    }

    /// Pixel slice at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels as usize;
        let offset = y as usize * self.stride() + x as usize * c;
        &self.data[offset..offset + c]
    }

    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let c = self.channels as usize;
        let offset = y as usize * self.stride() + x as usize * c;
        &mut self.data[offset..offset + c]
    }

    /// BGR frame from an RGB image
    pub fn from_rgb_image(image: &RgbImage) -> Self {
        let mut data = image.as_raw().clone();
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        Self::new(data, image.width(), image.height(), 3)
    }

    /// RGB image from a BGR frame; `None` unless the frame is 3-channel
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if self.channels != 3 || !self.is_consistent() {
            return None;
        }
        let mut data = self.data.clone();
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        RgbImage::from_raw(self.width, self.height, data)
    }

    /// Resize a 3-channel frame, keeping sequence and timestamp.
    ///
    /// Channel order is carried through untouched.
    pub fn resized(&self, width: u32, height: u32) -> Result<Frame, StreamError> {
        if self.width == width && self.height == height {
            return Ok(self.clone());
        }
        if self.channels != 3 {
            return Err(StreamError::UnsupportedFormat(format!(
                "{} channels, expected 3",
                self.channels
            )));
        }

        let buffer: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(self.width, self.height, self.data.as_slice()).ok_or_else(
                || StreamError::UnsupportedFormat("buffer smaller than frame shape".into()),
            )?;
        let resized = imageops::resize(&buffer, width, height, FilterType::Triangle);

        Ok(Frame {
            data: resized.into_raw(),
            width,
            height,
            channels: 3,
            timestamp_us: self.timestamp_us,
            sequence: self.sequence,
        })
    }
}
