//! Frame container and the geometry types that come out of detection.
//!
//! - `Frame`: one RGB camera sample, owned by whoever captured it and lent to
//!   the detection pipeline for a single cycle.
//! - `MotionRegion`: pixel-space bounding box of a moving blob.
//!
//! Frames are validated once at construction. Everything downstream may assume
//! `data.len() == width * height * 3`.

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{GenericImageView, RgbImage};
use serde::Serialize;
use std::fmt;

/// Channels per pixel. Frames are always packed RGB8.
pub const CHANNELS: usize = 3;

/// Default JPEG quality for frames pushed to subscribers.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// One RGB camera frame.
///
/// Pixel data is immutable once constructed. The detection pipeline borrows a
/// frame for the duration of one call and never keeps a reference to it.
#[derive(Clone)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap packed RGB8 bytes.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected_len,
                width,
                height,
                data.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", width, height))?;
        Ok(Self { image })
    }

    /// Decode a JPEG/PNG payload into a frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes).context("decode frame image")?;
        let (width, height) = decoded.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("decoded frame is empty"));
        }
        Ok(Self {
            image: decoded.into_rgb8(),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Encode as baseline JPEG.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.image.as_raw().len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .encode_image(&self.image)
            .context("encode frame as jpeg")?;
        Ok(out)
    }

    /// JPEG bytes as standard base64, the shape the dashboard puts in an
    /// `<img src="data:image/jpeg;base64,...">`.
    pub fn encode_jpeg_base64(&self, quality: u8) -> Result<String> {
        let jpeg = self.encode_jpeg(quality)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(jpeg))
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        Self { image }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish_non_exhaustive()
    }
}

/// Axis-aligned box in frame pixel coordinates around one moving blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MotionRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl MotionRegion {
    /// True if the two boxes share at least one pixel.
    pub fn overlaps(&self, other: &MotionRegion) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}
