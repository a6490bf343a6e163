//! Pre- and post-processing for SSD-style detectors (MobileNet SSD and
//! friends): NHWC input scaled to `[-1, 1]`, post-processed outputs of boxes,
//! classes and scores.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};

use crate::frame::{Frame, CHANNELS};

/// Map an 8-bit channel value to the signed unit range the model was trained on.
pub fn normalize_channel(value: u8) -> f32 {
    value as f32 / 127.5 - 1.0
}

/// Resize `frame` to the model input and lay it out as a flattened
/// `[1, height, width, 3]` tensor.
pub fn nhwc_input(frame: &Frame, width: u32, height: u32) -> Vec<f32> {
    let resized = if frame.width() == width && frame.height() == height {
        frame.image().clone()
    } else {
        imageops::resize(frame.image(), width, height, FilterType::Triangle)
    };
    let mut input = Vec::with_capacity(width as usize * height as usize * CHANNELS);
    input.extend(resized.as_raw().iter().map(|v| normalize_channel(*v)));
    input
}

/// Decoded detector slots. The three vectors are parallel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SsdSlots {
    pub boxes: Vec<[f32; 4]>,
    pub classes: Vec<f32>,
    pub scores: Vec<f32>,
}

impl SsdSlots {
    /// Build from flat output buffers (`boxes` is `N * 4` long).
    pub fn from_flat(boxes: &[f32], classes: &[f32], scores: &[f32]) -> Result<Self> {
        if boxes.len() % 4 != 0 {
            return Err(anyhow!(
                "box output length {} is not a multiple of 4",
                boxes.len()
            ));
        }
        let boxes: Vec<[f32; 4]> = boxes
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        if boxes.len() != classes.len() || classes.len() != scores.len() {
            return Err(anyhow!(
                "detector outputs disagree: {} boxes, {} classes, {} scores",
                boxes.len(),
                classes.len(),
                scores.len()
            ));
        }
        Ok(Self {
            boxes,
            classes: classes.to_vec(),
            scores: scores.to_vec(),
        })
    }
}
