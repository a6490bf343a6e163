//! Frame-differencing motion detector.
//!
//! Each frame is reduced to a blurred luminance image and compared with the
//! previous one. Pixels whose change exceeds the intensity threshold form a
//! binary mask; the mask is dilated so one moving object yields one blob, and
//! every external blob above the area threshold becomes a `MotionRegion`.
//!
//! A detector owns exactly one baseline. Use one instance per camera stream.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::filter::separable_filter_equal;
use imageproc::morphology::dilate;
use imageproc::point::Point;

use crate::frame::{Frame, MotionRegion};

pub const DEFAULT_MOTION_THRESHOLD: u8 = 25;
pub const DEFAULT_MIN_AREA: f64 = 500.0;
pub const DEFAULT_BLUR_KERNEL: u32 = 21;
pub const DEFAULT_DILATE_ITERATIONS: u8 = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct MotionSettings {
    /// Per-pixel intensity delta that counts as change.
    pub threshold: u8,
    /// Contour area (in pixels) a blob must exceed to count as motion.
    pub min_area: f64,
    /// Odd Gaussian kernel size used to suppress sensor noise.
    pub blur_kernel: u32,
    /// Number of 3x3 dilation passes over the change mask.
    pub dilate_iterations: u8,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MOTION_THRESHOLD,
            min_area: DEFAULT_MIN_AREA,
            blur_kernel: DEFAULT_BLUR_KERNEL,
            dilate_iterations: DEFAULT_DILATE_ITERATIONS,
        }
    }
}

impl MotionSettings {
    /// Gaussian sigma for the configured kernel, using the same derivation as
    /// OpenCV when sigma is left at zero.
    pub fn blur_sigma(&self) -> f32 {
        let k = self.blur_kernel.max(3) as f32;
        0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8
    }

    /// Normalised 1-D Gaussian taps, `blur_kernel` wide (forced odd, at least 3).
    pub fn blur_kernel_taps(&self) -> Vec<f32> {
        let size = (self.blur_kernel.max(3) | 1) as usize;
        let sigma = self.blur_sigma();
        let centre = (size / 2) as f32;
        let mut taps: Vec<f32> = (0..size)
            .map(|i| {
                let d = i as f32 - centre;
                (-(d * d) / (2.0 * sigma * sigma)).exp()
            })
            .collect();
        let sum: f32 = taps.iter().sum();
        for tap in taps.iter_mut() {
            *tap /= sum;
        }
        taps
    }
}

/// Result of one `detect_motion` call.
#[derive(Clone, Debug, PartialEq)]
pub enum MotionOutcome {
    /// No baseline existed (first frame, or geometry changed); this frame is now
    /// the baseline.
    Baseline,
    /// Compared against the baseline and found no qualifying blob.
    Still,
    /// At least one blob exceeded the area threshold.
    Motion(Vec<MotionRegion>),
}

impl MotionOutcome {
    pub fn motion_detected(&self) -> bool {
        matches!(self, MotionOutcome::Motion(_))
    }

    /// Regions of change, or `None` when there was no motion.
    pub fn regions(&self) -> Option<&[MotionRegion]> {
        match self {
            MotionOutcome::Motion(regions) => Some(regions),
            MotionOutcome::Baseline | MotionOutcome::Still => None,
        }
    }
}

pub struct MotionDetector {
    settings: MotionSettings,
    blur_taps: Vec<f32>,
    previous: Option<GrayImage>,
}

impl MotionDetector {
    pub fn new(settings: MotionSettings) -> Self {
        let blur_taps = settings.blur_kernel_taps();
        Self {
            settings,
            blur_taps,
            previous: None,
        }
    }

    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }

    /// Compare `frame` with the previous frame and advance the baseline.
    ///
    /// The baseline is replaced with this frame on every call, whatever the
    /// outcome.
    pub fn detect_motion(&mut self, frame: &Frame) -> MotionOutcome {
        let current = self.preprocess(frame);

        let outcome = match self.previous.as_ref() {
            None => MotionOutcome::Baseline,
            Some(previous) if previous.dimensions() != current.dimensions() => {
                log::debug!(
                    "frame geometry changed {:?} -> {:?}; re-seeding motion baseline",
                    previous.dimensions(),
                    current.dimensions()
                );
                MotionOutcome::Baseline
            }
            Some(previous) => {
                let regions = self.changed_regions(previous, &current);
                if regions.is_empty() {
                    MotionOutcome::Still
                } else {
                    MotionOutcome::Motion(regions)
                }
            }
        };

        self.previous = Some(current);
        outcome
    }

    /// Drop the baseline; the next frame re-seeds it.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    fn preprocess(&self, frame: &Frame) -> GrayImage {
        let gray = image::imageops::grayscale(frame.image());
        separable_filter_equal(&gray, &self.blur_taps)
    }

    fn changed_regions(&self, previous: &GrayImage, current: &GrayImage) -> Vec<MotionRegion> {
        let delta = abs_diff(previous, current);
        let mut mask = threshold(&delta, self.settings.threshold, ThresholdType::Binary);
        if self.settings.dilate_iterations > 0 {
            // n passes of a 3x3 square equal one pass with a chessboard radius of n.
            mask = dilate(&mask, Norm::LInf, self.settings.dilate_iterations);
        }

        // Blobs touching the image edge only get an outer border when the
        // mask is surrounded by background.
        let (width, height) = mask.dimensions();
        let mut padded = GrayImage::new(width + 2, height + 2);
        image::imageops::replace(&mut padded, &mask, 1, 1);

        find_contours::<i32>(&padded)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
            .filter(|contour| contour_area(&contour.points) > self.settings.min_area)
            .filter_map(|contour| bounding_rect(&contour.points, width, height))
            .collect()
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new(MotionSettings::default())
    }
}

fn abs_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let (width, height) = a.dimensions();
    let mut out = GrayImage::new(width, height);
    for ((dst, pa), pb) in out.pixels_mut().zip(a.pixels()).zip(b.pixels()) {
        *dst = Luma([pa[0].abs_diff(pb[0])]);
    }
    out
}

/// Polygon area of a traced border (shoelace formula).
fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area: i64 = 0;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    twice_area.abs() as f64 / 2.0
}

/// Bounding box of a border traced on the 1-pixel padded mask, mapped back
/// into a `width` x `height` frame.
fn bounding_rect(points: &[Point<i32>], width: u32, height: u32) -> Option<MotionRegion> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let clamp_x = |v: i32| (v - 1).clamp(0, width as i32 - 1);
    let clamp_y = |v: i32| (v - 1).clamp(0, height as i32 - 1);
    let (x0, x1) = (clamp_x(min_x), clamp_x(max_x));
    let (y0, y1) = (clamp_y(min_y), clamp_y(max_y));
    Some(MotionRegion {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0 + 1) as u32,
        height: (y1 - y0 + 1) as u32,
    })
}
