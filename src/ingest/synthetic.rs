//! Synthetic doorstep scene (`stub://` URLs).
//!
//! A fixed textured background with a bright block standing in for a visitor.
//! The block jumps to a new position every `motion_every` frames, and every
//! frame carries low-amplitude sensor noise, so the detector sees the same
//! still/motion mix a real camera produces.
//!
//! URL form: `stub://name?size=WxH&motion_every=N&frames=M&seed=S`.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;
const DEFAULT_MOTION_EVERY: u32 = 30;
const SENSOR_NOISE: i16 = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Frames between block moves. Zero keeps the scene still.
    pub motion_every: u32,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://front_door".to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            motion_every: DEFAULT_MOTION_EVERY,
            max_frames: None,
            seed: 7,
        }
    }
}

impl SyntheticConfig {
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic source url must start with stub://"))?;
        let mut cfg = SyntheticConfig {
            url: url.to_string(),
            ..SyntheticConfig::default()
        };
        let Some((_, query)) = rest.split_once('?') else {
            return Ok(cfg);
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("stub url parameter '{}' has no value", pair))?;
            match key {
                "size" => {
                    let (w, h) = value
                        .split_once('x')
                        .ok_or_else(|| anyhow!("size must look like 320x240"))?;
                    cfg.width = w.parse().context("stub size width")?;
                    cfg.height = h.parse().context("stub size height")?;
                }
                "motion_every" => cfg.motion_every = value.parse().context("stub motion_every")?,
                "frames" => cfg.max_frames = Some(value.parse().context("stub frames")?),
                "seed" => cfg.seed = value.parse().context("stub seed")?,
                other => return Err(anyhow!("unknown stub url parameter '{}'", other)),
            }
        }
        if cfg.width < 16 || cfg.height < 16 {
            return Err(anyhow!("stub frames must be at least 16x16"));
        }
        Ok(cfg)
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    background: RgbImage,
    rng: StdRng,
    block: (u32, u32),
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let background = render_background(config.width, config.height, &mut rng);
        let block = (config.width / 8, config.height / 4);
        Self {
            config,
            background,
            rng,
            block,
            frame_count: 0,
            connected: false,
        }
    }

    fn block_size(&self) -> u32 {
        (self.config.width.min(self.config.height) / 4).max(4)
    }

    fn maybe_move_block(&mut self) {
        let every = self.config.motion_every as u64;
        if every == 0 || self.frame_count == 0 || self.frame_count % every != 0 {
            return;
        }
        let size = self.block_size();
        let max_x = self.config.width - size;
        let max_y = self.config.height - size;
        let previous = self.block;
        // Land somewhere clearly apart from the previous position.
        loop {
            let candidate = (self.rng.gen_range(0..=max_x), self.rng.gen_range(0..=max_y));
            if candidate.0.abs_diff(previous.0) >= size / 2
                || candidate.1.abs_diff(previous.1) >= size / 2
            {
                self.block = candidate;
                break;
            }
        }
    }

    fn render(&mut self) -> RgbImage {
        let size = self.block_size();
        let (bx, by) = self.block;
        let mut img = self.background.clone();
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            if x >= bx && x < bx + size && y >= by && y < by + size {
                *pixel = Rgb([210, 180, 150]);
            }
            let noise = self.rng.gen_range(-SENSOR_NOISE..=SENSOR_NOISE);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as i16 + noise).clamp(0, 255) as u8;
            }
        }
        img
    }
}

impl FrameSource for SyntheticSource {
    /// Synthetic sources are always "connected".
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("synthetic source connected: {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("synthetic source not connected; call connect() first"));
        }
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }
        self.maybe_move_block();
        let frame = Frame::from(self.render());
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

fn render_background(width: u32, height: u32, rng: &mut StdRng) -> RgbImage {
    // Door-and-porch shading: vertical gradient plus coarse static texture.
    let tiles_x = width / 8 + 1;
    let tiles_y = height / 8 + 1;
    let texture: Vec<u8> = (0..tiles_x * tiles_y).map(|_| rng.gen_range(0..12)).collect();
    RgbImage::from_fn(width, height, |x, y| {
        let shade = 60 + (y * 60 / height.max(1)) as u8;
        let t = texture[((y / 8) * tiles_x + x / 8) as usize];
        Rgb([shade + t, shade + t / 2, shade])
    })
}
