use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::detect::{MotionSettings, DEFAULT_PERSON_THRESHOLD};
use crate::frame::DEFAULT_JPEG_QUALITY;

const DEFAULT_ADDR: &str = "127.0.0.1:8088";
const DEFAULT_CAMERA_URL: &str = "stub://front_door";
const DEFAULT_CAPTURE_FPS: u32 = 15;
const DEFAULT_MODEL_PATH: &str = "models/detect.onnx";
const DEFAULT_MODEL_SIZE: u32 = 300;
const DEFAULT_STREAM_FPS: u32 = 30;
const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 30;

#[derive(Debug, Deserialize, Default)]
struct PorchwatchConfigFile {
    server: Option<ServerConfigFile>,
    camera: Option<CameraConfigFile>,
    detection: Option<DetectionConfigFile>,
    stream: Option<StreamConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    capture_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    motion_threshold: Option<u8>,
    min_area: Option<f64>,
    blur_kernel: Option<u32>,
    dilate_iterations: Option<u8>,
    person_threshold: Option<f32>,
    classifier: Option<String>,
    model_path: Option<PathBuf>,
    model_width: Option<u32>,
    model_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    target_fps: Option<u32>,
    jpeg_quality: Option<u8>,
    max_consecutive_errors: Option<u32>,
    alert_cooldown_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PorchwatchConfig {
    pub addr: String,
    pub camera: CameraSettings,
    pub detection: DetectionSettings,
    pub stream: StreamSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    /// Frame source URL: `stub://`, `http(s)://` or `rtsp(s)://`.
    pub url: String,
    /// Rate the source decimates capture to.
    pub capture_fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_CAMERA_URL.to_string(),
            capture_fps: DEFAULT_CAPTURE_FPS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    Tract,
    Stub,
}

impl Default for ClassifierKind {
    /// `tract` when built with `backend-tract`, otherwise the motion-only stub.
    fn default() -> Self {
        if cfg!(feature = "backend-tract") {
            ClassifierKind::Tract
        } else {
            ClassifierKind::Stub
        }
    }
}

impl FromStr for ClassifierKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tract" => Ok(ClassifierKind::Tract),
            "stub" | "none" => Ok(ClassifierKind::Stub),
            other => Err(anyhow!(
                "unknown classifier '{}'; expected 'tract' or 'stub'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub motion: MotionSettings,
    pub person_threshold: f32,
    pub classifier: ClassifierKind,
    pub model_path: PathBuf,
    pub model_width: u32,
    pub model_height: u32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            motion: MotionSettings::default(),
            person_threshold: DEFAULT_PERSON_THRESHOLD,
            classifier: ClassifierKind::default(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_width: DEFAULT_MODEL_SIZE,
            model_height: DEFAULT_MODEL_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Outbound frame rate cap per subscriber.
    pub target_fps: u32,
    pub jpeg_quality: u8,
    /// Consecutive capture failures tolerated before the stream is abandoned.
    pub max_consecutive_errors: u32,
    /// Minimum gap between two person alerts on one stream. Zero alerts on
    /// every confirmed frame.
    pub alert_cooldown: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_STREAM_FPS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            alert_cooldown: Duration::ZERO,
        }
    }
}

impl StreamSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}

impl PorchwatchConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PORCHWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PorchwatchConfigFile) -> Result<Self> {
        let addr = file
            .server
            .and_then(|server| server.addr)
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());

        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            url: camera_file
                .url
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            capture_fps: camera_file.capture_fps.unwrap_or(DEFAULT_CAPTURE_FPS),
        };

        let det = file.detection.unwrap_or_default();
        let motion_defaults = MotionSettings::default();
        let detection = DetectionSettings {
            motion: MotionSettings {
                threshold: det.motion_threshold.unwrap_or(motion_defaults.threshold),
                min_area: det.min_area.unwrap_or(motion_defaults.min_area),
                blur_kernel: det.blur_kernel.unwrap_or(motion_defaults.blur_kernel),
                dilate_iterations: det
                    .dilate_iterations
                    .unwrap_or(motion_defaults.dilate_iterations),
            },
            person_threshold: det.person_threshold.unwrap_or(DEFAULT_PERSON_THRESHOLD),
            classifier: match det.classifier {
                Some(kind) => kind.parse()?,
                None => ClassifierKind::default(),
            },
            model_path: det
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            model_width: det.model_width.unwrap_or(DEFAULT_MODEL_SIZE),
            model_height: det.model_height.unwrap_or(DEFAULT_MODEL_SIZE),
        };

        let stream_file = file.stream.unwrap_or_default();
        let stream = StreamSettings {
            target_fps: stream_file.target_fps.unwrap_or(DEFAULT_STREAM_FPS),
            jpeg_quality: stream_file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            max_consecutive_errors: stream_file
                .max_consecutive_errors
                .unwrap_or(DEFAULT_MAX_CONSECUTIVE_ERRORS),
            alert_cooldown: Duration::from_secs(stream_file.alert_cooldown_secs.unwrap_or(0)),
        };

        Ok(Self {
            addr,
            camera,
            detection,
            stream,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_string("PORCHWATCH_ADDR") {
            self.addr = addr;
        }
        if let Some(url) = env_string("PORCHWATCH_CAMERA_URL") {
            self.camera.url = url;
        }
        if let Some(kind) = env_string("PORCHWATCH_CLASSIFIER") {
            self.detection.classifier = kind.parse()?;
        }
        if let Some(path) = env_string("PORCHWATCH_MODEL_PATH") {
            self.detection.model_path = PathBuf::from(path);
        }
        if let Some(threshold) = env_parse::<u8>("PORCHWATCH_MOTION_THRESHOLD")? {
            self.detection.motion.threshold = threshold;
        }
        if let Some(min_area) = env_parse::<f64>("PORCHWATCH_MIN_AREA")? {
            self.detection.motion.min_area = min_area;
        }
        if let Some(threshold) = env_parse::<f32>("PORCHWATCH_PERSON_THRESHOLD")? {
            self.detection.person_threshold = threshold;
        }
        if let Some(fps) = env_parse::<u32>("PORCHWATCH_STREAM_FPS")? {
            self.stream.target_fps = fps;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(anyhow!("server address '{}' is not a socket address", self.addr));
        }
        if self.camera.url.trim().is_empty() {
            return Err(anyhow!("camera url must not be empty"));
        }
        if self.stream.target_fps == 0 {
            return Err(anyhow!("stream target_fps must be greater than zero"));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        let motion = &self.detection.motion;
        if motion.blur_kernel < 3 || motion.blur_kernel % 2 == 0 {
            return Err(anyhow!(
                "blur_kernel must be an odd number >= 3 (got {})",
                motion.blur_kernel
            ));
        }
        if !motion.min_area.is_finite() || motion.min_area < 0.0 {
            return Err(anyhow!("min_area must be a non-negative number"));
        }
        if !(0.0..=1.0).contains(&self.detection.person_threshold) {
            return Err(anyhow!("person_threshold must be within [0, 1]"));
        }
        if self.detection.model_width == 0 || self.detection.model_height == 0 {
            return Err(anyhow!("model input dimensions must be non-zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PorchwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} has an invalid value '{}'", key, raw)),
        None => Ok(None),
    }
}
