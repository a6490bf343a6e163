//! Frame sources.
//!
//! - `stub://` synthetic scene (always available; demos and tests)
//! - `http(s)://` MJPEG streams or JPEG snapshot endpoints (feature: ingest-http)
//! - `rtsp(s)://` camera streams via GStreamer (feature: rtsp-gstreamer)
//!
//! UniFi Protect exposes both an RTSPS stream and a JPEG snapshot endpoint per
//! camera, so either networked backend can front the doorbell. Sources do no
//! detection and keep no frame after handing it to the caller.

#[cfg(feature = "ingest-http")]
pub mod http;
#[cfg(feature = "rtsp-gstreamer")]
pub mod rtsp;
pub mod synthetic;

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::config::CameraSettings;
use crate::frame::Frame;

#[cfg(feature = "ingest-http")]
pub use http::HttpSource;
#[cfg(feature = "rtsp-gstreamer")]
pub use rtsp::RtspSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// A camera feed delivering frames in capture order.
pub trait FrameSource: Send {
    /// Open the underlying stream. Must be called before `next_frame`.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame is available.
    ///
    /// `Ok(None)` means the source has ended and will produce nothing more.
    /// Errors are per-capture: the caller may retry.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Build the source named by the camera URL. Does not connect.
pub fn open_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let url = settings.url.trim();
    let scheme = url
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .ok_or_else(|| anyhow!("camera url '{}' has no scheme", url))?;

    match scheme.as_str() {
        "stub" => Ok(Box::new(SyntheticSource::new(SyntheticConfig::from_url(
            url,
        )?))),
        "http" | "https" => open_http(settings),
        "rtsp" | "rtsps" => open_rtsp(settings),
        other => Err(anyhow!(
            "unsupported camera scheme '{}'; expected stub, http(s) or rtsp(s)",
            other
        )),
    }
}

#[cfg(feature = "ingest-http")]
fn open_http(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(HttpSource::new(
        &settings.url,
        settings.capture_fps,
    )?))
}

#[cfg(not(feature = "ingest-http"))]
fn open_http(_settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!("http camera sources require the ingest-http feature"))
}

#[cfg(feature = "rtsp-gstreamer")]
fn open_rtsp(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(RtspSource::new(
        &settings.url,
        settings.capture_fps,
    )?))
}

#[cfg(not(feature = "rtsp-gstreamer"))]
fn open_rtsp(_settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!("rtsp camera sources require the rtsp-gstreamer feature"))
}

/// Minimum spacing between delivered frames for a capture rate.
pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_urls_open_synthetic_sources() -> Result<()> {
        let settings = CameraSettings {
            url: "stub://porch?size=64x48".into(),
            capture_fps: 10,
        };
        let mut source = open_source(&settings)?;
        source.connect()?;
        let frame = source.next_frame()?.expect("frame");
        assert_eq!((frame.width(), frame.height()), (64, 48));
        assert_eq!(source.stats().source, "stub://porch?size=64x48");
        Ok(())
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let settings = CameraSettings {
            url: "ftp://camera".into(),
            capture_fps: 10,
        };
        assert!(open_source(&settings).is_err());
    }

    #[test]
    fn url_without_scheme_is_rejected() {
        let settings = CameraSettings {
            url: "front-door".into(),
            capture_fps: 10,
        };
        assert!(open_source(&settings).is_err());
    }

    #[test]
    fn frame_interval_follows_capture_rate() {
        assert_eq!(frame_interval(10), Duration::from_millis(100));
        assert_eq!(frame_interval(0), Duration::ZERO);
    }
}
