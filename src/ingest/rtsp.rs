//! RTSP camera source backed by GStreamer.
//!
//! UniFi Protect publishes an `rtsps://` stream per camera channel once RTSP
//! is enabled for it in the Protect UI. The pipeline decodes to packed RGB and
//! keeps only the newest sample, so a slow consumer skips frames instead of
//! building latency.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;

use gstreamer::prelude::*;

use super::{frame_interval, FrameSource, SourceStats};
use crate::frame::Frame;

pub struct RtspSource {
    url: String,
    capture_fps: u32,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_count: u64,
    last_error: Option<String>,
}

/// Decode chain. The camera URL is set on `src` as a property, never spliced
/// into the description, so credentials may contain launch-syntax characters.
const PIPELINE_DESCRIPTION: &str = "rtspsrc name=src latency=0 ! decodebin ! videoconvert ! \
     video/x-raw,format=RGB ! appsink name=appsink sync=false max-buffers=1 drop=true";

impl RtspSource {
    /// Build the decode pipeline: rtspsrc ! decodebin ! videoconvert ! appsink (RGB).
    pub fn new(url: &str, capture_fps: u32) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let pipeline = gstreamer::parse::launch(PIPELINE_DESCRIPTION)
            .context("build RTSP pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("RTSP pipeline is not a Pipeline"))?;

        pipeline
            .by_name("src")
            .context("rtspsrc element missing from pipeline")?
            .set_property("location", url);

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        Ok(Self {
            url: url.to_string(),
            capture_fps,
            pipeline,
            appsink,
            frame_count: 0,
            last_error: None,
        })
    }

    fn frame_timeout(&self) -> gstreamer::ClockTime {
        let base = frame_interval(self.capture_fps).saturating_mul(4);
        let timeout = base.max(Duration::from_millis(500));
        gstreamer::ClockTime::from_mseconds(timeout.as_millis() as u64)
    }

    fn poll_bus(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.pop() {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    self.last_error = Some(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => {
                    self.last_error = Some("gstreamer reached EOS".to_string());
                }
                _ => {}
            }
        }
    }
}

impl FrameSource for RtspSource {
    fn connect(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .context("set RTSP pipeline to Playing")?;
        log::info!("rtsp source connected: {}", self.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.poll_bus();

        let Some(sample) = self.appsink.try_pull_sample(self.frame_timeout()) else {
            if self.appsink.is_eos() {
                return Ok(None);
            }
            return Err(anyhow!(
                "RTSP stream stalled{}",
                self.last_error
                    .as_deref()
                    .map(|e| format!(": {}", e))
                    .unwrap_or_default()
            ));
        };

        let frame = sample_to_frame(&sample)?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.url.clone(),
        }
    }
}

impl Drop for RtspSource {
    fn drop(&mut self) {
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("failed to stop RTSP pipeline for {}: {}", self.url, err);
        }
    }
}

fn sample_to_frame(sample: &gstreamer::Sample) -> Result<Frame> {
    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let caps = sample.caps().context("RTSP sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse RTSP caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map RTSP buffer")?;
    let data = map.as_slice();

    let pixels = if stride == row_bytes {
        data.get(..row_bytes * height as usize)
            .context("RTSP buffer shorter than frame")?
            .to_vec()
    } else {
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            pixels.extend_from_slice(
                data.get(start..start + row_bytes)
                    .context("RTSP buffer row is out of bounds")?,
            );
        }
        pixels
    };

    Frame::from_rgb(width, height, pixels)
}
