//! HTTP camera source.
//!
//! Handles the two shapes cameras serve over HTTP:
//! - `multipart/x-mixed-replace` MJPEG streams, read continuously
//! - single-JPEG snapshot endpoints, fetched once per frame
//!
//! Frames arriving faster than the capture rate are dropped here, so the
//! detection pipeline only sees the decimated sequence.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::{Duration, Instant};

use url::Url;

use super::{frame_interval, FrameSource, SourceStats};
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpSource {
    url: String,
    capture_fps: u32,
    agent: ureq::Agent,
    stream: Option<HttpStream>,
    last_frame_at: Option<Instant>,
    frame_count: u64,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    Snapshot,
}

impl HttpSource {
    pub fn new(url: &str, capture_fps: u32) -> Result<Self> {
        let parsed = Url::parse(url).context("parse camera url")?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported http camera scheme '{}'",
                parsed.scheme()
            ));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(HTTP_TIMEOUT)
            .timeout_read(HTTP_TIMEOUT)
            .build();
        Ok(Self {
            url: url.to_string(),
            capture_fps,
            agent,
            stream: None,
            last_frame_at: None,
            frame_count: 0,
        })
    }

    fn fetch_snapshot(&self) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("fetch jpeg snapshot from {}", self.url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES as u64 + 1)
            .read_to_end(&mut bytes)
            .context("read jpeg snapshot")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty jpeg snapshot"));
        }
        if bytes.len() > MAX_JPEG_BYTES {
            return Err(anyhow!("jpeg snapshot exceeds {} bytes", MAX_JPEG_BYTES));
        }
        Ok(bytes)
    }

    fn next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let min_interval = frame_interval(self.capture_fps);
        let is_snapshot = match self.stream.as_ref() {
            Some(HttpStream::Snapshot) => true,
            Some(HttpStream::Mjpeg(_)) => false,
            None => return Err(anyhow!("http source not connected; call connect() first")),
        };

        if is_snapshot {
            // Polling: wait out the interval instead of hammering the endpoint.
            if let Some(last) = self.last_frame_at {
                let elapsed = last.elapsed();
                if elapsed < min_interval {
                    std::thread::sleep(min_interval - elapsed);
                }
            }
            return self.fetch_snapshot().map(Some);
        }

        let Some(HttpStream::Mjpeg(stream)) = self.stream.as_mut() else {
            return Err(anyhow!("http source lost its mjpeg stream"));
        };
        loop {
            let Some(jpeg) = stream.read_next_jpeg()? else {
                return Ok(None);
            };
            if let Some(last) = self.last_frame_at {
                if last.elapsed() < min_interval {
                    continue;
                }
            }
            return Ok(Some(jpeg));
        }
    }
}

impl FrameSource for HttpSource {
    fn connect(&mut self) -> Result<()> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("connect to camera at {}", self.url))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        if content_type.contains("multipart") {
            self.stream = Some(HttpStream::Mjpeg(MjpegStream::new(response.into_reader())));
            log::info!("http source connected (mjpeg): {}", self.url);
        } else {
            self.stream = Some(HttpStream::Snapshot);
            log::info!("http source connected (snapshot polling): {}", self.url);
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(jpeg) = self.next_jpeg()? else {
            log::info!("mjpeg stream ended: {}", self.url);
            return Ok(None);
        };
        self.last_frame_at = Some(Instant::now());

        let frame = Frame::decode(&jpeg)?;
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

struct MjpegStream {
    reader: Box<dyn Read + Send + Sync + 'static>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send + Sync + 'static>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Next complete JPEG in the multipart body, or `None` at end of stream.
    fn read_next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(Some(frame));
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

/// Locate the first SOI..EOI span in `buffer`.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}
