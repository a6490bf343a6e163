use anyhow::{Context, Result};

use crate::config::{CameraSettings, DetectionSettings};
use crate::detect::{DetectionPipeline, MotionDetector, SharedClassifier};
use crate::ingest::{open_source, FrameSource};

use super::events::{DetectionPayload, ServerEvent};

/// One subscriber's camera feed and detection state.
///
/// Owns the frame source and a private motion baseline, so two sessions never
/// see each other's frames. All methods block; the streaming task drives them
/// from the blocking pool.
pub struct StreamSession {
    source: Box<dyn FrameSource>,
    pipeline: DetectionPipeline,
    jpeg_quality: u8,
}

/// A processed frame ready to publish.
#[derive(Clone, Debug)]
pub struct FramePacket {
    pub frame: String,
    pub detection: DetectionPayload,
    pub person_confirmed: bool,
}

impl FramePacket {
    pub fn into_event(self) -> ServerEvent {
        ServerEvent::CameraFrame {
            frame: self.frame,
            detection: self.detection,
        }
    }
}

impl StreamSession {
    pub fn new(source: Box<dyn FrameSource>, pipeline: DetectionPipeline, jpeg_quality: u8) -> Self {
        Self {
            source,
            pipeline,
            jpeg_quality,
        }
    }

    /// Open and connect the configured camera with a fresh detector.
    pub fn open(
        camera: &CameraSettings,
        detection: &DetectionSettings,
        classifier: SharedClassifier,
        jpeg_quality: u8,
    ) -> Result<Self> {
        let mut source = open_source(camera)?;
        source
            .connect()
            .with_context(|| format!("connect camera {}", camera.url))?;
        let motion = MotionDetector::new(detection.motion.clone());
        let pipeline = DetectionPipeline::new(motion, classifier);
        Ok(Self::new(source, pipeline, jpeg_quality))
    }

    /// Capture, classify and encode one frame.
    ///
    /// `Ok(None)` once the source has ended. Capture and encode failures are
    /// errors; detector failures are already folded into the verdict.
    pub fn step(&mut self) -> Result<Option<FramePacket>> {
        let Some(frame) = self.source.next_frame()? else {
            return Ok(None);
        };
        let verdict = self.pipeline.process_frame(&frame);
        let encoded = frame
            .encode_jpeg_base64(self.jpeg_quality)
            .context("encode outbound frame")?;
        Ok(Some(FramePacket {
            frame: encoded,
            detection: DetectionPayload::from_verdict(&verdict, frame.width(), frame.height()),
            person_confirmed: verdict.person_confirmed(),
        }))
    }

    pub fn source_name(&self) -> String {
        self.source.stats().source
    }

    pub fn frames_captured(&self) -> u64 {
        self.source.stats().frames_captured
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{StubClassifier, MESSAGE_MOTION_ONLY, MESSAGE_PERSON};

    fn session(url: &str, classifier: StubClassifier) -> StreamSession {
        let camera = CameraSettings {
            url: url.to_string(),
            capture_fps: 10,
        };
        StreamSession::open(
            &camera,
            &DetectionSettings::default(),
            SharedClassifier::new(classifier),
            70,
        )
        .unwrap()
    }

    #[test]
    fn first_frame_is_quiet_and_encoded() -> Result<()> {
        let mut session = session("stub://door?size=64x48&motion_every=0", StubClassifier::new());
        let packet = session.step()?.expect("packet");
        assert!(!packet.detection.detected);
        assert_eq!(packet.detection.message, None);
        assert_eq!((packet.detection.width, packet.detection.height), (64, 48));
        assert!(!packet.frame.is_empty());
        assert!(!packet.person_confirmed);
        Ok(())
    }

    #[test]
    fn motion_without_person_is_reported() -> Result<()> {
        let mut session = session("stub://door?motion_every=2&frames=3", StubClassifier::new());
        session.step()?;
        session.step()?;
        let packet = session.step()?.expect("packet");
        assert!(packet.detection.detected);
        assert_eq!(packet.detection.message.as_deref(), Some(MESSAGE_MOTION_ONLY));
        assert!(!packet.detection.regions.is_empty());
        assert!(session.step()?.is_none());
        assert_eq!(session.frames_captured(), 3);
        Ok(())
    }

    #[test]
    fn confirmed_person_is_flagged() -> Result<()> {
        let mut session = session("stub://door?motion_every=1", StubClassifier::always_person());
        session.step()?;
        let packet = session.step()?.expect("packet");
        assert!(packet.person_confirmed);
        assert_eq!(packet.detection.message.as_deref(), Some(MESSAGE_PERSON));
        Ok(())
    }

    #[test]
    fn bad_camera_url_fails_to_open() {
        let camera = CameraSettings {
            url: "gopher://door".into(),
            capture_fps: 10,
        };
        let result = StreamSession::open(
            &camera,
            &DetectionSettings::default(),
            SharedClassifier::new(StubClassifier::new()),
            70,
        );
        assert!(result.is_err());
    }
}
