use anyhow::Result;

use crate::frame::Frame;

use super::motion::{MotionDetector, MotionOutcome};
use super::registry::SharedClassifier;
use super::result::Verdict;

/// Per-stream detection pipeline: motion first, person classification only
/// when something moved.
///
/// The motion baseline belongs to this pipeline alone; the classifier handle
/// may be shared with other streams.
pub struct DetectionPipeline {
    motion: MotionDetector,
    classifier: SharedClassifier,
}

impl DetectionPipeline {
    pub fn new(motion: MotionDetector, classifier: SharedClassifier) -> Self {
        Self { motion, classifier }
    }

    /// Run one detection cycle. Never fails: detector errors are logged and
    /// come back as `Verdict::Failed`.
    pub fn process_frame(&mut self, frame: &Frame) -> Verdict {
        match self.evaluate(frame) {
            Ok(verdict) => verdict,
            Err(err) => {
                log::warn!("frame detection failed: {:#}", err);
                Verdict::Failed(format!("{:#}", err))
            }
        }
    }

    fn evaluate(&mut self, frame: &Frame) -> Result<Verdict> {
        let MotionOutcome::Motion(regions) = self.motion.detect_motion(frame) else {
            return Ok(Verdict::NoMotion);
        };

        let scan = self.classifier.detect_person(frame)?;
        if scan.person_detected() {
            log::debug!(
                "person confirmed: {} candidate(s) across {} motion region(s)",
                scan.people.len(),
                regions.len()
            );
            Ok(Verdict::Person {
                regions,
                people: scan.people,
            })
        } else {
            Ok(Verdict::Motion { regions })
        }
    }
}
