use serde::Serialize;
use std::fmt;

use crate::frame::MotionRegion;

/// Class index of "person" in the 80-class COCO ordering used by the bundled
/// SSD detector.
pub const PERSON_CLASS_ID: u32 = 0;

/// Minimum score (exclusive) for a candidate to count as a person.
pub const DEFAULT_PERSON_THRESHOLD: f32 = 0.5;

pub const MESSAGE_NO_MOTION: &str = "no motion";
pub const MESSAGE_MOTION_ONLY: &str = "motion detected (no person)";
pub const MESSAGE_PERSON: &str = "person detected in motion area";

/// Normalised (0..1) SSD box, in the model's `[ymin, xmin, ymax, xmax]` order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PersonBox {
    pub ymin: f32,
    pub xmin: f32,
    pub ymax: f32,
    pub xmax: f32,
}

impl From<[f32; 4]> for PersonBox {
    fn from(raw: [f32; 4]) -> Self {
        Self {
            ymin: raw[0],
            xmin: raw[1],
            ymax: raw[2],
            xmax: raw[3],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PersonDetection {
    pub bbox: PersonBox,
    pub score: f32,
    pub class_id: u32,
}

/// Output of one person-classifier call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PersonScan {
    pub people: Vec<PersonDetection>,
}

impl PersonScan {
    pub fn person_detected(&self) -> bool {
        !self.people.is_empty()
    }

    /// Filter raw detector slots down to confident person detections.
    ///
    /// The three slices are parallel; extra trailing entries in any of them
    /// are ignored.
    pub fn from_slots(boxes: &[[f32; 4]], classes: &[f32], scores: &[f32], threshold: f32) -> Self {
        let people = boxes
            .iter()
            .zip(classes)
            .zip(scores)
            .filter(|((_, class), score)| **score > threshold && is_person_class(**class))
            .map(|((bbox, _), score)| PersonDetection {
                bbox: PersonBox::from(*bbox),
                score: *score,
                class_id: PERSON_CLASS_ID,
            })
            .collect();
        Self { people }
    }
}

fn is_person_class(class: f32) -> bool {
    class.is_finite() && class.round() == PERSON_CLASS_ID as f32
}

/// Per-frame decision of the detection pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    NoMotion,
    Motion {
        regions: Vec<MotionRegion>,
    },
    Person {
        regions: Vec<MotionRegion>,
        people: Vec<PersonDetection>,
    },
    /// Detection failed for this frame. Never triggers an alert.
    Failed(String),
}

impl Verdict {
    /// Whether an alert-worthy condition (motion, or motion + person) was seen.
    pub fn triggered(&self) -> bool {
        matches!(self, Verdict::Motion { .. } | Verdict::Person { .. })
    }

    pub fn person_confirmed(&self) -> bool {
        matches!(self, Verdict::Person { .. })
    }

    /// Wire message. `None` for a quiet frame.
    pub fn message(&self) -> Option<&str> {
        match self {
            Verdict::NoMotion => None,
            Verdict::Motion { .. } => Some(MESSAGE_MOTION_ONLY),
            Verdict::Person { .. } => Some(MESSAGE_PERSON),
            Verdict::Failed(reason) => Some(reason),
        }
    }

    pub fn regions(&self) -> &[MotionRegion] {
        match self {
            Verdict::Motion { regions } | Verdict::Person { regions, .. } => regions,
            Verdict::NoMotion | Verdict::Failed(_) => &[],
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message().unwrap_or(MESSAGE_NO_MOTION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_filtered_by_class_and_score() {
        let boxes = [
            [0.1, 0.1, 0.5, 0.5],
            [0.2, 0.2, 0.6, 0.6],
            [0.3, 0.3, 0.7, 0.7],
            [0.0, 0.0, 1.0, 1.0],
        ];
        let classes = [0.0, 2.0, 0.0, 0.0];
        let scores = [0.91, 0.99, 0.5, 0.2];

        let scan = PersonScan::from_slots(&boxes, &classes, &scores, DEFAULT_PERSON_THRESHOLD);

        // Threshold is exclusive: 0.5 does not qualify.
        assert_eq!(scan.people.len(), 1);
        assert!(scan.person_detected());
        assert_eq!(scan.people[0].bbox.xmin, 0.1);
        assert_eq!(scan.people[0].score, 0.91);
    }

    #[test]
    fn empty_slots_mean_no_person() {
        let scan = PersonScan::from_slots(&[], &[], &[], DEFAULT_PERSON_THRESHOLD);
        assert!(!scan.person_detected());
    }

    #[test]
    fn mismatched_slot_lengths_use_shortest() {
        let boxes = [[0.1, 0.1, 0.5, 0.5]];
        let classes = [0.0, 0.0];
        let scores = [0.9, 0.9, 0.9];
        let scan = PersonScan::from_slots(&boxes, &classes, &scores, 0.5);
        assert_eq!(scan.people.len(), 1);
    }

    #[test]
    fn nan_class_is_not_a_person() {
        let scan = PersonScan::from_slots(&[[0.0; 4]], &[f32::NAN], &[0.99], 0.5);
        assert!(!scan.person_detected());
    }

    #[test]
    fn verdict_messages() {
        assert_eq!(Verdict::NoMotion.message(), None);
        assert_eq!(Verdict::NoMotion.to_string(), MESSAGE_NO_MOTION);
        assert!(!Verdict::NoMotion.triggered());

        let motion = Verdict::Motion { regions: vec![] };
        assert!(motion.triggered());
        assert!(!motion.person_confirmed());
        assert_eq!(motion.message(), Some(MESSAGE_MOTION_ONLY));

        let person = Verdict::Person {
            regions: vec![],
            people: vec![],
        };
        assert!(person.person_confirmed());
        assert_eq!(person.message(), Some(MESSAGE_PERSON));

        let failed = Verdict::Failed("decode error".into());
        assert!(!failed.triggered());
        assert_eq!(failed.message(), Some("decode error"));
    }
}
