mod backend;
pub mod backends;
pub mod motion;
mod pipeline;
mod registry;
mod result;

pub use backend::PersonClassifier;
pub use backends::StubClassifier;
#[cfg(feature = "backend-tract")]
pub use backends::TractPersonClassifier;
pub use motion::{MotionDetector, MotionOutcome, MotionSettings};
pub use pipeline::DetectionPipeline;
pub use registry::{build_classifier, SharedClassifier};
pub use result::{
    PersonBox, PersonDetection, PersonScan, Verdict, DEFAULT_PERSON_THRESHOLD,
    MESSAGE_MOTION_ONLY, MESSAGE_NO_MOTION, MESSAGE_PERSON, PERSON_CLASS_ID,
};
