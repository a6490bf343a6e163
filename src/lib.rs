//! Porchwatch
//!
//! Doorbell camera watcher: frame differencing finds motion, a person
//! classifier runs only on frames that moved, and every verdict is streamed to
//! the subscriber that asked for it over a WebSocket.
//!
//! # Pipeline
//!
//! 1. **Frame source** (`ingest`): synthetic, HTTP (MJPEG/snapshot) or RTSP.
//! 2. **Motion detector** (`detect::motion`): blur, difference against the
//!    previous frame, threshold, dilate, keep contours above a minimum area.
//! 3. **Person classifier** (`detect::backends`): SSD-style detector, invoked
//!    only when motion was found. One loaded model, shared under a lock.
//! 4. **Stream publisher** (`stream`): paced `camera_frame` events plus a
//!    `person_detected` alert when a person is confirmed.
//!
//! Person classification with a real model needs the `backend-tract` feature.
//! Without it the default classifier is the stub and verdicts are motion-only.
//!
//! # Module Structure
//!
//! - `frame`: RGB frame and motion region types, JPEG codec
//! - `detect`: motion detector, classifier trait and backends, orchestrator
//! - `ingest`: frame sources
//! - `stream`: WebSocket protocol, per-subscriber streaming tasks
//! - `config`: file + environment configuration

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod stream;

pub use config::{
    CameraSettings, ClassifierKind, DetectionSettings, PorchwatchConfig, StreamSettings,
};
pub use detect::{
    build_classifier, DetectionPipeline, MotionDetector, MotionOutcome, MotionSettings,
    PersonClassifier, PersonScan, SharedClassifier, StubClassifier, Verdict,
};
pub use frame::{Frame, MotionRegion};
pub use ingest::{open_source, FrameSource, SourceStats, SyntheticConfig, SyntheticSource};
pub use stream::{ClientCommand, ServerEvent, StreamExit, StreamSession};
