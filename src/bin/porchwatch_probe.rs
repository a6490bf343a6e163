//! porchwatch_probe - run the detection pipeline against a camera, unpaced
//!
//! Prints one JSON line per frame. Useful for tuning the motion threshold and
//! minimum area for a particular camera placement before deploying.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;

use porchwatch::config::{CameraSettings, ClassifierKind, DetectionSettings};
use porchwatch::detect::{
    build_classifier, DetectionPipeline, MotionDetector, MotionSettings, DEFAULT_PERSON_THRESHOLD,
};
use porchwatch::frame::MotionRegion;
use porchwatch::ingest::open_source;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Camera URL (stub://, http(s)://, rtsp(s)://).
    #[arg(long, env = "PORCHWATCH_CAMERA_URL", default_value = "stub://probe?motion_every=10")]
    url: String,
    /// Number of frames to process.
    #[arg(long, default_value_t = 60)]
    frames: u64,
    /// Capture rate requested from networked sources.
    #[arg(long, default_value_t = 15)]
    capture_fps: u32,
    /// Per-pixel intensity change that counts as motion.
    #[arg(long, default_value_t = 25)]
    motion_threshold: u8,
    /// Minimum contour area in pixels.
    #[arg(long, default_value_t = 500.0)]
    min_area: f64,
    /// Person confidence threshold.
    #[arg(long, default_value_t = DEFAULT_PERSON_THRESHOLD)]
    person_threshold: f32,
    /// Person classifier: tract or stub.
    #[arg(long, default_value = "stub")]
    classifier: String,
    /// ONNX model for the tract classifier.
    #[arg(long, env = "PORCHWATCH_MODEL_PATH", default_value = "models/detect.onnx")]
    model_path: String,
}

#[derive(Serialize)]
struct ProbeLine<'a> {
    frame: u64,
    detected: bool,
    message: Option<&'a str>,
    person: bool,
    regions: &'a [MotionRegion],
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.frames == 0 {
        return Err(anyhow!("frames must be >= 1"));
    }

    let detection = DetectionSettings {
        motion: MotionSettings {
            threshold: args.motion_threshold,
            min_area: args.min_area,
            ..MotionSettings::default()
        },
        person_threshold: args.person_threshold,
        classifier: args.classifier.parse::<ClassifierKind>()?,
        model_path: args.model_path.into(),
        ..DetectionSettings::default()
    };
    let classifier = build_classifier(&detection)?;

    let mut source = open_source(&CameraSettings {
        url: args.url.clone(),
        capture_fps: args.capture_fps,
    })?;
    source
        .connect()
        .with_context(|| format!("connect camera {}", args.url))?;
    let mut pipeline = DetectionPipeline::new(MotionDetector::new(detection.motion), classifier);

    let mut triggered = 0u64;
    let mut people = 0u64;
    for index in 0..args.frames {
        let Some(frame) = source.next_frame()? else {
            log::info!("source ended after {} frames", index);
            break;
        };
        let verdict = pipeline.process_frame(&frame);
        triggered += u64::from(verdict.triggered());
        people += u64::from(verdict.person_confirmed());
        let line = ProbeLine {
            frame: index,
            detected: verdict.triggered(),
            message: verdict.message(),
            person: verdict.person_confirmed(),
            regions: verdict.regions(),
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    eprintln!(
        "{} frames from {}: {} with motion, {} with a person",
        source.stats().frames_captured,
        args.url,
        triggered,
        people
    );
    Ok(())
}
