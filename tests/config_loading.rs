use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use porchwatch::config::{ClassifierKind, PorchwatchConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PORCHWATCH_CONFIG",
        "PORCHWATCH_ADDR",
        "PORCHWATCH_CAMERA_URL",
        "PORCHWATCH_CLASSIFIER",
        "PORCHWATCH_MODEL_PATH",
        "PORCHWATCH_MOTION_THRESHOLD",
        "PORCHWATCH_MIN_AREA",
        "PORCHWATCH_PERSON_THRESHOLD",
        "PORCHWATCH_STREAM_FPS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PorchwatchConfig::load().expect("load defaults");
    assert_eq!(cfg.addr, "127.0.0.1:8088");
    assert_eq!(cfg.camera.url, "stub://front_door");
    assert_eq!(cfg.detection.motion.threshold, 25);
    assert_eq!(cfg.detection.motion.min_area, 500.0);
    assert_eq!(cfg.detection.person_threshold, 0.5);
    assert_eq!(cfg.stream.target_fps, 30);
    assert_eq!(cfg.stream.alert_cooldown, Duration::ZERO);
}

#[cfg(not(feature = "backend-tract"))]
#[test]
fn default_build_starts_motion_only() {
    use porchwatch::detect::build_classifier;

    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PorchwatchConfig::load().expect("load defaults");
    assert_eq!(cfg.detection.classifier, ClassifierKind::Stub);
    let classifier = build_classifier(&cfg.detection).expect("default classifier");
    assert_eq!(classifier.name(), "stub");
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "server": { "addr": "0.0.0.0:9000" },
        "camera": { "url": "rtsps://protect.local:7441/doorbell", "capture_fps": 10 },
        "detection": {
            "motion_threshold": 30,
            "min_area": 800,
            "classifier": "stub",
            "model_path": "/opt/models/ssd.onnx"
        },
        "stream": { "target_fps": 20, "jpeg_quality": 70, "alert_cooldown_secs": 15 }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("PORCHWATCH_CONFIG", file.path());
    std::env::set_var("PORCHWATCH_MIN_AREA", "1200");
    std::env::set_var("PORCHWATCH_PERSON_THRESHOLD", "0.65");

    let cfg = PorchwatchConfig::load().expect("load config");
    assert_eq!(cfg.addr, "0.0.0.0:9000");
    assert_eq!(cfg.camera.url, "rtsps://protect.local:7441/doorbell");
    assert_eq!(cfg.camera.capture_fps, 10);
    assert_eq!(cfg.detection.motion.threshold, 30);
    assert_eq!(cfg.detection.motion.min_area, 1200.0);
    assert_eq!(cfg.detection.person_threshold, 0.65);
    assert_eq!(cfg.detection.classifier, ClassifierKind::Stub);
    assert_eq!(cfg.detection.model_path, PathBuf::from("/opt/models/ssd.onnx"));
    assert_eq!(cfg.stream.target_fps, 20);
    assert_eq!(cfg.stream.jpeg_quality, 70);
    assert_eq!(cfg.stream.alert_cooldown, Duration::from_secs(15));

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[camera]
url = "http://doorbell.local/snap.jpeg"

[detection]
blur_kernel = 15
dilate_iterations = 3

[stream]
max_consecutive_errors = 5
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("PORCHWATCH_CONFIG", file.path());
    std::env::set_var("PORCHWATCH_STREAM_FPS", "12");

    let cfg = PorchwatchConfig::load().expect("load config");
    assert_eq!(cfg.camera.url, "http://doorbell.local/snap.jpeg");
    assert_eq!(cfg.detection.motion.blur_kernel, 15);
    assert_eq!(cfg.detection.motion.dilate_iterations, 3);
    assert_eq!(cfg.stream.max_consecutive_errors, 5);
    assert_eq!(cfg.stream.target_fps, 12);

    clear_env();
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PORCHWATCH_MOTION_THRESHOLD", "lots");
    assert!(PorchwatchConfig::load().is_err());
    clear_env();

    std::env::set_var("PORCHWATCH_PERSON_THRESHOLD", "1.5");
    assert!(PorchwatchConfig::load().is_err());
    clear_env();

    std::env::set_var("PORCHWATCH_STREAM_FPS", "0");
    assert!(PorchwatchConfig::load().is_err());
    clear_env();

    std::env::set_var("PORCHWATCH_CLASSIFIER", "yolo");
    assert!(PorchwatchConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(b"{ not json").expect("write config");
    std::env::set_var("PORCHWATCH_CONFIG", file.path());
    assert!(PorchwatchConfig::load().is_err());
    clear_env();
}
