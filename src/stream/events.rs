//! WebSocket message shapes.
//!
//! All messages are JSON objects with a `type` field.
//!
//! Client → server: `start_stream`, `stop_stream`.
//!
//! Server → client: `stream_started`, `stream_stopped`, `stream_error`,
//! `camera_frame` (one per published frame) and `person_detected` (alert,
//! sent alongside the frame that confirmed a person).

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::detect::Verdict;
use crate::frame::MotionRegion;

pub const PERSON_ALERT_MESSAGE: &str = "Person detected at doorbell camera";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    StartStream,
    StopStream,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    StreamStarted {
        message: String,
    },
    StreamStopped {
        message: String,
    },
    StreamError {
        message: String,
    },
    CameraFrame {
        /// Base64 JPEG.
        frame: String,
        detection: DetectionPayload,
    },
    PersonDetected {
        /// Seconds since the Unix epoch.
        timestamp: f64,
        message: String,
    },
}

impl ServerEvent {
    pub fn started(message: impl Into<String>) -> Self {
        ServerEvent::StreamStarted {
            message: message.into(),
        }
    }

    pub fn stopped(message: impl Into<String>) -> Self {
        ServerEvent::StreamStopped {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::StreamError {
            message: message.into(),
        }
    }

    pub fn person_alert() -> Self {
        ServerEvent::PersonDetected {
            timestamp: unix_timestamp(),
            message: PERSON_ALERT_MESSAGE.to_string(),
        }
    }
}

/// Verdict as the dashboard consumes it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionPayload {
    pub detected: bool,
    pub message: Option<String>,
    pub regions: Vec<MotionRegion>,
    /// Frame geometry the regions refer to, for scaling the overlay.
    pub width: u32,
    pub height: u32,
}

impl DetectionPayload {
    pub fn from_verdict(verdict: &Verdict, width: u32, height: u32) -> Self {
        Self {
            detected: verdict.triggered(),
            message: verdict.message().map(str::to_string),
            regions: verdict.regions().to_vec(),
            width,
            height,
        }
    }
}

fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::MESSAGE_PERSON;
    use serde_json::json;

    #[test]
    fn client_commands_parse() {
        let start: ClientCommand = serde_json::from_str(r#"{"type":"start_stream"}"#).unwrap();
        assert_eq!(start, ClientCommand::StartStream);
        let stop: ClientCommand = serde_json::from_str(r#"{"type":"stop_stream"}"#).unwrap();
        assert_eq!(stop, ClientCommand::StopStream);
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"reboot"}"#).is_err());
    }

    #[test]
    fn camera_frame_wire_shape() {
        let verdict = Verdict::Person {
            regions: vec![MotionRegion {
                x: 1,
                y: 2,
                width: 30,
                height: 40,
            }],
            people: vec![],
        };
        let event = ServerEvent::CameraFrame {
            frame: "AAAA".into(),
            detection: DetectionPayload::from_verdict(&verdict, 640, 480),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "camera_frame",
                "frame": "AAAA",
                "detection": {
                    "detected": true,
                    "message": MESSAGE_PERSON,
                    "regions": [{"x": 1, "y": 2, "width": 30, "height": 40}],
                    "width": 640,
                    "height": 480
                }
            })
        );
    }

    #[test]
    fn quiet_frame_has_null_message() {
        let payload = DetectionPayload::from_verdict(&Verdict::NoMotion, 10, 10);
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["detected"], json!(false));
        assert!(value["message"].is_null());
    }

    #[test]
    fn person_alert_carries_timestamp() {
        let value = serde_json::to_value(ServerEvent::person_alert()).unwrap();
        assert_eq!(value["type"], json!("person_detected"));
        assert_eq!(value["message"], json!(PERSON_ALERT_MESSAGE));
        assert!(value["timestamp"].as_f64().unwrap() > 1_600_000_000.0);
    }
}
