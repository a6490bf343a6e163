//! `/ws/camera` route.
//!
//! Each connection gets at most one streaming task. Everything the client
//! receives goes through a bounded channel drained by a single writer task, so
//! frames, alerts and control replies never interleave mid-message.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{CameraSettings, DetectionSettings, PorchwatchConfig, StreamSettings};
use crate::detect::SharedClassifier;

use super::events::{ClientCommand, ServerEvent};
use super::session::StreamSession;
use super::task::{run_stream, StreamExit};

const OUTBOUND_CAPACITY: usize = 8;

/// Shared by every connection; only the classifier handle is mutable state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    camera: CameraSettings,
    detection: DetectionSettings,
    stream: StreamSettings,
    classifier: SharedClassifier,
}

impl AppState {
    pub fn new(config: &PorchwatchConfig, classifier: SharedClassifier) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                camera: config.camera.clone(),
                detection: config.detection.clone(),
                stream: config.stream.clone(),
                classifier,
            }),
        }
    }

    fn open_session(&self) -> Result<StreamSession> {
        StreamSession::open(
            &self.inner.camera,
            &self.inner.detection,
            self.inner.classifier.clone(),
            self.inner.stream.jpeg_quality,
        )
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/camera", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (events, mut outbound) = mpsc::channel::<ServerEvent>(OUTBOUND_CAPACITY);

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    log::warn!("failed to serialize outbound event: {}", err);
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let mut connection = Connection::new(state, events);
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                if connection.handle_text(&text).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    connection.close();
    drop(connection);
    writer.abort();
    log::debug!("camera websocket closed");
}

/// Per-connection state: IDLE while `stream` is empty or finished, STREAMING
/// while its task runs.
struct Connection {
    state: AppState,
    events: mpsc::Sender<ServerEvent>,
    stream: Option<JoinHandle<StreamExit>>,
}

impl Connection {
    fn new(state: AppState, events: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            state,
            events,
            stream: None,
        }
    }

    /// Handle one text frame from the client. Errors mean the outbound side
    /// is gone and the connection should end.
    async fn handle_text(&mut self, text: &str) -> Result<()> {
        match serde_json::from_str::<ClientCommand>(text) {
            Ok(command) => self.handle(command).await,
            Err(err) => {
                log::debug!("ignoring unrecognised client message: {}", err);
                self.send(ServerEvent::error(format!("unrecognised command: {}", err)))
                    .await
            }
        }
    }

    /// Socket closed: cancel any running stream.
    fn close(&mut self) {
        self.cancel_stream();
    }

    fn is_streaming(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn send(&self, event: ServerEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow!("websocket writer closed"))
    }

    async fn handle(&mut self, command: ClientCommand) -> Result<()> {
        match command {
            ClientCommand::StartStream => self.start().await,
            ClientCommand::StopStream => self.stop().await,
        }
    }

    async fn start(&mut self) -> Result<()> {
        if self.is_streaming() {
            return self.send(ServerEvent::error("stream already running")).await;
        }

        let state = self.state.clone();
        let opened = tokio::task::spawn_blocking(move || state.open_session()).await;
        let session = match opened {
            Ok(Ok(session)) => session,
            Ok(Err(err)) => {
                log::warn!("failed to open camera stream: {:#}", err);
                return self
                    .send(ServerEvent::error(format!("failed to open camera: {:#}", err)))
                    .await;
            }
            Err(err) => {
                log::error!("camera open task failed: {}", err);
                return self
                    .send(ServerEvent::error("failed to open camera"))
                    .await;
            }
        };

        log::info!("stream started: {}", session.source_name());
        self.send(ServerEvent::started("stream started")).await?;
        self.stream = Some(tokio::spawn(run_stream(
            session,
            self.events.clone(),
            self.state.inner.stream.clone(),
        )));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.is_streaming() {
            self.stream = None;
            return self.send(ServerEvent::error("no active stream")).await;
        }
        self.cancel_stream();
        log::info!("stream stopped by client");
        self.send(ServerEvent::stopped("stream stopped")).await
    }

    fn cancel_stream(&mut self) {
        if let Some(handle) = self.stream.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubClassifier;
    use std::time::Duration;

    fn connection(camera_url: &str) -> (Connection, mpsc::Receiver<ServerEvent>) {
        let mut config = PorchwatchConfig {
            addr: "127.0.0.1:0".to_string(),
            camera: CameraSettings::default(),
            detection: DetectionSettings::default(),
            stream: StreamSettings::default(),
        };
        config.camera.url = camera_url.to_string();
        config.stream.target_fps = 20;
        let state = AppState::new(&config, SharedClassifier::new(StubClassifier::new()));
        // Roomy enough that frames never block control replies during a test.
        let (events, outbound) = mpsc::channel(1024);
        (Connection::new(state, events), outbound)
    }

    /// Next event that is not a frame or an alert.
    async fn next_control(outbound: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), outbound.recv())
                .await
                .expect("control event in time")
                .expect("channel open");
            match event {
                ServerEvent::CameraFrame { .. } | ServerEvent::PersonDetected { .. } => continue,
                other => return other,
            }
        }
    }

    /// Drops the connection and waits for every sender to go away, which only
    /// happens once the streaming task is gone.
    async fn assert_stream_released(connection: Connection, mut outbound: mpsc::Receiver<ServerEvent>) {
        drop(connection);
        tokio::time::timeout(Duration::from_secs(5), async {
            while outbound.recv().await.is_some() {}
        })
        .await
        .expect("streaming task released its sender");
    }

    #[tokio::test]
    async fn start_streams_frames() -> Result<()> {
        let (mut conn, mut outbound) = connection("stub://door");
        conn.handle_text(r#"{"type":"start_stream"}"#).await?;
        assert!(matches!(
            outbound.recv().await,
            Some(ServerEvent::StreamStarted { .. })
        ));
        assert!(matches!(
            outbound.recv().await,
            Some(ServerEvent::CameraFrame { .. })
        ));
        assert!(conn.is_streaming());
        Ok(())
    }

    #[tokio::test]
    async fn second_start_is_rejected() -> Result<()> {
        let (mut conn, mut outbound) = connection("stub://door");
        conn.handle_text(r#"{"type":"start_stream"}"#).await?;
        assert!(matches!(
            next_control(&mut outbound).await,
            ServerEvent::StreamStarted { .. }
        ));

        conn.handle_text(r#"{"type":"start_stream"}"#).await?;
        assert_eq!(
            next_control(&mut outbound).await,
            ServerEvent::error("stream already running")
        );
        assert!(conn.is_streaming());
        Ok(())
    }

    #[tokio::test]
    async fn stop_aborts_the_stream() -> Result<()> {
        let (mut conn, mut outbound) = connection("stub://door");
        conn.handle_text(r#"{"type":"start_stream"}"#).await?;
        next_control(&mut outbound).await;

        conn.handle_text(r#"{"type":"stop_stream"}"#).await?;
        assert_eq!(
            next_control(&mut outbound).await,
            ServerEvent::stopped("stream stopped")
        );
        assert!(!conn.is_streaming());
        assert_stream_released(conn, outbound).await;
        Ok(())
    }

    #[tokio::test]
    async fn stop_while_idle_is_an_error() -> Result<()> {
        let (mut conn, mut outbound) = connection("stub://door");
        conn.handle_text(r#"{"type":"stop_stream"}"#).await?;
        assert_eq!(
            next_control(&mut outbound).await,
            ServerEvent::error("no active stream")
        );
        Ok(())
    }

    #[tokio::test]
    async fn malformed_message_is_answered_with_error() -> Result<()> {
        let (mut conn, mut outbound) = connection("stub://door");
        conn.handle_text("{ not json").await?;
        conn.handle_text(r#"{"type":"reboot"}"#).await?;
        for _ in 0..2 {
            match next_control(&mut outbound).await {
                ServerEvent::StreamError { message } => {
                    assert!(message.starts_with("unrecognised command"), "{}", message)
                }
                other => panic!("expected stream_error, got {:?}", other),
            }
        }
        assert!(!conn.is_streaming());
        Ok(())
    }

    #[tokio::test]
    async fn unopenable_camera_reports_error_and_stays_idle() -> Result<()> {
        let (mut conn, mut outbound) = connection("gopher://door");
        conn.handle_text(r#"{"type":"start_stream"}"#).await?;
        match next_control(&mut outbound).await {
            ServerEvent::StreamError { message } => {
                assert!(message.starts_with("failed to open camera"), "{}", message)
            }
            other => panic!("expected stream_error, got {:?}", other),
        }
        assert!(!conn.is_streaming());
        Ok(())
    }

    #[tokio::test]
    async fn close_cancels_the_stream() -> Result<()> {
        let (mut conn, mut outbound) = connection("stub://door");
        conn.handle_text(r#"{"type":"start_stream"}"#).await?;
        next_control(&mut outbound).await;
        assert!(conn.is_streaming());

        conn.close();
        assert!(!conn.is_streaming());
        assert_stream_released(conn, outbound).await;
        Ok(())
    }

    #[tokio::test]
    async fn restart_after_stop() -> Result<()> {
        let (mut conn, mut outbound) = connection("stub://door");
        conn.handle_text(r#"{"type":"start_stream"}"#).await?;
        next_control(&mut outbound).await;
        conn.handle_text(r#"{"type":"stop_stream"}"#).await?;
        next_control(&mut outbound).await;

        conn.handle_text(r#"{"type":"start_stream"}"#).await?;
        assert_eq!(
            next_control(&mut outbound).await,
            ServerEvent::started("stream started")
        );
        Ok(())
    }
}
