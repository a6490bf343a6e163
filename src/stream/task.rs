use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::StreamSettings;

use super::events::ServerEvent;
use super::session::StreamSession;

/// Why a streaming task returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamExit {
    /// The camera produced its last frame.
    SourceEnded,
    /// The outbound channel closed: the subscriber is gone.
    SubscriberGone,
    /// Too many consecutive capture failures, or the worker died.
    Failed(String),
}

/// Drive one session until its source ends, its subscriber leaves, or it fails.
///
/// Frames are paced to `settings.target_fps`; capture and detection run on the
/// blocking pool so a slow camera never stalls the runtime. Terminal events
/// (`stream_stopped`, `stream_error`) are sent here, except for an explicit
/// stop, which the connection handler reports after aborting the task.
pub async fn run_stream(
    mut session: StreamSession,
    events: mpsc::Sender<ServerEvent>,
    settings: StreamSettings,
) -> StreamExit {
    let source = session.source_name();
    let mut pacing = time::interval(settings.frame_interval());
    pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut consecutive_errors = 0u32;
    let mut last_alert: Option<Instant> = None;

    loop {
        pacing.tick().await;
        if events.is_closed() {
            log::info!("subscriber left; closing stream {}", source);
            return StreamExit::SubscriberGone;
        }

        let joined = tokio::task::spawn_blocking(move || {
            let step = session.step();
            (session, step)
        })
        .await;
        let step = match joined {
            Ok((returned, step)) => {
                session = returned;
                step
            }
            Err(err) => {
                let message = format!("stream worker for {} failed: {}", source, err);
                log::error!("{}", message);
                let _ = events.send(ServerEvent::error(message.clone())).await;
                return StreamExit::Failed(message);
            }
        };

        match step {
            Ok(Some(packet)) => {
                consecutive_errors = 0;
                let alert = packet.person_confirmed
                    && last_alert
                        .map(|at| at.elapsed() >= settings.alert_cooldown)
                        .unwrap_or(true);
                if events.send(packet.into_event()).await.is_err() {
                    return StreamExit::SubscriberGone;
                }
                if alert {
                    log::info!("person detected on {}", source);
                    last_alert = Some(Instant::now());
                    if events.send(ServerEvent::person_alert()).await.is_err() {
                        return StreamExit::SubscriberGone;
                    }
                }
            }
            Ok(None) => {
                log::info!(
                    "camera stream {} ended after {} frames",
                    source,
                    session.frames_captured()
                );
                let _ = events.send(ServerEvent::stopped("camera stream ended")).await;
                return StreamExit::SourceEnded;
            }
            Err(err) => {
                consecutive_errors += 1;
                log::warn!(
                    "frame capture failed on {} ({}/{}): {:#}",
                    source,
                    consecutive_errors,
                    settings.max_consecutive_errors,
                    err
                );
                if consecutive_errors >= settings.max_consecutive_errors {
                    let message = format!(
                        "camera stream failed after {} consecutive errors: {:#}",
                        consecutive_errors, err
                    );
                    let _ = events.send(ServerEvent::error(message.clone())).await;
                    return StreamExit::Failed(message);
                }
            }
        }
    }
}
