//! porchwatchd - doorbell camera watcher daemon
//!
//! This daemon:
//! 1. Loads configuration (`PORCHWATCH_CONFIG` file, then env overrides)
//! 2. Loads and warms up the person classifier once; failure aborts startup
//! 3. Serves `/ws/camera`, starting one streaming task per subscriber
//! 4. Shuts down cleanly on Ctrl-C

use anyhow::{Context, Result};

use porchwatch::stream::{router, AppState};
use porchwatch::{build_classifier, PorchwatchConfig};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = PorchwatchConfig::load()?;
    log::info!(
        "camera {} at {} fps, streaming at {} fps",
        config.camera.url,
        config.camera.capture_fps,
        config.stream.target_fps
    );

    let classifier = build_classifier(&config.detection).context("load person classifier")?;
    let app = router(AppState::new(&config, classifier));

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    log::info!("porchwatchd listening on ws://{}/ws/camera", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve websocket api")?;

    log::info!("porchwatchd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to install Ctrl-C handler: {}", err);
        std::future::pending::<()>().await;
    }
    log::info!("shutdown requested");
}
