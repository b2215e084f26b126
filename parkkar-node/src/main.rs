//! ParkKar detection node: launches per-lot detectors on request and
//! serves   /detect/{id}  → start a background count relay
//!           /stream/{id}  → multipart/x-mixed-replace MJPEG
//!           /parking-lots, /health, /

mod config;
mod lots;
mod routes;

use anyhow::Context;
use clap::Parser;
use config::Cli;
use log::{info, warn};
use parkkar_bridge::{JobPool, Launcher};
use parkkar_notify::HttpNotifier;
use routes::AppState;
use std::{future::IntoFuture, sync::Arc, time::Duration};
use tokio::sync::oneshot;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let launcher = Launcher::new(cli.launcher_config()?, cli.runtime());
    let lots = cli.lot_registry()?;
    let notifier = HttpNotifier::new(&cli.notifier_url, cli.notifier_timeout())
        .context("Failed to build slot update client")?;

    info!(
        "{} lots, runtime {:?}, interpreter {:?}, notifying {}",
        lots.len(),
        launcher.runtime(),
        launcher.interpreter(),
        notifier.endpoint()
    );

    let state = AppState {
        launcher: Arc::new(launcher),
        lots: Arc::new(lots),
        notifier: Arc::new(notifier),
        pool: Arc::new(JobPool::new()),
        bridge: cli.bridge_config(),
    };
    let pool = state.pool.clone();

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cli.bind))?;
    info!("listening on {}", cli.bind);

    // open MJPEG streams never end on their own, so draining is bounded
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, routes::router(state)).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(());
    });
    tokio::select! {
        served = server.into_future() => served?,
        _ = async {
            if stop_rx.await.is_ok() {
                tokio::time::sleep(DRAIN_TIMEOUT).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => warn!("connections still open after {DRAIN_TIMEOUT:?}, dropping them"),
    }

    let aborted = pool.abort_all();
    info!("shut down, aborted {aborted} running detections");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Ctrl-C handler failed: {err}");
    }
}
