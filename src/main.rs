use std::sync::Arc;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use irrigation_telemetry::{
    api::{self, AppState},
    config::Config,
    control::ControlDispatcher,
    device::{DeviceApi, DeviceClient},
    history::HistoryService,
    models::{ControlState, TelemetrySnapshot},
    sensors::Poller,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent; env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    info!(device = %config.device_base_url, "Using irrigation controller");

    let device: Arc<dyn DeviceApi> = Arc::new(DeviceClient::new(&config)?);

    // Seed the control state from the controller; an unreachable device
    // at startup is not fatal.
    let control = ControlDispatcher::new(device.clone(), ControlState::default());
    if let Err(e) = control.refresh().await {
        warn!(error = %e, "Could not read initial control state; assuming defaults");
    }

    let history = HistoryService::new(device.clone());
    if let Err(e) = history.refresh().await {
        warn!(error = %e, "Initial history fetch failed");
    }

    let mut poller = Poller::new(device.clone());
    poller.start(config.poll_interval).await?;

    let state = AppState {
        telemetry: poller.view(),
        control,
        history,
        device,
        fallback: Arc::new(TelemetrySnapshot::empty()),
    };

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poller.stop().await;
    info!("Telemetry polling stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
