//! One-shot export of the controller's history log to `irrigation_history.csv`.
//!
//! Usage:
//!   cargo run --bin export_history
//!   cargo run --bin export_history -- --type sensor --date 2025-01-01 --output ./out
//!
//! `DEVICE_BASE_URL` and `REQUEST_TIMEOUT_MS` are read as for the server;
//! `--output` defaults to `EXPORT_DIR`.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use irrigation_telemetry::{
    config::Config,
    device::DeviceClient,
    history::{FilterCriteria, HistoryService, TypeFilter},
};

#[derive(Debug, Parser)]
#[command(name = "export_history", about = "Export controller history to CSV", long_about = None)]
struct Cli {
    /// Record type: all, sensor, control or sms_alert
    #[arg(long = "type", value_name = "TYPE", default_value = "all")]
    record_type: TypeFilter,

    /// Timestamp prefix, e.g. 2025-01-01
    #[arg(long, value_name = "PREFIX")]
    date: Option<String>,

    /// Directory receiving the CSV file
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let criteria = FilterCriteria::new(cli.record_type, cli.date.as_deref());
    let dir = cli.output.unwrap_or_else(|| config.export_dir.clone());

    let history = HistoryService::new(Arc::new(DeviceClient::new(&config)?));
    history
        .refresh()
        .await
        .context("Failed to fetch history from controller")?;

    let path = history.export_file(dir, &criteria).await?;
    eprintln!("History written to {}", path.display());
    Ok(())
}
