//! # gattsim
//!
//! Runs an emulated BLE GATT peripheral and serves its state over HTTP.
//!
//! This binary provides:
//! - The peripheral task on a simulated radio
//! - Periodic value updates and advertising refresh
//! - REST API for values, reads, writes, notifications and devices
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package gattsim-server
//!
//! # With a config file
//! GATTSIM_CONFIG=./gattsim.toml ./gattsim
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use gattsim_core::driver::SimulatedRadio;
use gattsim_core::{
    runtime, PeriodicUpdateScheduler, Peripheral, PeripheralConfig, ScheduledJob, Storage,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use gattsim_server::api::create_router;
use gattsim_server::logging;
use gattsim_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("GATTSIM_ENV").is_ok_and(|v| v == "production");
    logging::init(is_production)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting gattsim");

    let config_path = std::env::var_os("GATTSIM_CONFIG")
        .map(PathBuf::from)
        .or_else(PeripheralConfig::default_path);
    let config = PeripheralConfig::load_or_default(config_path.as_deref())
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    info!(
        service_set = ?config.service_set,
        local_name = %config.local_name,
        "Configuration loaded"
    );

    let storage = match &config.data_dir {
        Some(dir) => Storage::new(dir),
        None => Storage::at_default_location()?,
    };
    let identifier = match config.identifier_override() {
        Some(identifier) => identifier,
        None => {
            let mut rng = StdRng::from_entropy();
            storage.load_or_generate(&mut rng)?
        }
    };
    info!(identifier = %identifier, "Device identifier ready");

    let (driver_tx, driver_rx) = mpsc::unbounded_channel();
    let peripheral = Peripheral::new(
        config.clone(),
        identifier,
        SimulatedRadio::with_event_sink(driver_tx),
    )?;
    let (handle, task) = runtime::spawn(peripheral, driver_rx);

    let ticker = PeriodicUpdateScheduler::spawn(
        ScheduledJob::Tick,
        Duration::from_millis(config.update_period_ms),
        handle.clone(),
    );
    let refresher = PeriodicUpdateScheduler::spawn(
        ScheduledJob::RefreshAdvertising,
        Duration::from_millis(config.advertising_refresh_ms),
        handle.clone(),
    );

    let state = AppState::new(handle.clone());
    let recorder = state.spawn_event_recorder();
    let app = create_router(state);

    let listener = TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    info!("Listening on {}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    ticker.shutdown().await;
    refresher.shutdown().await;
    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "peripheral already stopped");
    }
    drop(handle);
    if let Err(e) = task.await {
        warn!(error = %e, "peripheral task panicked");
    }
    recorder.abort();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
