//! ReelSync: durable screen-recording ingest with resumable uploads.

mod app;
mod config;
mod error;
mod ingest;
mod logging;
mod remote_client;

pub(crate) use {
    app::App,
    error::{AppError, Result as AppResult},
    remote_client::HttpRemoteApi,
};

use crate::config::Config;

use tracing::{error, info};

/// Application entry point.
fn main() {
    let log_guard = match Config::log_dir().and_then(|dir| logging::init(&dir)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };

    let config = match Config::load().and_then(|c| c.validate().map(|()| c)) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {:?}", e);
            drop(log_guard);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {:?}", e);
            drop(log_guard);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(App { config }.run());
    drop(runtime);

    match result {
        Ok(()) => info!("ReelSync exited cleanly"),
        Err(e) => {
            error!(
                error = ?e,
                disk_failure = e.is_disk_failure(),
                "ReelSync stopped with a fatal error"
            );
            drop(log_guard);
            std::process::exit(1);
        }
    }
}
