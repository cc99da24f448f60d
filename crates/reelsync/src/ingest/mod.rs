//! Local HTTP surface for the capture source and the UI.

mod events_socket;
mod routes;
mod state;

pub(crate) use {routes::router, state::IngestState};

use crate::{AppError, AppResult};

use std::{net::SocketAddr, panic::Location};

use error_location::ErrorLocation;
use tokio::{net::TcpListener, sync::watch};
use tracing::info;

/// Serve the ingest API on `127.0.0.1:{port}` until shutdown.
pub(crate) async fn serve(
    state: IngestState,
    port: u16,
    mut shutdown_rx: watch::Receiver<bool>,
) -> AppResult<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::ServerError {
            reason: format!("Failed to bind {}: {}", addr, e),
            location: ErrorLocation::from(Location::caller()),
        })?;

    info!(%addr, "Ingest server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await
        .map_err(|e| AppError::ServerError {
            reason: format!("Server stopped: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

    info!("Ingest server stopped");
    Ok(())
}
