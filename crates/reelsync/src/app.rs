use crate::{
    AppError, AppResult, HttpRemoteApi,
    config::Config,
    ingest::{self, IngestState},
};

use reelsync_core::{
    ChunkRecorder, ChunkWriter, CleanupScheduler, CoreError, ProgressAggregator, RecordStore,
    RemoteApi, UploadScheduler,
};

use std::{panic::Location, sync::Arc, time::Duration};

use chrono::Utc;
use error_location::ErrorLocation;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinSet,
};
use tracing::{error, info, instrument, warn};

const UI_EVENT_CAPACITY: usize = 256;
const WRITER_EVENT_CAPACITY: usize = 64;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Main application state.
///
/// Owns the configuration and wires the core components to the ingest
/// server and the upload server client.
pub struct App {
    pub(crate) config: Config,
}

impl App {
    /// Run until Ctrl-C or the first fatal error.
    #[instrument(skip(self))]
    pub(crate) async fn run(self) -> AppResult<()> {
        info!("ReelSync starting");

        let config = self.config;
        let store = Arc::new(RecordStore::open(&config.storage.store_path)?);
        let (ui_tx, _) = broadcast::channel(UI_EVENT_CAPACITY);
        let progress = ProgressAggregator::new(ui_tx.clone(), config.progress_retention());
        let remote: Arc<dyn RemoteApi> = Arc::new(HttpRemoteApi::new(&config.upload)?);

        let (writer_tx, writer_rx) = mpsc::channel(WRITER_EVENT_CAPACITY);
        let writer = ChunkWriter::new(config.writer_settings(), writer_tx);

        let cleanup = CleanupScheduler::new(
            Arc::clone(&store),
            Arc::clone(&remote),
            progress.clone(),
            writer.clone(),
            config.cleanup_settings(),
        );
        cleanup.recover()?;
        cleanup.sweep(Utc::now()).await?;

        let recorder = ChunkRecorder::new(Arc::clone(&store), progress.clone(), ui_tx.clone());
        let upload = UploadScheduler::new(Arc::clone(&store), remote, progress);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<CoreError>(4);

        let ingest_state = IngestState {
            store,
            writer,
            ui: ui_tx,
            records_root: config.storage.records_root.clone(),
            fatal_tx,
            shutdown_rx: shutdown_rx.clone(),
        };

        let mut tasks: JoinSet<AppResult<()>> = JoinSet::new();
        {
            let shutdown_rx = shutdown_rx.clone();
            let interval = config.poll_interval();
            tasks.spawn(async move { Ok(upload.run(interval, shutdown_rx).await?) });
        }
        {
            let shutdown_rx = shutdown_rx.clone();
            tasks.spawn(async move { Ok(cleanup.run(shutdown_rx).await?) });
        }
        {
            let shutdown_rx = shutdown_rx.clone();
            tasks.spawn(async move { Ok(recorder.run(writer_rx, shutdown_rx).await?) });
        }
        tasks.spawn(ingest::serve(ingest_state, config.server.port, shutdown_rx));

        let outcome = loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        error!(error = ?e, "Failed to listen for Ctrl-C");
                    }
                    info!("Shutdown requested");
                    break Ok(());
                }

                Some(e) = fatal_rx.recv() => {
                    error!(error = ?e, "Fatal error reported by ingest server");
                    break Err(AppError::from(e));
                }

                Some(joined) = tasks.join_next() => {
                    match flatten(joined) {
                        Ok(()) => warn!("Background task exited before shutdown"),
                        Err(e) => {
                            error!(error = ?e, "Background task failed");
                            break Err(e);
                        }
                    }
                }
            }
        };

        let _ = shutdown_tx.send(true);

        let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = flatten(joined) {
                    error!(error = ?e, "Task failed during shutdown");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!("Tasks did not stop within timeout, aborting");
            tasks.abort_all();
        }

        info!(clean = outcome.is_ok(), "ReelSync shut down");
        outcome
    }
}

#[track_caller]
fn flatten(joined: Result<AppResult<()>, tokio::task::JoinError>) -> AppResult<()> {
    joined.map_err(|e| AppError::TaskFailed {
        reason: e.to_string(),
        location: ErrorLocation::from(Location::caller()),
    })?
}
