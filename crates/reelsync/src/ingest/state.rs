use reelsync_core::{ChunkWriter, CoreError, RecordStore, UiEvent};

use std::{path::PathBuf, sync::Arc};

use tokio::sync::{broadcast, mpsc, watch};
use tracing::error;

/// Shared handles for the ingest handlers.
#[derive(Clone)]
pub(crate) struct IngestState {
    pub(crate) store: Arc<RecordStore>,
    pub(crate) writer: ChunkWriter,
    pub(crate) ui: broadcast::Sender<UiEvent>,
    pub(crate) records_root: PathBuf,
    pub(crate) fatal_tx: mpsc::Sender<CoreError>,
    pub(crate) shutdown_rx: watch::Receiver<bool>,
}

impl IngestState {
    /// Hand a disk failure to the process so it can shut down.
    pub(crate) fn report_fatal(&self, e: CoreError) {
        error!(error = ?e, "Fatal error while handling request");
        if self.fatal_tx.try_send(e).is_err() {
            error!("Fatal error channel full or closed");
        }
    }
}
