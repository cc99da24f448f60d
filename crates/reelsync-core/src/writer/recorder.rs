use crate::{
    CoreError, CoreResult, RecordStore,
    events::UiEvent,
    model::Chunk,
    progress::ProgressAggregator,
    writer::WriterEvent,
};

use std::{panic::Location, sync::Arc};

use error_location::ErrorLocation;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{info, instrument, warn};

/// Applies [`WriterEvent`]s to the [`RecordStore`] and forwards them to the UI.
pub struct ChunkRecorder {
    store: Arc<RecordStore>,
    progress: ProgressAggregator,
    ui: broadcast::Sender<UiEvent>,
}

impl ChunkRecorder {
    /// Create a recorder writing into `store`.
    pub fn new(
        store: Arc<RecordStore>,
        progress: ProgressAggregator,
        ui: broadcast::Sender<UiEvent>,
    ) -> Self {
        Self {
            store,
            progress,
            ui,
        }
    }

    /// Apply one writer event and return the UI event it produced.
    ///
    /// # Errors
    ///
    /// A `WriteFailed` event becomes [`CoreError::WriteFailed`]; an event for an
    /// unknown recording becomes [`CoreError::RecordingNotFound`].
    #[track_caller]
    #[instrument(skip(self))]
    pub fn apply(&self, event: WriterEvent) -> CoreResult<UiEvent> {
        match event {
            WriterEvent::ChunkFinalized {
                local_uuid,
                path,
                size,
                sequence,
                is_last,
            } => {
                let chunk = Chunk::recorded(local_uuid, path.clone(), size, is_last);
                let recording = self.store.add_chunk(chunk)?;
                self.progress.track(&recording);

                Ok(UiEvent::ChunkFinalized {
                    local_uuid,
                    path,
                    size,
                    sequence,
                })
            }
            WriterEvent::RecordingStopped {
                local_uuid,
                segment_count,
            } => {
                if let Some(chunk_uuid) = self.store.mark_last_chunk(local_uuid)? {
                    warn!(
                        local_uuid = %local_uuid,
                        chunk_uuid = %chunk_uuid,
                        "Final segment was empty, flagged previous chunk as last"
                    );
                }

                let open_automatically =
                    self.store.last_created_recording_id() == Some(local_uuid);

                info!(
                    local_uuid = %local_uuid,
                    segment_count,
                    open_automatically,
                    "Recording ready"
                );

                Ok(UiEvent::RecordingStopped {
                    local_uuid,
                    open_automatically,
                })
            }
            WriterEvent::WriteFailed { local_uuid, reason } => Err(CoreError::WriteFailed {
                local_uuid,
                reason,
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }

    /// Consume writer events until the channel closes or shutdown is signalled.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<WriterEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> CoreResult<()> {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    // Segments already on disk must still reach the store.
                    while let Ok(event) = events.try_recv() {
                        let ui_event = self.apply(event)?;
                        let _ = self.ui.send(ui_event);
                    }
                    info!("Chunk recorder shutting down");
                    break;
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        info!("Writer event channel closed");
                        break;
                    };
                    let ui_event = self.apply(event)?;
                    let _ = self.ui.send(ui_event);
                }
            }
        }

        Ok(())
    }
}
