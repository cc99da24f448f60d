use crate::{
    events::{ProgressUpdate, UiEvent},
    model::{Recording, RecordingStatus},
};

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::sync::broadcast;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// How long a completed recording keeps showing 100%.
pub const DEFAULT_COMPLETED_RETENTION: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkProgress {
    chunk_uuid: Uuid,
    total_size: u64,
    loaded_bytes: u64,
}

#[derive(Debug, Clone)]
struct RecordingProgress {
    status: RecordingStatus,
    chunks: Vec<ChunkProgress>,
}

impl RecordingProgress {
    fn percent(&self) -> u8 {
        let total: u64 = self.chunks.iter().map(|c| c.total_size).sum();
        let loaded: u64 = self.chunks.iter().map(|c| c.loaded_bytes).sum();
        percent(loaded, total)
    }
}

/// `round(loaded / total * 100)`, 0 when there is nothing to load.
pub(crate) fn percent(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = (loaded.min(total) as f64 / total as f64) * 100.0;
    ratio.round() as u8
}

/// Derives per-recording upload progress from chunk byte counts and publishes
/// it as [`UiEvent`]s.
#[derive(Clone)]
pub struct ProgressAggregator {
    entries: Arc<Mutex<HashMap<Uuid, RecordingProgress>>>,
    ui: broadcast::Sender<UiEvent>,
    retention: Duration,
}

impl ProgressAggregator {
    /// Create an aggregator publishing on `ui`.
    pub fn new(ui: broadcast::Sender<UiEvent>, retention: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ui,
            retention,
        }
    }

    /// Rebuild the entry for `recording` from its chunks and publish it.
    ///
    /// Sent chunks count as fully loaded; other chunks keep their last
    /// reported partial byte count, or 0.
    #[instrument(skip(self, recording), fields(local_uuid = %recording.local_uuid))]
    pub fn track(&self, recording: &Recording) -> ProgressUpdate {
        let update = {
            let mut entries = self.lock();
            let previous = entries.remove(&recording.local_uuid);

            let chunks = recording
                .chunks
                .iter()
                .map(|chunk| {
                    let partial = previous
                        .as_ref()
                        .and_then(|p| p.chunks.iter().find(|c| c.chunk_uuid == chunk.uuid))
                        .map(|c| c.loaded_bytes)
                        .unwrap_or(0);
                    ChunkProgress {
                        chunk_uuid: chunk.uuid,
                        total_size: chunk.size,
                        loaded_bytes: if chunk.is_sent() {
                            chunk.size
                        } else {
                            partial.min(chunk.size)
                        },
                    }
                })
                .collect();

            let entry = RecordingProgress {
                status: recording.status,
                chunks,
            };
            let update = ProgressUpdate {
                local_uuid: recording.local_uuid,
                status: entry.status,
                progress: entry.percent(),
            };
            entries.insert(recording.local_uuid, entry);
            update
        };

        self.publish(UiEvent::ProgressUpdated(update));
        update
    }

    /// Record a partial byte count for a chunk still in flight.
    ///
    /// Returns `None` if the recording or chunk is not tracked.
    pub fn report_loaded(
        &self,
        local_uuid: Uuid,
        chunk_uuid: Uuid,
        loaded_bytes: u64,
    ) -> Option<ProgressUpdate> {
        let update = {
            let mut entries = self.lock();
            let entry = entries.get_mut(&local_uuid)?;
            let chunk = entry.chunks.iter_mut().find(|c| c.chunk_uuid == chunk_uuid)?;
            chunk.loaded_bytes = loaded_bytes.min(chunk.total_size);
            ProgressUpdate {
                local_uuid,
                status: entry.status,
                progress: entry.percent(),
            }
        };

        self.publish(UiEvent::ProgressUpdated(update));
        Some(update)
    }

    /// Publish the final 100% and drop the entry after the retention delay.
    #[instrument(skip(self, recording), fields(local_uuid = %recording.local_uuid))]
    pub fn complete(&self, recording: &Recording) {
        self.track(recording);

        let aggregator = self.clone();
        let local_uuid = recording.local_uuid;
        tokio::spawn(async move {
            tokio::time::sleep(aggregator.retention).await;
            aggregator.forget(local_uuid);
        });
    }

    /// Drop the entry and publish an empty-state update.
    pub fn forget(&self, local_uuid: Uuid) {
        let removed = self.lock().remove(&local_uuid).is_some();
        if removed {
            debug!(local_uuid = %local_uuid, "Progress entry removed");
            self.publish(UiEvent::ProgressCleared { local_uuid });
        }
    }

    /// Current progress of a tracked recording.
    pub fn progress(&self, local_uuid: Uuid) -> Option<u8> {
        self.lock().get(&local_uuid).map(RecordingProgress::percent)
    }

    fn publish(&self, event: UiEvent) {
        // No subscribers is normal when no UI is attached.
        let _ = self.ui.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, RecordingProgress>> {
        self.entries.lock().unwrap_or_else(|e| {
            error!("Progress lock poisoned, recovering: {}", e);
            e.into_inner()
        })
    }
}
