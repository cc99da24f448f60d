use crate::model::RecordingStatus;

use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

/// Progress snapshot for one recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    /// Recording the progress belongs to.
    pub local_uuid: Uuid,
    /// Recording status at the time of the update.
    pub status: RecordingStatus,
    /// Uploaded share of all chunk bytes, 0 to 100.
    pub progress: u8,
}

/// Events published to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// A segment was persisted and recorded.
    ChunkFinalized {
        /// Owning recording.
        local_uuid: Uuid,
        /// Segment file path.
        path: PathBuf,
        /// Segment size in bytes.
        size: u64,
        /// Segment position within the recording.
        sequence: u32,
    },
    /// Capture for the recording is finished.
    RecordingStopped {
        /// Finished recording.
        local_uuid: Uuid,
        /// Surface the recording immediately instead of through a notification.
        open_automatically: bool,
    },
    /// Upload progress changed.
    ProgressUpdated(ProgressUpdate),
    /// The recording no longer has a progress entry.
    ProgressCleared {
        /// Recording whose entry was removed.
        local_uuid: Uuid,
    },
}
