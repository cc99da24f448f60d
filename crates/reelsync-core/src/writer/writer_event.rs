use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

/// Events published by the chunk writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WriterEvent {
    /// A segment file was closed and synced.
    ChunkFinalized {
        /// Owning recording.
        local_uuid: Uuid,
        /// Segment file path.
        path: PathBuf,
        /// Bytes in the segment file.
        size: u64,
        /// Position of the segment within the recording, starting at 0.
        sequence: u32,
        /// This segment closes the recording.
        is_last: bool,
    },
    /// The last chunk was written and the recording's writer state discarded.
    RecordingStopped {
        /// Owning recording.
        local_uuid: Uuid,
        /// Segments produced for the recording.
        segment_count: u32,
    },
    /// Writing failed; the on-disk state of the recording is unknown.
    WriteFailed {
        /// Owning recording.
        local_uuid: Uuid,
        /// Description of the failure.
        reason: String,
    },
}
