use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upload state of a single persisted segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStatus {
    /// Bytes are on disk, not yet sent.
    Recorded,
    /// A part upload is in flight.
    SendingToServer,
    /// The server acknowledged the part.
    SentToServer,
}

/// One persisted, ordered byte range of a recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk id.
    pub uuid: Uuid,
    /// Owning recording.
    pub local_uuid: Uuid,
    /// Segment file holding the bytes.
    pub source: PathBuf,
    /// Size of the segment file in bytes.
    pub size: u64,
    /// When the segment was finalized.
    pub created_at: DateTime<Utc>,
    /// Upload state.
    pub status: ChunkStatus,
    /// Closes the recording.
    pub is_last: bool,
}

impl Chunk {
    /// A freshly recorded chunk.
    pub fn recorded(local_uuid: Uuid, source: PathBuf, size: u64, is_last: bool) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            local_uuid,
            source,
            size,
            created_at: Utc::now(),
            status: ChunkStatus::Recorded,
            is_last,
        }
    }

    /// True once the server holds this chunk.
    pub fn is_sent(&self) -> bool {
        self.status == ChunkStatus::SentToServer
    }
}
