use crate::config::{default_last_chunk_hold_ms, default_rotation_bytes};

use serde::{Deserialize, Serialize};

/// Chunk writer tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Segment size at which output rotates to a new file.
    #[serde(default = "default_rotation_bytes")]
    pub rotation_bytes: u64,
    /// How long a last chunk waits for a racing competitor.
    #[serde(default = "default_last_chunk_hold_ms")]
    pub last_chunk_hold_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            rotation_bytes: default_rotation_bytes(),
            last_chunk_hold_ms: default_last_chunk_hold_ms(),
        }
    }
}
