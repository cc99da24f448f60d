use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One chunk-arrival event from the capture source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkArrival {
    /// Recording the chunk belongs to.
    pub local_uuid: Uuid,
    /// Logical position of the chunk within the recording, starting at 0.
    pub index: u64,
    /// Opaque payload.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// The capture source considers this the final chunk.
    pub is_last: bool,
    /// When the chunk reached this process.
    pub received_at: DateTime<Utc>,
}

impl ChunkArrival {
    /// A chunk received now.
    pub fn new(local_uuid: Uuid, index: u64, bytes: Vec<u8>, is_last: bool) -> Self {
        Self {
            local_uuid,
            index,
            bytes,
            is_last,
            received_at: Utc::now(),
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Combine two last-flagged chunks that raced each other.
    ///
    /// Payloads are concatenated in index order. The result keeps the lower
    /// index and takes the remaining metadata from the higher-index chunk.
    pub fn merge(first: ChunkArrival, second: ChunkArrival) -> ChunkArrival {
        let (lower, higher) = if first.index <= second.index {
            (first, second)
        } else {
            (second, first)
        };

        let mut bytes = lower.bytes;
        bytes.extend_from_slice(&higher.bytes);

        ChunkArrival {
            local_uuid: higher.local_uuid,
            index: lower.index,
            bytes,
            is_last: true,
            received_at: higher.received_at,
        }
    }
}
