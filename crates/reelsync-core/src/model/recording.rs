use crate::model::Chunk;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-side lifecycle of a recording.
///
/// `Canceled` can be entered from every state except `CompletedOnServer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordingStatus {
    /// Nothing sent yet.
    Pending,
    /// `InitUpload` issued.
    CreatingOnServer,
    /// The server upload session exists.
    CreatedOnServer,
    /// Every chunk is on the server and the last one has been seen.
    Complete,
    /// `CompleteUpload` issued.
    CompletingOnServer,
    /// Terminal success.
    CompletedOnServer,
    /// Abandoned by the user.
    Canceled {
        /// When the cancel was requested.
        at: DateTime<Utc>,
    },
}

impl RecordingStatus {
    /// True for `CompletedOnServer` and `Canceled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordingStatus::CompletedOnServer | RecordingStatus::Canceled { .. }
        )
    }

    /// True for `Canceled`.
    pub fn is_canceled(&self) -> bool {
        matches!(self, RecordingStatus::Canceled { .. })
    }
}

/// Scheduler-facing upload status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    /// Picked up, no call made yet.
    Pending,
    /// A remote call is in flight.
    Uploading,
    /// `CompleteUpload` succeeded.
    Completed,
    /// The last remote call failed and will be retried.
    Failed,
}

/// Upload sub-state, absent until the scheduler first sees the recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadState {
    /// Current upload status.
    pub status: UploadStatus,
}

/// Optional crop applied to the capture area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Parameters for creating a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecording {
    /// Display title sent with `InitUpload`.
    pub title: String,
    /// Capture client version sent with `InitUpload`.
    pub version: String,
    /// Optional crop rectangle.
    pub crop: Option<CropRect>,
    /// Root under which the recording gets its own `<local_uuid>` directory.
    pub records_root: PathBuf,
}

/// The aggregate of all chunks belonging to one capture session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    /// Immutable local identity.
    pub local_uuid: Uuid,
    /// Remote upload id, set once `InitUpload` returns.
    pub server_uuid: Option<Uuid>,
    /// Lifecycle state.
    pub status: RecordingStatus,
    /// Display title.
    pub title: String,
    /// Capture client version.
    pub version: String,
    /// Local storage root for this recording's files.
    pub directory_path: PathBuf,
    /// Optional crop rectangle.
    pub crop: Option<CropRect>,
    /// Chunks in insertion order, which is also upload and byte order.
    pub chunks: Vec<Chunk>,
    /// Upload sub-state.
    pub upload: Option<UploadState>,
    /// Creation time, used to pick the priority recording.
    pub created_at: DateTime<Utc>,
}

impl Recording {
    /// Build a `Pending` recording with a fresh local id.
    pub fn new(params: NewRecording) -> Self {
        let local_uuid = Uuid::new_v4();
        Self {
            local_uuid,
            server_uuid: None,
            status: RecordingStatus::Pending,
            title: params.title,
            version: params.version,
            directory_path: params.records_root.join(local_uuid.to_string()),
            crop: params.crop,
            chunks: Vec::new(),
            upload: None,
            created_at: Utc::now(),
        }
    }

    /// Look up a chunk by id.
    pub fn chunk(&self, chunk_uuid: Uuid) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.uuid == chunk_uuid)
    }

    /// Mutable chunk lookup.
    pub fn chunk_mut(&mut self, chunk_uuid: Uuid) -> Option<&mut Chunk> {
        self.chunks.iter_mut().find(|c| c.uuid == chunk_uuid)
    }

    /// True if any chunk carries the last flag.
    pub fn has_last_chunk(&self) -> bool {
        self.chunks.iter().any(|c| c.is_last)
    }

    /// The `Complete` precondition: at least one last chunk and every chunk sent.
    pub fn is_ready_to_complete(&self) -> bool {
        self.has_last_chunk() && self.chunks.iter().all(Chunk::is_sent)
    }

    /// Set the upload sub-state status, creating it if absent.
    pub fn set_upload_status(&mut self, status: UploadStatus) {
        self.upload = Some(UploadState { status });
    }

    /// Cancel time, if canceled.
    pub fn canceled_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            RecordingStatus::Canceled { at } => Some(at),
            _ => None,
        }
    }
}
