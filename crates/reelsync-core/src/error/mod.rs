use std::{panic::Location, path::PathBuf};

use error_location::ErrorLocation;
use thiserror::Error;
use uuid::Uuid;

/// Recording pipeline errors with source location tracking.
///
/// Every variant here is terminal for the pipeline: local I/O and persistence
/// failures leave the disk in an unknown state, and a missing recording or
/// chunk means the store and its caller have diverged. Recoverable remote
/// failures are modelled separately by [`RemoteError`].
#[derive(Error, Debug)]
pub enum CoreError {
    /// Local filesystem operation failed.
    #[error("IO error on {path:?}: {source} {location}")]
    Io {
        /// Path the operation was acting on.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Store file could not be serialized or parsed.
    #[error("Persistence error: {reason} {location}")]
    Persistence {
        /// Description of the failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// No recording exists for the given local id.
    #[error("Recording not found: {local_uuid} {location}")]
    RecordingNotFound {
        /// Local id that was looked up.
        local_uuid: Uuid,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// No chunk with the given id exists on the recording.
    #[error("Chunk {chunk_uuid} not found on recording {local_uuid} {location}")]
    ChunkNotFound {
        /// Owning recording.
        local_uuid: Uuid,
        /// Chunk id that was looked up.
        chunk_uuid: Uuid,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The chunk writer failed in a background task.
    #[error("Writing recording {local_uuid} failed: {reason} {location}")]
    WriteFailed {
        /// Recording being written.
        local_uuid: Uuid,
        /// Description of the failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A recording is in a state its own fields contradict.
    #[error("Recording {local_uuid} in invalid state: {reason} {location}")]
    InvalidState {
        /// Offending recording.
        local_uuid: Uuid,
        /// What is inconsistent.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The consumer side of an event channel has gone away.
    #[error("Channel closed: {message} {location}")]
    ChannelClosed {
        /// Human-readable error message.
        message: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },
}

impl CoreError {
    /// Wrap an IO error for `path`, recording the caller's location.
    #[track_caller]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Build a [`CoreError::RecordingNotFound`] at the caller's location.
    #[track_caller]
    pub fn recording_not_found(local_uuid: Uuid) -> Self {
        CoreError::RecordingNotFound {
            local_uuid,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// True for local disk and store-file failures, false for invariant
    /// violations. Both end the process; this only changes how it is reported.
    pub fn is_disk_failure(&self) -> bool {
        matches!(
            self,
            CoreError::Io { .. } | CoreError::Persistence { .. } | CoreError::WriteFailed { .. }
        )
    }
}

// Manual From<serde_json::Error> with location tracking.
impl From<serde_json::Error> for CoreError {
    #[track_caller]
    fn from(source: serde_json::Error) -> Self {
        CoreError::Persistence {
            reason: source.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

/// Failure of one of the remote upload calls.
///
/// These are retried by the schedulers on their next pass and never abort the
/// process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The server has no upload with that id.
    #[error("Upload not found on server")]
    NotFound,

    /// Transport or server error.
    #[error("Remote call failed: {reason}")]
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
