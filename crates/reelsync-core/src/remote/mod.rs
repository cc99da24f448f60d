//! The four remote upload calls.
//!
//! Transport is left to implementors. None of the calls carry a timeout; a
//! stuck call stalls its recording until it errors or the process restarts.

use crate::{RemoteError, model::CropRect};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

/// Metadata sent when opening a server-side upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitUploadRequest {
    /// Recording title.
    pub title: String,
    /// Capture client version.
    pub version: String,
    /// Optional crop rectangle.
    #[serde(rename = "cropData", skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropRect>,
}

/// Receives the running total of part bytes handed to the transport.
pub type PartProgress = Arc<dyn Fn(u64) + Send + Sync>;

/// Remote multipart upload API.
///
/// `init_upload` and `complete_upload` are re-issued after a crash without
/// knowing whether the earlier attempt reached the server.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Open an upload session and return its server id.
    async fn init_upload(&self, request: InitUploadRequest) -> Result<Uuid, RemoteError>;

    /// Append one part to the session, reporting bytes sent through `progress`.
    async fn submit_part(
        &self,
        server_uuid: Uuid,
        bytes: Vec<u8>,
        progress: PartProgress,
    ) -> Result<(), RemoteError>;

    /// Close the session.
    async fn complete_upload(&self, server_uuid: Uuid) -> Result<(), RemoteError>;

    /// Delete the session. Returns [`RemoteError::NotFound`] if it does not exist.
    async fn delete_upload(&self, server_uuid: Uuid) -> Result<(), RemoteError>;
}
