//! HTTP implementation of the upload server API.

use crate::{AppError, AppResult, config::UploadConfig};

use reelsync_core::{InitUploadRequest, PartProgress, RemoteApi, RemoteError};

use std::panic::Location;

use async_trait::async_trait;
use error_location::ErrorLocation;
use futures::{StreamExt, stream};
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode, header};
use serde::Deserialize;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Slice size for streamed part bodies; progress is reported per slice.
const PART_SLICE_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct InitUploadResponse {
    uuid: Uuid,
}

/// [`RemoteApi`] over the upload server's REST endpoints.
///
/// Requests carry no timeout; a hung call keeps the scheduler's tick guard
/// until the connection fails.
pub struct HttpRemoteApi {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpRemoteApi {
    /// Build a client for `config.server_url`.
    #[track_caller]
    pub fn new(config: &UploadConfig) -> AppResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::HttpClient {
                reason: format!("Failed to build HTTP client: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| RemoteError::Failed {
                reason: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Failed {
                reason: format!("Server returned {}: {}", status, body),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    #[instrument(skip(self, request), fields(title = %request.title))]
    async fn init_upload(&self, request: InitUploadRequest) -> Result<Uuid, RemoteError> {
        let response = self
            .send(self.client.post(self.url("uploads")).json(&request))
            .await?;

        let body: InitUploadResponse =
            response.json().await.map_err(|e| RemoteError::Failed {
                reason: format!("Invalid InitUpload response: {}", e),
            })?;

        debug!(server_uuid = %body.uuid, "InitUpload accepted");
        Ok(body.uuid)
    }

    #[instrument(skip(self, bytes, progress), fields(size = bytes.len()))]
    async fn submit_part(
        &self,
        server_uuid: Uuid,
        bytes: Vec<u8>,
        progress: PartProgress,
    ) -> Result<(), RemoteError> {
        let total = bytes.len();
        let slices: Vec<Vec<u8>> = bytes.chunks(PART_SLICE_BYTES).map(<[u8]>::to_vec).collect();
        let mut sent: u64 = 0;
        let body = stream::iter(slices).map(move |slice| {
            sent += slice.len() as u64;
            progress(sent);
            Ok::<_, std::io::Error>(slice)
        });

        let request = self
            .client
            .post(self.url(&format!("uploads/{}/parts", server_uuid)))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, total)
            .body(Body::wrap_stream(body));
        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn complete_upload(&self, server_uuid: Uuid) -> Result<(), RemoteError> {
        let request = self
            .client
            .post(self.url(&format!("uploads/{}/complete", server_uuid)));
        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_upload(&self, server_uuid: Uuid) -> Result<(), RemoteError> {
        let request = self
            .client
            .delete(self.url(&format!("uploads/{}", server_uuid)));
        self.send(request).await?;
        Ok(())
    }
}
