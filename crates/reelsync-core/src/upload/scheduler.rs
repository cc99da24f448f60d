//! Polling upload driver.
//!
//! Each tick picks the priority recording and moves it forward by exactly one
//! stage: create the upload sub-state, open the server session, send one
//! chunk, or close the session. Failed remote calls leave the recording where
//! a later tick retries the same stage. There is no backoff beyond the poll
//! interval.

use crate::{
    CoreError, CoreResult, RecordStore,
    model::{ChunkStatus, Recording, RecordingStatus, UploadStatus},
    progress::ProgressAggregator,
    remote::{InitUploadRequest, PartProgress, RemoteApi},
    upload::tick_guard::TickGuard,
};

use std::{
    panic::Location,
    sync::{Arc, atomic::AtomicBool},
    time::Duration,
};

use error_location::ErrorLocation;
use tokio::{
    sync::{mpsc, watch},
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Default time between ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still running.
    Skipped,
    /// Nothing to do.
    Idle,
    /// The recording was examined and possibly moved forward.
    Advanced {
        /// Recording the tick worked on.
        local_uuid: Uuid,
    },
}

/// Drives one recording at a time through init, part upload and complete.
#[derive(Clone)]
pub struct UploadScheduler {
    store: Arc<RecordStore>,
    remote: Arc<dyn RemoteApi>,
    progress: ProgressAggregator,
    ticking: Arc<AtomicBool>,
}

impl UploadScheduler {
    /// Create a scheduler over `store` talking to `remote`.
    pub fn new(
        store: Arc<RecordStore>,
        remote: Arc<dyn RemoteApi>,
        progress: ProgressAggregator,
    ) -> Self {
        Self {
            store,
            remote,
            progress,
            ticking: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Tick every `interval` until shutdown.
    ///
    /// Ticks are spawned so a slow remote call does not delay the timer; a
    /// tick that fires while the previous one is still running is skipped.
    ///
    /// # Errors
    ///
    /// Returns the first [`CoreError`] raised by a tick. Remote failures are
    /// not errors here.
    pub async fn run(
        self,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> CoreResult<()> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let (failure_tx, mut failure_rx) = mpsc::channel::<CoreError>(1);

        info!(interval_ms = interval.as_millis(), "Upload scheduler started");

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Upload scheduler shutting down");
                    break;
                }

                Some(e) = failure_rx.recv() => {
                    return Err(e);
                }

                _ = ticker.tick() => {
                    let scheduler = self.clone();
                    let failure_tx = failure_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = scheduler.tick().await {
                            error!(error = ?e, "Upload tick failed");
                            let _ = failure_tx.send(e).await;
                        }
                    });
                }
            }
        }

        Ok(())
    }

    /// Run one tick.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> CoreResult<TickOutcome> {
        let Some(_guard) = TickGuard::acquire(&self.ticking) else {
            debug!("Previous tick still running, skipping");
            return Ok(TickOutcome::Skipped);
        };

        let Some(recording) = self.store.priority_recording() else {
            return Ok(TickOutcome::Idle);
        };
        let local_uuid = recording.local_uuid;

        if recording.upload.is_none() {
            self.store.modify_recording(local_uuid, |r| {
                r.set_upload_status(UploadStatus::Pending);
            })?;
            info!(local_uuid = %local_uuid, "Upload state created");
            return Ok(TickOutcome::Advanced { local_uuid });
        }

        match recording.status {
            RecordingStatus::Pending | RecordingStatus::CreatingOnServer
                if recording.chunks.is_empty() =>
            {
                debug!(local_uuid = %local_uuid, "Waiting for first chunk");
                return Ok(TickOutcome::Idle);
            }
            RecordingStatus::Pending | RecordingStatus::CreatingOnServer => {
                self.init_upload(&recording).await?;
            }
            RecordingStatus::CreatedOnServer => {
                self.upload_next_chunk(&recording).await?;
                self.check_completion(local_uuid)?;
            }
            RecordingStatus::Complete => {
                self.complete_upload(&recording).await?;
            }
            RecordingStatus::CompletingOnServer
            | RecordingStatus::CompletedOnServer
            | RecordingStatus::Canceled { .. } => {
                return Ok(TickOutcome::Idle);
            }
        }

        Ok(TickOutcome::Advanced { local_uuid })
    }

    async fn init_upload(&self, recording: &Recording) -> CoreResult<()> {
        let local_uuid = recording.local_uuid;

        let started = self.store.modify_recording(local_uuid, |r| {
            if !r.status.is_canceled() {
                r.status = RecordingStatus::CreatingOnServer;
                r.set_upload_status(UploadStatus::Uploading);
            }
        })?;
        if started.status.is_canceled() {
            return Ok(());
        }

        info!(local_uuid = %local_uuid, "Opening upload on server");

        let result = self
            .remote
            .init_upload(InitUploadRequest {
                title: recording.title.clone(),
                version: recording.version.clone(),
                crop: recording.crop,
            })
            .await;

        if self.store.find_recording(local_uuid).is_none() {
            warn!(local_uuid = %local_uuid, "Recording removed while InitUpload was in flight");
            return Ok(());
        }

        match result {
            Ok(server_uuid) => {
                // The server id is kept even for a canceled recording so
                // cleanup can delete the session.
                let updated = self.store.modify_recording(local_uuid, |r| {
                    r.server_uuid = Some(server_uuid);
                    if !r.status.is_canceled() {
                        r.status = RecordingStatus::CreatedOnServer;
                    }
                })?;
                info!(
                    local_uuid = %local_uuid,
                    server_uuid = %server_uuid,
                    status = ?updated.status,
                    "Upload opened on server"
                );
            }
            Err(e) => {
                warn!(local_uuid = %local_uuid, error = %e, "InitUpload failed, will retry");
                self.store.modify_recording(local_uuid, |r| {
                    r.set_upload_status(UploadStatus::Failed);
                })?;
            }
        }

        Ok(())
    }

    async fn upload_next_chunk(&self, recording: &Recording) -> CoreResult<()> {
        let local_uuid = recording.local_uuid;

        // One part at a time, in insertion order.
        let Some(chunk) = recording
            .chunks
            .iter()
            .find(|c| c.status == ChunkStatus::Recorded)
            .cloned()
        else {
            return Ok(());
        };

        let server_uuid = recording.server_uuid.ok_or_else(|| CoreError::InvalidState {
            local_uuid,
            reason: "CreatedOnServer without a server id".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        self.store
            .set_chunk_status(local_uuid, chunk.uuid, ChunkStatus::SendingToServer)?;
        let sending = self.store.modify_recording(local_uuid, |r| {
            r.set_upload_status(UploadStatus::Uploading);
        })?;
        self.progress.track(&sending);

        let bytes = tokio::fs::read(&chunk.source)
            .await
            .map_err(|e| CoreError::io(&chunk.source, e))?;

        debug!(
            local_uuid = %local_uuid,
            chunk_uuid = %chunk.uuid,
            size = bytes.len(),
            "Submitting part"
        );

        let reporter: PartProgress = {
            let progress = self.progress.clone();
            let chunk_uuid = chunk.uuid;
            Arc::new(move |loaded: u64| {
                progress.report_loaded(local_uuid, chunk_uuid, loaded);
            })
        };
        let result = self.remote.submit_part(server_uuid, bytes, reporter).await;

        if self.store.find_recording(local_uuid).is_none() {
            warn!(local_uuid = %local_uuid, "Recording removed while SubmitPart was in flight");
            return Ok(());
        }

        match result {
            Ok(()) => {
                self.store
                    .set_chunk_status(local_uuid, chunk.uuid, ChunkStatus::SentToServer)?;
                info!(local_uuid = %local_uuid, chunk_uuid = %chunk.uuid, "Part uploaded");
            }
            Err(e) => {
                self.store
                    .set_chunk_status(local_uuid, chunk.uuid, ChunkStatus::Recorded)?;
                self.progress.report_loaded(local_uuid, chunk.uuid, 0);
                self.store.modify_recording(local_uuid, |r| {
                    r.set_upload_status(UploadStatus::Failed);
                })?;
                warn!(
                    local_uuid = %local_uuid,
                    chunk_uuid = %chunk.uuid,
                    error = %e,
                    "SubmitPart failed, chunk rolled back"
                );
            }
        }

        let recording = self.store.get_recording(local_uuid)?;
        self.progress.track(&recording);

        Ok(())
    }

    fn check_completion(&self, local_uuid: Uuid) -> CoreResult<()> {
        if self.store.find_recording(local_uuid).is_none() {
            return Ok(());
        }

        let mut completed = false;
        self.store.modify_recording(local_uuid, |r| {
            if r.status == RecordingStatus::CreatedOnServer && r.is_ready_to_complete() {
                r.status = RecordingStatus::Complete;
                completed = true;
            }
        })?;

        if completed {
            info!(local_uuid = %local_uuid, "All chunks uploaded, recording complete");
        }

        Ok(())
    }

    async fn complete_upload(&self, recording: &Recording) -> CoreResult<()> {
        let local_uuid = recording.local_uuid;
        let server_uuid = recording.server_uuid.ok_or_else(|| CoreError::InvalidState {
            local_uuid,
            reason: "Complete without a server id".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let started = self.store.modify_recording(local_uuid, |r| {
            if r.status == RecordingStatus::Complete {
                r.status = RecordingStatus::CompletingOnServer;
                r.set_upload_status(UploadStatus::Uploading);
            }
        })?;
        if started.status != RecordingStatus::CompletingOnServer {
            return Ok(());
        }

        info!(local_uuid = %local_uuid, server_uuid = %server_uuid, "Completing upload on server");

        let result = self.remote.complete_upload(server_uuid).await;

        if self.store.find_recording(local_uuid).is_none() {
            warn!(local_uuid = %local_uuid, "Recording removed while CompleteUpload was in flight");
            return Ok(());
        }

        match result {
            Ok(()) => {
                let updated = self.store.modify_recording(local_uuid, |r| {
                    if r.status == RecordingStatus::CompletingOnServer {
                        r.status = RecordingStatus::CompletedOnServer;
                        r.set_upload_status(UploadStatus::Completed);
                    }
                })?;
                if updated.status == RecordingStatus::CompletedOnServer {
                    info!(local_uuid = %local_uuid, "Upload completed on server");
                    self.progress.complete(&updated);
                }
            }
            Err(e) => {
                warn!(local_uuid = %local_uuid, error = %e, "CompleteUpload failed, will retry");
                self.store.modify_recording(local_uuid, |r| {
                    if r.status == RecordingStatus::CompletingOnServer {
                        r.status = RecordingStatus::Complete;
                        r.set_upload_status(UploadStatus::Failed);
                    }
                })?;
            }
        }

        Ok(())
    }
}
