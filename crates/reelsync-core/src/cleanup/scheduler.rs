//! Crash recovery and removal of finished recordings.

use crate::{
    CoreError, CoreResult, RecordStore, RemoteError,
    model::{ChunkStatus, Recording, RecordingStatus},
    progress::ProgressAggregator,
    remote::RemoteApi,
    writer::ChunkWriter,
};

use std::{path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{sync::watch, time::Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Default time between sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default delay before a canceled recording is removed.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(30);

/// Cleanup timing.
#[derive(Debug, Clone, Copy)]
pub struct CleanupSettings {
    /// Time between sweeps.
    pub interval: Duration,
    /// Minimum age of a cancel before the recording is removed.
    pub cancel_grace: Duration,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CLEANUP_INTERVAL,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }
}

/// What startup recovery repaired.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Recordings moved back from an in-flight status.
    pub recordings_reset: usize,
    /// Chunks moved back from `SendingToServer`.
    pub chunks_reset: usize,
    /// Recordings whose last chunk was flagged retroactively.
    pub last_flags_repaired: usize,
}

/// What one sweep removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Completed recordings removed.
    pub completed: usize,
    /// Canceled recordings removed.
    pub canceled: usize,
    /// Recordings without chunks removed.
    pub empty: usize,
}

/// Repairs crash leftovers and deletes terminal recordings.
#[derive(Clone)]
pub struct CleanupScheduler {
    store: Arc<RecordStore>,
    remote: Arc<dyn RemoteApi>,
    progress: ProgressAggregator,
    writer: ChunkWriter,
    settings: CleanupSettings,
}

impl CleanupScheduler {
    /// Create a cleanup scheduler.
    ///
    /// `writer` is consulted before an empty recording is removed, and told to
    /// forget every recording the sweep deletes.
    pub fn new(
        store: Arc<RecordStore>,
        remote: Arc<dyn RemoteApi>,
        progress: ProgressAggregator,
        writer: ChunkWriter,
        settings: CleanupSettings,
    ) -> Self {
        Self {
            store,
            remote,
            progress,
            writer,
            settings,
        }
    }

    /// Undo state left behind by a crash. Run once, before any scheduler starts.
    ///
    /// In-flight remote stages are moved back so they are re-issued, chunks
    /// caught mid-upload return to `Recorded`, recordings missing a last flag
    /// get one on their last-inserted chunk, and the last-created id is cleared.
    #[instrument(skip(self))]
    pub fn recover(&self) -> CoreResult<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for recording in self.store.list_recordings() {
            let mut repaired = recording.clone();

            repaired.status = match repaired.status {
                RecordingStatus::CreatingOnServer => RecordingStatus::Pending,
                RecordingStatus::CompletingOnServer => RecordingStatus::Complete,
                other => other,
            };
            if repaired.status != recording.status {
                report.recordings_reset += 1;
            }

            for chunk in repaired
                .chunks
                .iter_mut()
                .filter(|c| c.status == ChunkStatus::SendingToServer)
            {
                chunk.status = ChunkStatus::Recorded;
                report.chunks_reset += 1;
            }

            if !repaired.has_last_chunk() {
                if let Some(chunk) = repaired.chunks.last_mut() {
                    chunk.is_last = true;
                    report.last_flags_repaired += 1;
                }
            }

            if repaired != recording {
                info!(
                    local_uuid = %recording.local_uuid,
                    from = ?recording.status,
                    to = ?repaired.status,
                    "Recovered recording"
                );
                self.store.update_recording(repaired)?;
            }
        }

        self.store.clear_last_created_recording_id()?;

        info!(
            recordings_reset = report.recordings_reset,
            chunks_reset = report.chunks_reset,
            last_flags_repaired = report.last_flags_repaired,
            "Startup recovery finished"
        );

        Ok(report)
    }

    /// Sweep once, treating `now` as the current time.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] if a recording directory cannot be removed.
    /// A failed `DeleteUpload` is logged and retried on the next sweep.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        let mut report = SweepReport::default();

        for recording in self.store.completed_recordings() {
            self.remove_local(&recording).await?;
            report.completed += 1;
        }

        for recording in self.store.canceled_recordings() {
            if !self.grace_elapsed(&recording, now) {
                continue;
            }
            if let Some(server_uuid) = recording.server_uuid {
                if !self.delete_on_server(recording.local_uuid, server_uuid).await {
                    continue;
                }
            }
            self.remove_local(&recording).await?;
            report.canceled += 1;
        }

        // An empty recording is still capturing while the writer holds bytes
        // for it; the last-created one may not have received any yet.
        let last_created = self.store.last_created_recording_id();
        for recording in self.store.empty_recordings() {
            if Some(recording.local_uuid) == last_created {
                continue;
            }
            if !self.writer.retire_if_idle(recording.local_uuid) {
                debug!(local_uuid = %recording.local_uuid, "Empty recording still capturing, kept");
                continue;
            }
            self.remove_local(&recording).await?;
            report.empty += 1;
        }

        if report != SweepReport::default() {
            info!(
                completed = report.completed,
                canceled = report.canceled,
                empty = report.empty,
                "Cleanup sweep removed recordings"
            );
        }

        Ok(report)
    }

    /// Sweep every interval until shutdown.
    ///
    /// The first sweep runs one interval after the call; startup sweeps are
    /// made directly with [`CleanupScheduler::sweep`] after [`CleanupScheduler::recover`].
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> CoreResult<()> {
        let interval = self.settings.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);

        info!(
            interval_secs = self.settings.interval.as_secs(),
            cancel_grace_secs = self.settings.cancel_grace.as_secs(),
            "Cleanup scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Cleanup scheduler shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(Utc::now()).await {
                        error!(error = ?e, "Cleanup sweep failed");
                        return Err(e);
                    }
                }
            }
        }

        Ok(())
    }

    fn grace_elapsed(&self, recording: &Recording, now: DateTime<Utc>) -> bool {
        let Some(canceled_at) = recording.canceled_at() else {
            return false;
        };
        // A cancel stamped in the future has not elapsed.
        match (now - canceled_at).to_std() {
            Ok(elapsed) => elapsed >= self.settings.cancel_grace,
            Err(_) => false,
        }
    }

    /// True if the server no longer holds the upload.
    async fn delete_on_server(&self, local_uuid: Uuid, server_uuid: Uuid) -> bool {
        match self.remote.delete_upload(server_uuid).await {
            Ok(()) => {
                info!(local_uuid = %local_uuid, server_uuid = %server_uuid, "Upload deleted on server");
                true
            }
            Err(RemoteError::NotFound) => {
                debug!(local_uuid = %local_uuid, server_uuid = %server_uuid, "Upload already gone on server");
                true
            }
            Err(e) => {
                warn!(
                    local_uuid = %local_uuid,
                    server_uuid = %server_uuid,
                    error = %e,
                    "DeleteUpload failed, will retry next sweep"
                );
                false
            }
        }
    }

    async fn remove_local(&self, recording: &Recording) -> CoreResult<()> {
        remove_directory(&recording.directory_path).await?;
        self.store.delete_recording(recording.local_uuid)?;
        self.progress.forget(recording.local_uuid);
        self.writer.forget(recording.local_uuid);

        info!(
            local_uuid = %recording.local_uuid,
            status = ?recording.status,
            chunks = recording.chunks.len(),
            "Recording removed"
        );

        Ok(())
    }
}

async fn remove_directory(path: &Path) -> CoreResult<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CoreError::io(path, e)),
    }
}
