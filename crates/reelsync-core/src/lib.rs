//! ReelSync Core Library
//!
//! Durable ingestion and resumable upload of screen recordings delivered as
//! unordered, possibly duplicated chunks.
//!
//! # Example
//!
//! ```no_run
//! use reelsync_core::{
//!     ChunkArrival, ChunkRecorder, ChunkWriter, CoreResult, NewRecording,
//!     ProgressAggregator, RecordStore, WriterSettings, DEFAULT_COMPLETED_RETENTION,
//! };
//!
//! use std::{path::PathBuf, sync::Arc};
//!
//! use tokio::sync::{broadcast, mpsc};
//!
//! #[tokio::main]
//! async fn main() -> CoreResult<()> {
//!     let records_root = PathBuf::from("records");
//!     let store = Arc::new(RecordStore::open(&records_root.join("store.json"))?);
//!     let (ui_tx, _ui_rx) = broadcast::channel(64);
//!     let progress = ProgressAggregator::new(ui_tx.clone(), DEFAULT_COMPLETED_RETENTION);
//!
//!     let (events_tx, mut events_rx) = mpsc::channel(32);
//!     let writer = ChunkWriter::new(WriterSettings::new(&records_root), events_tx);
//!     let recorder = ChunkRecorder::new(Arc::clone(&store), progress, ui_tx);
//!
//!     let recording = store.create_recording(NewRecording {
//!         title: "Demo".to_string(),
//!         version: "1.0.0".to_string(),
//!         crop: None,
//!         records_root,
//!     })?;
//!
//!     writer
//!         .receive(ChunkArrival::new(recording.local_uuid, 0, vec![0u8; 1024], false))
//!         .await?;
//!     while let Ok(event) = events_rx.try_recv() {
//!         recorder.apply(event)?;
//!     }
//!     Ok(())
//! }
//! ```

mod cleanup;
mod error;
mod events;
mod model;
mod progress;
mod remote;
mod store;
mod upload;
mod writer;

pub use {
    cleanup::{
        CleanupScheduler, CleanupSettings, DEFAULT_CANCEL_GRACE, DEFAULT_CLEANUP_INTERVAL,
        RecoveryReport, SweepReport,
    },
    error::{CoreError, RemoteError, Result as CoreResult},
    events::{ProgressUpdate, UiEvent},
    model::{
        Chunk, ChunkStatus, CropRect, NewRecording, Recording, RecordingStatus, UploadState,
        UploadStatus,
    },
    progress::{DEFAULT_COMPLETED_RETENTION, ProgressAggregator},
    remote::{InitUploadRequest, PartProgress, RemoteApi},
    store::RecordStore,
    upload::{DEFAULT_POLL_INTERVAL, TickOutcome, UploadScheduler},
    writer::{
        ChunkArrival, ChunkRecorder, ChunkWriter, DEFAULT_LAST_CHUNK_HOLD, DEFAULT_ROTATION_BYTES,
        WriterEvent, WriterSettings,
    },
};

#[cfg(test)]
mod tests;
