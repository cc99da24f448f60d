//! Durable table of recordings and their chunks.
//!
//! Every mutation is a read-modify-write of a whole [`Recording`] under one
//! lock, followed by an atomic rewrite of the backing JSON file. Readers get
//! cloned snapshots, never references into the table.

use crate::{
    CoreError, CoreResult,
    model::{Chunk, ChunkStatus, NewRecording, Recording, RecordingStatus},
};

use std::{
    collections::HashMap,
    fs,
    io::Write,
    panic::Location,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    recordings: HashMap<Uuid, Recording>,
    last_created_recording_id: Option<Uuid>,
}

/// Durable `local_uuid -> Recording` map shared by every component.
///
/// Every mutation rewrites and fsyncs the whole document on the calling
/// thread while holding the lock. Async callers block their runtime worker
/// for the length of that write, so the table is kept to live recordings and
/// cleanup removes finished ones.
#[derive(Debug)]
pub struct RecordStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl RecordStore {
    /// Open the store backed by `path`, loading it if the file exists.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] if the file cannot be read and
    /// [`CoreError::Persistence`] if it cannot be parsed.
    #[track_caller]
    #[instrument]
    pub fn open(path: &Path) -> CoreResult<Self> {
        let state = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
            serde_json::from_str(&contents)?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
            }
            StoreState::default()
        };

        info!(
            store_path = ?path,
            recordings = state.recordings.len(),
            "Record store opened"
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            state: Mutex::new(state),
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Create a `Pending` recording and remember it as the last created one.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn create_recording(&self, params: NewRecording) -> CoreResult<Recording> {
        let recording = Recording::new(params);
        let mut state = self.lock();
        state
            .recordings
            .insert(recording.local_uuid, recording.clone());
        state.last_created_recording_id = Some(recording.local_uuid);
        self.persist(&state)?;

        info!(local_uuid = %recording.local_uuid, "Recording created");

        Ok(recording)
    }

    /// Snapshot of a recording.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordingNotFound`] for an unknown id.
    #[track_caller]
    pub fn get_recording(&self, local_uuid: Uuid) -> CoreResult<Recording> {
        self.find_recording(local_uuid)
            .ok_or_else(|| CoreError::recording_not_found(local_uuid))
    }

    /// Snapshot of a recording, `None` if it has been deleted.
    pub fn find_recording(&self, local_uuid: Uuid) -> Option<Recording> {
        self.lock().recordings.get(&local_uuid).cloned()
    }

    /// Replace a stored recording wholesale.
    #[track_caller]
    pub fn update_recording(&self, recording: Recording) -> CoreResult<()> {
        let mut state = self.lock();
        let slot = state
            .recordings
            .get_mut(&recording.local_uuid)
            .ok_or_else(|| CoreError::recording_not_found(recording.local_uuid))?;
        *slot = recording;
        self.persist(&state)
    }

    /// Apply `f` to the stored recording and persist the result.
    ///
    /// The closure runs under the store lock, so the read and the write are a
    /// single step from every other caller's point of view.
    #[track_caller]
    pub fn modify_recording<F>(&self, local_uuid: Uuid, f: F) -> CoreResult<Recording>
    where
        F: FnOnce(&mut Recording),
    {
        let mut state = self.lock();
        let recording = state
            .recordings
            .get_mut(&local_uuid)
            .ok_or_else(|| CoreError::recording_not_found(local_uuid))?;
        f(recording);
        let snapshot = recording.clone();
        self.persist(&state)?;
        Ok(snapshot)
    }

    /// Remove a recording and all of its chunks.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn delete_recording(&self, local_uuid: Uuid) -> CoreResult<Recording> {
        let mut state = self.lock();
        let removed = state
            .recordings
            .remove(&local_uuid)
            .ok_or_else(|| CoreError::recording_not_found(local_uuid))?;
        if state.last_created_recording_id == Some(local_uuid) {
            state.last_created_recording_id = None;
        }
        self.persist(&state)?;

        debug!(local_uuid = %local_uuid, "Recording deleted from store");

        Ok(removed)
    }

    /// Every recording, oldest first.
    pub fn list_recordings(&self) -> Vec<Recording> {
        let mut recordings: Vec<Recording> = self.lock().recordings.values().cloned().collect();
        recordings.sort_by_key(|r| r.created_at);
        recordings
    }

    /// The most recently created recording that is neither completed nor canceled.
    pub fn priority_recording(&self) -> Option<Recording> {
        self.lock()
            .recordings
            .values()
            .filter(|r| !r.status.is_terminal())
            .max_by_key(|r| r.created_at)
            .cloned()
    }

    /// Recordings in `CompletedOnServer`.
    pub fn completed_recordings(&self) -> Vec<Recording> {
        self.filter(|r| r.status == RecordingStatus::CompletedOnServer)
    }

    /// Recordings in `Canceled`.
    pub fn canceled_recordings(&self) -> Vec<Recording> {
        self.filter(|r| r.status.is_canceled())
    }

    /// Recordings with zero chunks.
    pub fn empty_recordings(&self) -> Vec<Recording> {
        self.filter(|r| r.chunks.is_empty())
    }

    /// Mark a recording canceled. Terminal recordings are left untouched.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn cancel_recording(&self, local_uuid: Uuid, at: DateTime<Utc>) -> CoreResult<Recording> {
        let recording = self.modify_recording(local_uuid, |r| {
            if !r.status.is_terminal() {
                r.status = RecordingStatus::Canceled { at };
            }
        })?;

        info!(local_uuid = %local_uuid, status = ?recording.status, "Recording cancel requested");

        Ok(recording)
    }

    /// Append a chunk, preserving insertion order.
    #[track_caller]
    pub fn add_chunk(&self, chunk: Chunk) -> CoreResult<Recording> {
        let chunk_uuid = chunk.uuid;
        let recording = self.modify_recording(chunk.local_uuid, |r| r.chunks.push(chunk))?;

        debug!(
            local_uuid = %recording.local_uuid,
            chunk_uuid = %chunk_uuid,
            chunk_count = recording.chunks.len(),
            "Chunk recorded"
        );

        Ok(recording)
    }

    /// Snapshot of a chunk.
    #[track_caller]
    pub fn get_chunk(&self, local_uuid: Uuid, chunk_uuid: Uuid) -> CoreResult<Chunk> {
        self.get_recording(local_uuid)?
            .chunk(chunk_uuid)
            .cloned()
            .ok_or_else(|| CoreError::ChunkNotFound {
                local_uuid,
                chunk_uuid,
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Replace a stored chunk wholesale.
    #[track_caller]
    pub fn update_chunk(&self, chunk: Chunk) -> CoreResult<()> {
        let location = ErrorLocation::from(Location::caller());
        let mut state = self.lock();
        let recording = state
            .recordings
            .get_mut(&chunk.local_uuid)
            .ok_or_else(|| CoreError::recording_not_found(chunk.local_uuid))?;
        let slot = recording
            .chunk_mut(chunk.uuid)
            .ok_or(CoreError::ChunkNotFound {
                local_uuid: chunk.local_uuid,
                chunk_uuid: chunk.uuid,
                location,
            })?;
        *slot = chunk;
        self.persist(&state)
    }

    /// Set one chunk's status.
    #[track_caller]
    pub fn set_chunk_status(
        &self,
        local_uuid: Uuid,
        chunk_uuid: Uuid,
        status: ChunkStatus,
    ) -> CoreResult<Chunk> {
        let mut chunk = self.get_chunk(local_uuid, chunk_uuid)?;
        chunk.status = status;
        self.update_chunk(chunk.clone())?;
        Ok(chunk)
    }

    /// Remove one chunk.
    #[track_caller]
    pub fn delete_chunk(&self, local_uuid: Uuid, chunk_uuid: Uuid) -> CoreResult<Chunk> {
        let chunk = self.get_chunk(local_uuid, chunk_uuid)?;
        self.modify_recording(local_uuid, |r| r.chunks.retain(|c| c.uuid != chunk_uuid))?;
        Ok(chunk)
    }

    /// Flag the last-inserted chunk as last if no chunk carries the flag.
    ///
    /// Returns the id of the chunk that was flagged, if any.
    #[track_caller]
    pub fn mark_last_chunk(&self, local_uuid: Uuid) -> CoreResult<Option<Uuid>> {
        let mut flagged = None;
        self.modify_recording(local_uuid, |r| {
            if r.has_last_chunk() {
                return;
            }
            if let Some(chunk) = r.chunks.last_mut() {
                chunk.is_last = true;
                flagged = Some(chunk.uuid);
            }
        })?;
        Ok(flagged)
    }

    /// Id of the most recently created recording, if still known.
    pub fn last_created_recording_id(&self) -> Option<Uuid> {
        self.lock().last_created_recording_id
    }

    /// Forget the last created recording.
    #[track_caller]
    pub fn clear_last_created_recording_id(&self) -> CoreResult<()> {
        let mut state = self.lock();
        state.last_created_recording_id = None;
        self.persist(&state)
    }

    fn filter<P>(&self, predicate: P) -> Vec<Recording>
    where
        P: Fn(&Recording) -> bool,
    {
        let mut matched: Vec<Recording> = self
            .lock()
            .recordings
            .values()
            .filter(|r| predicate(*r))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.created_at);
        matched
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // The table is rewritten wholesale on every mutation, so a poisoned
        // guard still holds a consistent state.
        self.state.lock().unwrap_or_else(|e| {
            error!("Record store lock poisoned, recovering: {}", e);
            e.into_inner()
        })
    }

    /// Write the whole table: temp file, fsync, rename.
    #[track_caller]
    fn persist(&self, state: &StoreState) -> CoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let contents = serde_json::to_vec_pretty(state)?;
        let temp_path = path.with_extension("json.tmp");

        let mut temp_file = fs::File::create(&temp_path).map_err(|e| CoreError::io(&temp_path, e))?;
        temp_file
            .write_all(&contents)
            .map_err(|e| CoreError::io(&temp_path, e))?;
        temp_file
            .sync_all()
            .map_err(|e| CoreError::io(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| CoreError::io(path, e))?;

        Ok(())
    }
}
