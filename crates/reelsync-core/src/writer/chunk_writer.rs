//! Ordered, rotating segment writer.
//!
//! Chunks may arrive out of order, duplicated, or with two racing "last"
//! chunks. The writer buffers them per recording and drains them to disk
//! strictly by index, one drain at a time per recording, rotating the output
//! file whenever it reaches the configured size.

use crate::{
    CoreError, CoreResult,
    writer::{ChunkArrival, WriterEvent, segment_file::SegmentFile},
};

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    panic::Location,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use error_location::ErrorLocation;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Segment size at which the writer rotates to a new file (5 MiB).
pub const DEFAULT_ROTATION_BYTES: u64 = 5 * 1024 * 1024;

/// How long a last-flagged chunk waits for a racing competitor.
pub const DEFAULT_LAST_CHUNK_HOLD: Duration = Duration::from_secs(1);

/// Chunk writer configuration.
#[derive(Debug, Clone)]
pub struct WriterSettings {
    /// Each recording writes into `records_root/<local_uuid>`.
    pub records_root: PathBuf,
    /// Rotation threshold in bytes.
    pub rotation_bytes: u64,
    /// Merge window for racing last chunks.
    pub last_chunk_hold: Duration,
}

impl WriterSettings {
    /// Settings with default rotation size and hold window.
    pub fn new(records_root: impl Into<PathBuf>) -> Self {
        Self {
            records_root: records_root.into(),
            rotation_bytes: DEFAULT_ROTATION_BYTES,
            last_chunk_hold: DEFAULT_LAST_CHUNK_HOLD,
        }
    }
}

#[derive(Default)]
struct RecordingWriteState {
    pending: BTreeMap<u64, ChunkArrival>,
    next_expected_index: u64,
    is_processing: bool,
    process_again: bool,
    /// Taken out by the running drain while it writes.
    output: Option<SegmentFile>,
    next_sequence: u32,
}

struct HeldLast {
    arrival: ChunkArrival,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct WriterTables {
    recordings: HashMap<Uuid, RecordingWriteState>,
    held_last: HashMap<Uuid, HeldLast>,
    /// Closed to further chunks until forgotten.
    finished: HashSet<Uuid>,
}

impl WriterTables {
    fn is_active(&self, local_uuid: Uuid) -> bool {
        self.recordings.contains_key(&local_uuid) || self.held_last.contains_key(&local_uuid)
    }

    /// Queue a chunk for the next drain.
    ///
    /// Chunks for a finished recording and duplicate indices are dropped.
    fn enqueue(&mut self, chunk: ChunkArrival) {
        if self.finished.contains(&chunk.local_uuid) {
            warn!(
                local_uuid = %chunk.local_uuid,
                index = chunk.index,
                "Recording already finished, dropping chunk"
            );
            return;
        }

        let state = self.recordings.entry(chunk.local_uuid).or_default();

        if chunk.index < state.next_expected_index {
            warn!(
                local_uuid = %chunk.local_uuid,
                index = chunk.index,
                "Chunk already written, dropping duplicate"
            );
            return;
        }
        if state.pending.contains_key(&chunk.index) {
            warn!(
                local_uuid = %chunk.local_uuid,
                index = chunk.index,
                "Chunk already pending, dropping duplicate"
            );
            return;
        }

        state.pending.insert(chunk.index, chunk);
    }
}

struct WriterInner {
    settings: WriterSettings,
    events: mpsc::Sender<WriterEvent>,
    tables: Mutex<WriterTables>,
}

enum Step {
    Write {
        chunk: ChunkArrival,
        completes: bool,
        output: Option<SegmentFile>,
        next_sequence: u32,
    },
    Idle,
}

/// Turns chunk arrivals into ordered segment files on disk.
///
/// Cheap to clone; clones share the same per-recording state.
#[derive(Clone)]
pub struct ChunkWriter {
    inner: Arc<WriterInner>,
}

impl ChunkWriter {
    /// Create a writer publishing [`WriterEvent`]s on `events`.
    pub fn new(settings: WriterSettings, events: mpsc::Sender<WriterEvent>) -> Self {
        info!(
            records_root = ?settings.records_root,
            rotation_bytes = settings.rotation_bytes,
            hold_ms = settings.last_chunk_hold.as_millis(),
            "ChunkWriter initialized"
        );

        Self {
            inner: Arc::new(WriterInner {
                settings,
                events,
                tables: Mutex::new(WriterTables::default()),
            }),
        }
    }

    /// Accept one chunk arrival.
    ///
    /// Non-last chunks are queued and drained immediately. A last chunk is held
    /// for the merge window; a second last chunk arriving inside the window is
    /// merged with it and drained at once.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] if writing to disk fails.
    #[instrument(
        skip(self, chunk),
        fields(local_uuid = %chunk.local_uuid, index = chunk.index, is_last = chunk.is_last, size = chunk.size())
    )]
    pub async fn receive(&self, chunk: ChunkArrival) -> CoreResult<()> {
        let local_uuid = chunk.local_uuid;

        {
            let mut tables = self.lock();
            if tables.finished.contains(&local_uuid) {
                warn!("Chunk arrived after recording stopped, dropping");
                return Ok(());
            }

            let ready = if chunk.is_last {
                // Competitor lookup and hold share one guard so two racing
                // last chunks cannot both start a hold.
                match tables.held_last.remove(&local_uuid) {
                    Some(held) => {
                        held.timer.abort();
                        let merged = ChunkArrival::merge(held.arrival, chunk);
                        info!(
                            merged_index = merged.index,
                            merged_size = merged.size(),
                            "Merged racing last chunks"
                        );
                        merged
                    }
                    None => {
                        self.hold_last(&mut tables, chunk);
                        return Ok(());
                    }
                }
            } else {
                chunk
            };

            tables.enqueue(ready);
        }

        self.drain(local_uuid).await
    }

    /// Write every contiguous pending chunk of a recording.
    ///
    /// If a drain is already running for the recording this only asks it to
    /// look again and returns.
    pub async fn drain(&self, local_uuid: Uuid) -> CoreResult<()> {
        {
            let mut tables = self.lock();
            let Some(state) = tables.recordings.get_mut(&local_uuid) else {
                return Ok(());
            };
            if state.is_processing {
                state.process_again = true;
                debug!(local_uuid = %local_uuid, "Drain already running, flagged to process again");
                return Ok(());
            }
            state.is_processing = true;
        }

        let result = self.drain_contiguous(local_uuid).await;
        if result.is_err() {
            if let Some(state) = self.lock().recordings.get_mut(&local_uuid) {
                state.is_processing = false;
            }
        }
        result
    }

    /// Drop all writer state for a canceled recording without emitting events.
    #[instrument(skip(self))]
    pub fn discard(&self, local_uuid: Uuid) {
        let mut tables = self.lock();
        if let Some(held) = tables.held_last.remove(&local_uuid) {
            held.timer.abort();
        }
        let pending = tables
            .recordings
            .remove(&local_uuid)
            .map(|state| state.pending.len())
            .unwrap_or(0);
        tables.finished.insert(local_uuid);

        info!(local_uuid = %local_uuid, pending, "Writer state discarded");
    }

    /// True while the writer holds state or a held last chunk for the recording.
    pub fn is_active(&self, local_uuid: Uuid) -> bool {
        self.lock().is_active(local_uuid)
    }

    /// Close an idle recording to further chunks.
    ///
    /// Returns `false`, changing nothing, while the writer still holds state
    /// or a held last chunk for the recording. The check and the close happen
    /// under one guard, so no chunk can slip in between.
    pub fn retire_if_idle(&self, local_uuid: Uuid) -> bool {
        let mut tables = self.lock();
        if tables.is_active(local_uuid) {
            return false;
        }
        tables.finished.insert(local_uuid);
        true
    }

    /// Drop every trace of a recording that no longer exists.
    ///
    /// Called once the recording has left the store; its id stops being
    /// remembered as finished.
    pub fn forget(&self, local_uuid: Uuid) {
        let mut tables = self.lock();
        if let Some(held) = tables.held_last.remove(&local_uuid) {
            held.timer.abort();
        }
        tables.recordings.remove(&local_uuid);
        tables.finished.remove(&local_uuid);
    }

    fn hold_last(&self, tables: &mut WriterTables, chunk: ChunkArrival) {
        let local_uuid = chunk.local_uuid;
        let hold = self.inner.settings.last_chunk_hold;
        let writer = self.clone();

        let timer = tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            writer.release_held_last(local_uuid).await;
        });
        tables.held_last.insert(
            local_uuid,
            HeldLast {
                arrival: chunk,
                timer,
            },
        );

        debug!(local_uuid = %local_uuid, hold_ms = hold.as_millis(), "Holding last chunk");
    }

    async fn release_held_last(&self, local_uuid: Uuid) {
        {
            let mut tables = self.lock();
            let Some(held) = tables.held_last.remove(&local_uuid) else {
                return;
            };
            debug!(local_uuid = %local_uuid, "Hold expired without competitor");
            tables.enqueue(held.arrival);
        }

        if let Err(e) = self.drain(local_uuid).await {
            error!(local_uuid = %local_uuid, error = ?e, "Failed to write last chunk");
            let _ = self
                .inner
                .events
                .send(WriterEvent::WriteFailed {
                    local_uuid,
                    reason: e.to_string(),
                })
                .await;
        }
    }

    async fn drain_contiguous(&self, local_uuid: Uuid) -> CoreResult<()> {
        loop {
            let Step::Write {
                chunk,
                completes,
                output,
                next_sequence,
            } = self.next_step(local_uuid)
            else {
                return Ok(());
            };

            let (output, next_sequence) = self
                .write_bytes(local_uuid, output, next_sequence, &chunk.bytes)
                .await?;

            if completes {
                return self
                    .finish_recording(local_uuid, output, next_sequence)
                    .await;
            }

            let mut tables = self.lock();
            let Some(state) = tables.recordings.get_mut(&local_uuid) else {
                // Discarded while writing.
                return Ok(());
            };
            state.output = output;
            state.next_sequence = next_sequence;
        }
    }

    /// Pop the next contiguous chunk, or clear the processing flag.
    fn next_step(&self, local_uuid: Uuid) -> Step {
        let mut tables = self.lock();
        let Some(state) = tables.recordings.get_mut(&local_uuid) else {
            return Step::Idle;
        };

        loop {
            if let Some(chunk) = state.pending.remove(&state.next_expected_index) {
                state.next_expected_index += 1;

                let later_last = state
                    .pending
                    .values()
                    .any(|c| c.is_last && c.index > chunk.index);
                if chunk.is_last && later_last {
                    warn!(
                        local_uuid = %local_uuid,
                        index = chunk.index,
                        "Later chunk also flagged last, not finalizing yet"
                    );
                }

                return Step::Write {
                    completes: chunk.is_last && !later_last,
                    chunk,
                    output: state.output.take(),
                    next_sequence: state.next_sequence,
                };
            }

            if state.process_again {
                state.process_again = false;
                continue;
            }

            state.is_processing = false;
            return Step::Idle;
        }
    }

    /// Append `bytes`, rotating whenever the open segment is full.
    async fn write_bytes(
        &self,
        local_uuid: Uuid,
        mut output: Option<SegmentFile>,
        mut next_sequence: u32,
        bytes: &[u8],
    ) -> CoreResult<(Option<SegmentFile>, u32)> {
        let threshold = self.inner.settings.rotation_bytes.max(1);
        let mut offset = 0;

        while offset < bytes.len() {
            let mut segment = match output.take() {
                Some(segment) if segment.size() < threshold => segment,
                full => {
                    if let Some(full) = full {
                        self.finalize_segment(local_uuid, full, false).await?;
                    }
                    let segment =
                        SegmentFile::create(&self.directory(local_uuid), next_sequence).await?;
                    next_sequence += 1;
                    segment
                }
            };

            let room = usize::try_from(threshold - segment.size()).unwrap_or(usize::MAX);
            let end = bytes.len().min(offset.saturating_add(room));
            segment.write(&bytes[offset..end]).await?;
            offset = end;
            output = Some(segment);
        }

        Ok((output, next_sequence))
    }

    async fn finalize_segment(
        &self,
        local_uuid: Uuid,
        segment: SegmentFile,
        is_last: bool,
    ) -> CoreResult<()> {
        let (path, size, sequence) = segment.close().await?;

        info!(
            local_uuid = %local_uuid,
            path = ?path,
            size,
            sequence,
            is_last,
            "Segment finalized"
        );

        self.emit(WriterEvent::ChunkFinalized {
            local_uuid,
            path,
            size,
            sequence,
            is_last,
        })
        .await
    }

    async fn finish_recording(
        &self,
        local_uuid: Uuid,
        output: Option<SegmentFile>,
        segment_count: u32,
    ) -> CoreResult<()> {
        match output {
            Some(segment) => self.finalize_segment(local_uuid, segment, true).await?,
            None => warn!(local_uuid = %local_uuid, "Recording stopped with no bytes written"),
        }

        let leftover = {
            let mut tables = self.lock();
            tables.finished.insert(local_uuid);
            tables
                .recordings
                .remove(&local_uuid)
                .map(|state| state.pending.len())
                .unwrap_or(0)
        };
        if leftover > 0 {
            warn!(local_uuid = %local_uuid, leftover, "Discarding chunks queued past the last chunk");
        }

        self.emit(WriterEvent::RecordingStopped {
            local_uuid,
            segment_count,
        })
        .await?;

        info!(local_uuid = %local_uuid, segment_count, "Recording stopped");

        Ok(())
    }

    async fn emit(&self, event: WriterEvent) -> CoreResult<()> {
        self.inner
            .events
            .send(event)
            .await
            .map_err(|e| CoreError::ChannelClosed {
                message: format!("Failed to publish writer event: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    fn directory(&self, local_uuid: Uuid) -> PathBuf {
        self.inner
            .settings
            .records_root
            .join(local_uuid.to_string())
    }

    fn lock(&self) -> MutexGuard<'_, WriterTables> {
        self.inner.tables.lock().unwrap_or_else(|e| {
            error!("Writer state lock poisoned, recovering: {}", e);
            e.into_inner()
        })
    }
}
