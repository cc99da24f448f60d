use crate::{
    ChunkRecorder, CoreError, RecordStore, UiEvent, WriterEvent,
    tests::support::{add_chunk, create_recording, progress},
};

use std::sync::Arc;

use tokio::sync::broadcast;

/// WHAT: A finalized segment becomes a Recorded chunk in the store
/// WHY: The upload scheduler only sees chunks the store knows about
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_chunk_finalized_when_applying_then_chunk_added_and_forwarded() {
    // Given: A recorder over a store with one recording
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RecordStore::in_memory());
    let recording = create_recording(&store, dir.path());
    let (aggregator, _progress_rx) = progress();
    let (ui_tx, _ui_rx) = broadcast::channel(16);
    let recorder = ChunkRecorder::new(Arc::clone(&store), aggregator.clone(), ui_tx);
    let path = recording.directory_path.join("segment.seg");

    // When: Applying a ChunkFinalized event
    let ui_event = recorder
        .apply(WriterEvent::ChunkFinalized {
            local_uuid: recording.local_uuid,
            path: path.clone(),
            size: 42,
            sequence: 0,
            is_last: false,
        })
        .unwrap();

    // Then: The chunk is stored, tracked at 0% and forwarded
    let stored = store.get_recording(recording.local_uuid).unwrap();
    assert_eq!(stored.chunks.len(), 1);
    assert_eq!(stored.chunks[0].size, 42);
    assert_eq!(stored.chunks[0].source, path);
    assert_eq!(aggregator.progress(recording.local_uuid), Some(0));
    assert_eq!(
        ui_event,
        UiEvent::ChunkFinalized {
            local_uuid: recording.local_uuid,
            path,
            size: 42,
            sequence: 0,
        }
    );
}

/// WHAT: RecordingStopped flags a last chunk and opens the newest recording
/// WHY: The uploader cannot complete a recording without a last chunk
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_recording_stopped_without_last_flag_when_applying_then_last_chunk_flagged() {
    // Given: The last-created recording with one unflagged chunk
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RecordStore::in_memory());
    let recording = create_recording(&store, dir.path());
    let chunk = add_chunk(&store, &recording, 8, 1, false);
    let (aggregator, _progress_rx) = progress();
    let (ui_tx, _ui_rx) = broadcast::channel(16);
    let recorder = ChunkRecorder::new(Arc::clone(&store), aggregator, ui_tx);

    // When: Applying RecordingStopped
    let ui_event = recorder
        .apply(WriterEvent::RecordingStopped {
            local_uuid: recording.local_uuid,
            segment_count: 1,
        })
        .unwrap();

    // Then: The chunk is flagged and the UI opens the recording
    let stored = store.get_recording(recording.local_uuid).unwrap();
    assert!(stored.chunk(chunk.uuid).unwrap().is_last);
    assert_eq!(
        ui_event,
        UiEvent::RecordingStopped {
            local_uuid: recording.local_uuid,
            open_automatically: true,
        }
    );
}

/// WHAT: A write failure surfaces as an error
/// WHY: Disk failures are fatal for the process
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_write_failed_when_applying_then_disk_failure_error() {
    // Given: A recorder
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RecordStore::in_memory());
    let recording = create_recording(&store, dir.path());
    let (aggregator, _progress_rx) = progress();
    let (ui_tx, _ui_rx) = broadcast::channel(16);
    let recorder = ChunkRecorder::new(store, aggregator, ui_tx);

    // When: Applying WriteFailed
    let result = recorder.apply(WriterEvent::WriteFailed {
        local_uuid: recording.local_uuid,
        reason: "disk full".to_string(),
    });

    // Then: A disk failure error is returned
    let error = result.unwrap_err();
    assert!(matches!(error, CoreError::WriteFailed { .. }));
    assert!(error.is_disk_failure());
}
