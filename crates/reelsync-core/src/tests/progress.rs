use crate::{
    Chunk, ChunkStatus, RecordStore, RecordingStatus, UiEvent,
    progress::percent,
    tests::support::{add_chunk, create_recording, progress, set_status},
};

use std::{path::Path, time::Duration};

use uuid::Uuid;

/// WHAT: Percentages round to the nearest integer
/// WHY: The UI shows whole percentages
#[test]
fn given_fractions_when_computing_percent_then_rounded() {
    assert_eq!(percent(1, 3), 33);
    assert_eq!(percent(2, 3), 67);
    assert_eq!(percent(0, 0), 0);
    assert_eq!(percent(5, 3), 100);
}

/// WHAT: Sent chunks count fully, unsent chunks count zero
/// WHY: Progress is uploaded bytes over total bytes
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_one_of_two_chunks_sent_when_tracking_then_progress_weighted_by_size() {
    // Given: 2000 sent bytes and 3000 unsent bytes
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::in_memory();
    let recording = create_recording(&store, dir.path());
    let sent = add_chunk(&store, &recording, 2000, 1, false);
    add_chunk(&store, &recording, 3000, 2, true);
    store
        .set_chunk_status(recording.local_uuid, sent.uuid, ChunkStatus::SentToServer)
        .unwrap();
    let (aggregator, mut ui_rx) = progress();

    // When: Tracking the recording
    let update = aggregator.track(&store.get_recording(recording.local_uuid).unwrap());

    // Then: 40% is reported and published
    assert_eq!(update.progress, 40);
    assert_eq!(ui_rx.try_recv().unwrap(), UiEvent::ProgressUpdated(update));
}

/// WHAT: Partial byte counts move progress and survive re-tracking
/// WHY: In-flight uploads should show progress before the part completes
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_partial_upload_when_reporting_loaded_then_progress_moves() {
    // Given: A tracked recording with two 1000-byte chunks
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::in_memory();
    let recording = create_recording(&store, dir.path());
    let first = add_chunk(&store, &recording, 1000, 1, false);
    add_chunk(&store, &recording, 1000, 2, true);
    let (aggregator, _ui_rx) = progress();
    aggregator.track(&store.get_recording(recording.local_uuid).unwrap());

    // When: Half of the first chunk is loaded, then the recording is re-tracked
    let update = aggregator
        .report_loaded(recording.local_uuid, first.uuid, 500)
        .unwrap();
    let retracked = aggregator.track(&store.get_recording(recording.local_uuid).unwrap());

    // Then: 25% both times, and unknown chunks are ignored
    assert_eq!(update.progress, 25);
    assert_eq!(retracked.progress, 25);
    assert!(
        aggregator
            .report_loaded(recording.local_uuid, Uuid::new_v4(), 10)
            .is_none()
    );
}

/// WHAT: A completed recording shows 100% for the retention window then clears
/// WHY: The UI briefly confirms completion before removing the entry
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used)]
async fn given_completed_recording_when_retention_elapses_then_entry_cleared() {
    // Given: A fully sent recording completed on the server
    let store = RecordStore::in_memory();
    let recording = create_recording(&store, Path::new("/nonexistent"));
    let local_uuid = recording.local_uuid;
    store
        .modify_recording(local_uuid, |r| {
            let mut chunk = Chunk::recorded(
                local_uuid,
                r.directory_path.join("a.seg"),
                100,
                true,
            );
            chunk.status = ChunkStatus::SentToServer;
            r.chunks.push(chunk);
        })
        .unwrap();
    set_status(&store, local_uuid, RecordingStatus::CompletedOnServer);
    let (aggregator, mut ui_rx) = progress();

    // When: Completing and waiting
    aggregator.complete(&store.get_recording(local_uuid).unwrap());

    // Then: 100% until the retention window passes, then cleared
    assert_eq!(aggregator.progress(local_uuid), Some(100));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(aggregator.progress(local_uuid), Some(100));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(aggregator.progress(local_uuid), None);

    let mut cleared = false;
    while let Ok(event) = ui_rx.try_recv() {
        if event == (UiEvent::ProgressCleared { local_uuid }) {
            cleared = true;
        }
    }
    assert!(cleared);
}
