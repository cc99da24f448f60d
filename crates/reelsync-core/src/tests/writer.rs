use crate::{ChunkArrival, ChunkWriter, WriterEvent, WriterSettings};

use std::{path::Path, time::Duration};

use tokio::sync::mpsc;
use uuid::Uuid;

const HOLD: Duration = Duration::from_millis(30);

fn new_writer(records_root: &Path, rotation_bytes: u64) -> (ChunkWriter, mpsc::Receiver<WriterEvent>) {
    let (events_tx, events_rx) = mpsc::channel(64);
    let settings = WriterSettings {
        rotation_bytes,
        last_chunk_hold: HOLD,
        ..WriterSettings::new(records_root)
    };
    (ChunkWriter::new(settings, events_tx), events_rx)
}

fn arrival(local_uuid: Uuid, index: u64, is_last: bool) -> ChunkArrival {
    ChunkArrival::new(local_uuid, index, vec![index as u8; 3], is_last)
}

#[allow(clippy::unwrap_used)]
async fn events_until_stopped(events_rx: &mut mpsc::Receiver<WriterEvent>) -> Vec<WriterEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let stopped = matches!(event, WriterEvent::RecordingStopped { .. });
        events.push(event);
        if stopped {
            return events;
        }
    }
}

#[allow(clippy::unwrap_used)]
fn segment_bytes(events: &[WriterEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            WriterEvent::ChunkFinalized { path, .. } => Some(std::fs::read(path).unwrap()),
            _ => None,
        })
        .flatten()
        .collect()
}

/// WHAT: Every arrival order of four chunks reassembles the same bytes
/// WHY: Network delivery order must never leak into the recorded stream
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_any_arrival_order_when_writing_then_bytes_are_in_index_order() {
    let expected: Vec<u8> = (0..5u8).flat_map(|i| vec![i; 3]).collect();
    let mut orders = Vec::new();
    for a in 0..4u64 {
        for b in 0..4u64 {
            for c in 0..4u64 {
                for d in 0..4u64 {
                    let order = [a, b, c, d];
                    let distinct = (0..4).all(|i| !order[i + 1..].contains(&order[i]));
                    if distinct {
                        orders.push(order);
                    }
                }
            }
        }
    }
    assert_eq!(orders.len(), 24);

    for order in orders {
        // Given: A fresh writer and recording
        let dir = tempfile::tempdir().unwrap();
        let (writer, mut events_rx) = new_writer(dir.path(), 1024);
        let local_uuid = Uuid::new_v4();

        // When: Chunks 0..4 arrive in this order, followed by the last chunk
        for index in order {
            writer.receive(arrival(local_uuid, index, false)).await.unwrap();
        }
        writer.receive(arrival(local_uuid, 4, true)).await.unwrap();

        // Then: The segment holds the bytes in index order
        let events = events_until_stopped(&mut events_rx).await;
        assert_eq!(segment_bytes(&events), expected, "order {:?}", order);
    }
}

/// WHAT: Two last chunks inside the hold window merge into one finalization
/// WHY: Racing stop signals must not produce two closing segments
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_two_last_chunks_within_window_when_writing_then_single_stop_with_merged_bytes() {
    // Given: A writer with chunk 0 already written
    let dir = tempfile::tempdir().unwrap();
    let (writer, mut events_rx) = new_writer(dir.path(), 1024);
    let local_uuid = Uuid::new_v4();
    writer.receive(arrival(local_uuid, 0, false)).await.unwrap();

    // When: The higher last chunk arrives before the lower one
    writer.receive(arrival(local_uuid, 2, true)).await.unwrap();
    writer.receive(arrival(local_uuid, 1, true)).await.unwrap();

    // Then: The merged payload follows index order and the recording stops once
    let events = events_until_stopped(&mut events_rx).await;
    assert_eq!(
        segment_bytes(&events),
        vec![0, 0, 0, 1, 1, 1, 2, 2, 2]
    );
    tokio::time::sleep(HOLD * 4).await;
    assert!(events_rx.try_recv().is_err());
    assert!(!writer.is_active(local_uuid));
}

/// WHAT: A single last chunk is written after the hold window expires
/// WHY: A recording without a racing competitor must still finish
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_lone_last_chunk_when_hold_expires_then_recording_stops() {
    // Given: A writer and a recording
    let dir = tempfile::tempdir().unwrap();
    let (writer, mut events_rx) = new_writer(dir.path(), 1024);
    let local_uuid = Uuid::new_v4();

    // When: Only a last chunk arrives
    writer.receive(arrival(local_uuid, 0, true)).await.unwrap();
    assert!(writer.is_active(local_uuid));

    // Then: After the hold one segment is finalized as last
    let events = events_until_stopped(&mut events_rx).await;
    assert!(matches!(
        events[0],
        WriterEvent::ChunkFinalized {
            is_last: true,
            sequence: 0,
            size: 3,
            ..
        }
    ));
    assert_eq!(
        events[1],
        WriterEvent::RecordingStopped {
            local_uuid,
            segment_count: 1
        }
    );
}

/// WHAT: Output rotates into full segments at the configured threshold
/// WHY: Uploadable parts must be bounded in size
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_small_rotation_threshold_when_writing_then_segments_rotate() {
    // Given: A writer rotating at 10 bytes
    let dir = tempfile::tempdir().unwrap();
    let (writer, mut events_rx) = new_writer(dir.path(), 10);
    let local_uuid = Uuid::new_v4();

    // When: 25 bytes then a 5-byte last chunk arrive
    writer
        .receive(ChunkArrival::new(local_uuid, 0, vec![7; 25], false))
        .await
        .unwrap();
    writer
        .receive(ChunkArrival::new(local_uuid, 1, vec![8; 5], true))
        .await
        .unwrap();

    // Then: Three 10-byte segments, only the final one flagged last
    let events = events_until_stopped(&mut events_rx).await;
    let finalized: Vec<(u32, u64, bool)> = events
        .iter()
        .filter_map(|event| match event {
            WriterEvent::ChunkFinalized {
                sequence,
                size,
                is_last,
                ..
            } => Some((*sequence, *size, *is_last)),
            _ => None,
        })
        .collect();
    assert_eq!(
        finalized,
        vec![(0, 10, false), (1, 10, false), (2, 10, true)]
    );
    assert!(matches!(
        events.last(),
        Some(WriterEvent::RecordingStopped {
            segment_count: 3,
            ..
        })
    ));
    let mut expected = vec![7; 25];
    expected.extend_from_slice(&[8; 5]);
    assert_eq!(segment_bytes(&events), expected);
}

/// WHAT: Duplicate chunk indices are written once
/// WHY: Retried deliveries must not duplicate video bytes
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_duplicate_index_when_writing_then_duplicate_dropped() {
    // Given: A writer and a recording
    let dir = tempfile::tempdir().unwrap();
    let (writer, mut events_rx) = new_writer(dir.path(), 1024);
    let local_uuid = Uuid::new_v4();

    // When: Chunk 0 arrives twice, chunk 2 arrives twice while pending
    writer.receive(arrival(local_uuid, 0, false)).await.unwrap();
    writer.receive(arrival(local_uuid, 0, false)).await.unwrap();
    writer.receive(arrival(local_uuid, 2, false)).await.unwrap();
    writer.receive(arrival(local_uuid, 2, false)).await.unwrap();
    writer.receive(arrival(local_uuid, 1, false)).await.unwrap();
    writer.receive(arrival(local_uuid, 3, true)).await.unwrap();

    // Then: Each index appears exactly once
    let events = events_until_stopped(&mut events_rx).await;
    assert_eq!(
        segment_bytes(&events),
        vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3]
    );
}

/// WHAT: Chunks arriving after the recording stopped are ignored
/// WHY: A finished recording must not reopen segment files
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_stopped_recording_when_late_chunk_arrives_then_dropped() {
    // Given: A recording that already stopped
    let dir = tempfile::tempdir().unwrap();
    let (writer, mut events_rx) = new_writer(dir.path(), 1024);
    let local_uuid = Uuid::new_v4();
    writer.receive(arrival(local_uuid, 0, false)).await.unwrap();
    writer.receive(arrival(local_uuid, 1, true)).await.unwrap();
    events_until_stopped(&mut events_rx).await;

    // When: A late chunk arrives
    writer.receive(arrival(local_uuid, 2, false)).await.unwrap();

    // Then: No event and no writer state
    assert!(events_rx.try_recv().is_err());
    assert!(!writer.is_active(local_uuid));
}

/// WHAT: Discarding a recording drops pending chunks and a held last chunk
/// WHY: A canceled recording must not finalize segments afterwards
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_pending_chunks_when_discarding_then_nothing_is_emitted() {
    // Given: A recording with a gap and a held last chunk
    let dir = tempfile::tempdir().unwrap();
    let (writer, mut events_rx) = new_writer(dir.path(), 1024);
    let local_uuid = Uuid::new_v4();
    writer.receive(arrival(local_uuid, 1, false)).await.unwrap();
    writer.receive(arrival(local_uuid, 2, true)).await.unwrap();

    // When: Discarding before the hold expires, then filling the gap
    writer.discard(local_uuid);
    writer.receive(arrival(local_uuid, 0, false)).await.unwrap();

    // Then: No segment is ever produced
    tokio::time::sleep(HOLD * 4).await;
    assert!(events_rx.try_recv().is_err());
    assert!(!writer.is_active(local_uuid));
}

/// WHAT: A last chunk does not finalize while a later last chunk is pending
/// WHY: A stray last flag that missed the merge window must not end the recording early
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_later_last_chunk_pending_when_gap_fills_then_stops_once_at_highest_index() {
    // Given: Chunk 0 written, then last chunks 2 and 3 released separately while 1 is missing
    let dir = tempfile::tempdir().unwrap();
    let (writer, mut events_rx) = new_writer(dir.path(), 1024);
    let local_uuid = Uuid::new_v4();
    writer.receive(arrival(local_uuid, 0, false)).await.unwrap();
    writer.receive(arrival(local_uuid, 2, true)).await.unwrap();
    tokio::time::sleep(HOLD * 4).await;
    writer.receive(arrival(local_uuid, 3, true)).await.unwrap();
    tokio::time::sleep(HOLD * 4).await;
    assert!(events_rx.try_recv().is_err());

    // When: The gap is filled
    writer.receive(arrival(local_uuid, 1, false)).await.unwrap();

    // Then: One closing segment holds every chunk in order and the recording stops once
    let events = events_until_stopped(&mut events_rx).await;
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[0],
        WriterEvent::ChunkFinalized {
            is_last: true,
            size: 12,
            ..
        }
    ));
    assert_eq!(
        segment_bytes(&events),
        vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3]
    );
    tokio::time::sleep(HOLD * 4).await;
    assert!(events_rx.try_recv().is_err());
    assert!(!writer.is_active(local_uuid));
}

/// WHAT: A retired recording drops chunks until it is forgotten
/// WHY: Cleanup removes idle empty recordings and must not race a new capture
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_retired_recording_when_chunks_arrive_then_dropped_until_forgotten() {
    // Given: An idle recording and one with buffered bytes
    let dir = tempfile::tempdir().unwrap();
    let (writer, mut events_rx) = new_writer(dir.path(), 1024);
    let idle = Uuid::new_v4();
    let busy = Uuid::new_v4();
    writer.receive(arrival(busy, 0, false)).await.unwrap();

    // When: Retiring both
    let idle_retired = writer.retire_if_idle(idle);
    let busy_retired = writer.retire_if_idle(busy);

    // Then: Only the idle one is retired, and its chunks are dropped
    assert!(idle_retired);
    assert!(!busy_retired);
    writer.receive(arrival(idle, 0, false)).await.unwrap();
    writer.receive(arrival(idle, 1, true)).await.unwrap();
    tokio::time::sleep(HOLD * 4).await;
    assert!(events_rx.try_recv().is_err());
    assert!(!writer.is_active(idle));

    // When: The recording is forgotten
    writer.forget(idle);
    writer.receive(arrival(idle, 0, false)).await.unwrap();

    // Then: The id is no longer remembered as finished
    assert!(writer.is_active(idle));
}

/// WHAT: Merging keeps the lower index and concatenates in index order
/// WHY: The merged chunk replaces both racing last chunks in the sequence
#[test]
fn given_racing_last_chunks_when_merging_then_lower_index_kept() {
    // Given: Two last chunks in reverse order
    let local_uuid = Uuid::new_v4();
    let higher = ChunkArrival::new(local_uuid, 6, vec![6, 6], true);
    let lower = ChunkArrival::new(local_uuid, 5, vec![5], true);

    // When: Merging
    let merged = ChunkArrival::merge(higher, lower);

    // Then: Lower index, ordered payload, still last
    assert_eq!(merged.index, 5);
    assert_eq!(merged.bytes, vec![5, 6, 6]);
    assert!(merged.is_last);
}
