#![allow(clippy::unwrap_used)]

use crate::{
    Chunk, ChunkStatus, InitUploadRequest, NewRecording, PartProgress, ProgressAggregator,
    RecordStore, Recording, RecordingStatus, RemoteApi, RemoteError, UiEvent,
};

use std::{
    collections::VecDeque,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

/// One call observed by [`FakeRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RemoteCall {
    Init { title: String },
    SubmitPart { server_uuid: Uuid, bytes: Vec<u8> },
    Complete { server_uuid: Uuid },
    Delete { server_uuid: Uuid },
}

/// Scripted remote: each call pops its next queued result, succeeding when
/// the queue is empty. A part reports half of its bytes before its result.
pub(crate) struct FakeRemote {
    pub(crate) server_uuid: Uuid,
    calls: Mutex<Vec<RemoteCall>>,
    init_results: Mutex<VecDeque<Result<Uuid, RemoteError>>>,
    part_results: Mutex<VecDeque<Result<(), RemoteError>>>,
    complete_results: Mutex<VecDeque<Result<(), RemoteError>>>,
    delete_results: Mutex<VecDeque<Result<(), RemoteError>>>,
}

impl FakeRemote {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            server_uuid: Uuid::new_v4(),
            calls: Mutex::new(Vec::new()),
            init_results: Mutex::new(VecDeque::new()),
            part_results: Mutex::new(VecDeque::new()),
            complete_results: Mutex::new(VecDeque::new()),
            delete_results: Mutex::new(VecDeque::new()),
        })
    }

    pub(crate) fn fail_init(&self) {
        self.init_results.lock().unwrap().push_back(Err(failure()));
    }

    pub(crate) fn fail_part(&self) {
        self.part_results.lock().unwrap().push_back(Err(failure()));
    }

    pub(crate) fn fail_complete(&self) {
        self.complete_results.lock().unwrap().push_back(Err(failure()));
    }

    pub(crate) fn queue_delete(&self, result: Result<(), RemoteError>) {
        self.delete_results.lock().unwrap().push_back(result);
    }

    pub(crate) fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&RemoteCall) -> bool) -> usize {
        self.calls().into_iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn failure() -> RemoteError {
    RemoteError::Failed {
        reason: "connection reset".to_string(),
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn init_upload(&self, request: InitUploadRequest) -> Result<Uuid, RemoteError> {
        self.record(RemoteCall::Init {
            title: request.title,
        });
        self.init_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(self.server_uuid))
    }

    async fn submit_part(
        &self,
        server_uuid: Uuid,
        bytes: Vec<u8>,
        progress: PartProgress,
    ) -> Result<(), RemoteError> {
        progress(bytes.len() as u64 / 2);
        self.record(RemoteCall::SubmitPart { server_uuid, bytes });
        self.part_results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn complete_upload(&self, server_uuid: Uuid) -> Result<(), RemoteError> {
        self.record(RemoteCall::Complete { server_uuid });
        self.complete_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn delete_upload(&self, server_uuid: Uuid) -> Result<(), RemoteError> {
        self.record(RemoteCall::Delete { server_uuid });
        self.delete_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

pub(crate) fn progress() -> (ProgressAggregator, broadcast::Receiver<UiEvent>) {
    let (ui_tx, ui_rx) = broadcast::channel(256);
    (
        ProgressAggregator::new(ui_tx, Duration::from_secs(3)),
        ui_rx,
    )
}

pub(crate) fn create_recording(store: &RecordStore, records_root: &Path) -> Recording {
    store
        .create_recording(NewRecording {
            title: "Weekly demo".to_string(),
            version: "2.4.0".to_string(),
            crop: None,
            records_root: records_root.to_path_buf(),
        })
        .unwrap()
}

/// Write a segment file of `size` bytes for `recording` and record it.
pub(crate) fn add_chunk(
    store: &RecordStore,
    recording: &Recording,
    size: usize,
    fill: u8,
    is_last: bool,
) -> Chunk {
    std::fs::create_dir_all(&recording.directory_path).unwrap();
    let path = recording
        .directory_path
        .join(format!("{}.seg", Uuid::new_v4()));
    std::fs::write(&path, vec![fill; size]).unwrap();

    let chunk = Chunk::recorded(recording.local_uuid, path, size as u64, is_last);
    store.add_chunk(chunk.clone()).unwrap();
    chunk
}

pub(crate) fn set_status(store: &RecordStore, local_uuid: Uuid, status: RecordingStatus) {
    store
        .modify_recording(local_uuid, |r| r.status = status)
        .unwrap();
}

pub(crate) fn chunk_statuses(store: &RecordStore, local_uuid: Uuid) -> Vec<ChunkStatus> {
    store
        .get_recording(local_uuid)
        .unwrap()
        .chunks
        .iter()
        .map(|c| c.status)
        .collect()
}
