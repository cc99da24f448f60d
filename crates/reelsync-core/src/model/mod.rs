mod chunk;
mod recording;

pub use {
    chunk::{Chunk, ChunkStatus},
    recording::{CropRect, NewRecording, Recording, RecordingStatus, UploadState, UploadStatus},
};
