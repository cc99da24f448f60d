mod chunk_arrival;
mod chunk_writer;
mod recorder;
mod segment_file;
mod writer_event;

pub use {
    chunk_arrival::ChunkArrival,
    chunk_writer::{ChunkWriter, DEFAULT_LAST_CHUNK_HOLD, DEFAULT_ROTATION_BYTES, WriterSettings},
    recorder::ChunkRecorder,
    writer_event::WriterEvent,
};
