use crate::{CoreError, CoreResult};

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

/// An open output segment and the bytes written to it so far.
pub(crate) struct SegmentFile {
    path: PathBuf,
    file: fs::File,
    size: u64,
    sequence: u32,
}

impl SegmentFile {
    /// Create a new timestamp-named segment in `directory`.
    pub(crate) async fn create(directory: &Path, sequence: u32) -> CoreResult<Self> {
        fs::create_dir_all(directory)
            .await
            .map_err(|e| CoreError::io(directory, e))?;

        let path = directory.join(format!(
            "{}_{:05}.seg",
            Utc::now().timestamp_millis(),
            sequence
        ));
        let file = fs::File::create(&path)
            .await
            .map_err(|e| CoreError::io(&path, e))?;

        debug!(path = ?path, sequence, "Segment opened");

        Ok(Self {
            path,
            file,
            size: 0,
            sequence,
        })
    }

    pub(crate) async fn write(&mut self, bytes: &[u8]) -> CoreResult<()> {
        self.file
            .write_all(bytes)
            .await
            .map_err(|e| CoreError::io(&self.path, e))?;
        self.size += bytes.len() as u64;
        Ok(())
    }

    /// Flush and fsync, returning `(path, size, sequence)`.
    pub(crate) async fn close(mut self) -> CoreResult<(PathBuf, u64, u32)> {
        self.file
            .flush()
            .await
            .map_err(|e| CoreError::io(&self.path, e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| CoreError::io(&self.path, e))?;
        Ok((self.path, self.size, self.sequence))
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }
}
