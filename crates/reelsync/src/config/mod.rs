mod cleanup_config;
#[allow(clippy::module_inception)]
mod config;
mod server_config;
mod storage_config;
mod upload_config;
mod writer_config;

pub(crate) use {
    cleanup_config::CleanupConfig, config::Config, server_config::ServerConfig,
    storage_config::StorageConfig, upload_config::UploadConfig, writer_config::WriterConfig,
};

use reelsync_core::{
    DEFAULT_CANCEL_GRACE, DEFAULT_CLEANUP_INTERVAL, DEFAULT_COMPLETED_RETENTION,
    DEFAULT_LAST_CHUNK_HOLD, DEFAULT_POLL_INTERVAL, DEFAULT_ROTATION_BYTES,
};

pub(crate) const DEFAULT_PORT: u16 = 7879;
pub(crate) const DEFAULT_SERVER_URL: &str = "http://localhost:3000/api";

pub(crate) fn default_port() -> u16 {
    DEFAULT_PORT
}

pub(crate) fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

pub(crate) fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

pub(crate) fn default_rotation_bytes() -> u64 {
    DEFAULT_ROTATION_BYTES
}

pub(crate) fn default_last_chunk_hold_ms() -> u64 {
    DEFAULT_LAST_CHUNK_HOLD.as_millis() as u64
}

pub(crate) fn default_cleanup_interval_secs() -> u64 {
    DEFAULT_CLEANUP_INTERVAL.as_secs()
}

pub(crate) fn default_cancel_grace_secs() -> u64 {
    DEFAULT_CANCEL_GRACE.as_secs()
}

pub(crate) fn default_progress_retention_secs() -> u64 {
    DEFAULT_COMPLETED_RETENTION.as_secs()
}
