use crate::config::{
    default_cancel_grace_secs, default_cleanup_interval_secs, default_progress_retention_secs,
};

use serde::{Deserialize, Serialize};

/// Cleanup and progress retention timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Seconds between cleanup sweeps.
    #[serde(default = "default_cleanup_interval_secs")]
    pub interval_secs: u64,
    /// Seconds a canceled recording is kept before removal.
    #[serde(default = "default_cancel_grace_secs")]
    pub cancel_grace_secs: u64,
    /// Seconds a completed recording keeps showing 100%.
    #[serde(default = "default_progress_retention_secs")]
    pub progress_retention_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval_secs(),
            cancel_grace_secs: default_cancel_grace_secs(),
            progress_retention_secs: default_progress_retention_secs(),
        }
    }
}
