use crate::config::{default_poll_interval_secs, default_server_url};

use serde::{Deserialize, Serialize};

/// Remote upload server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Base URL of the upload API, without a trailing slash.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Seconds between upload scheduler ticks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Bearer token sent with every request, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            poll_interval_secs: default_poll_interval_secs(),
            api_token: None,
        }
    }
}
