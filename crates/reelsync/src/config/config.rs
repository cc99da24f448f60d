//! Configuration management for reelsync.
//!
//! Handles loading and saving TOML configuration files with cross-platform
//! paths, validation, and atomic write operations.

use crate::{
    AppError, AppResult,
    config::{CleanupConfig, ServerConfig, StorageConfig, UploadConfig, WriterConfig},
};

use reelsync_core::{CleanupSettings, WriterSettings};

use std::{
    fs,
    io::Write,
    panic::Location,
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Main configuration struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// On-disk locations.
    pub storage: StorageConfig,
    /// Chunk writer tuning.
    #[serde(default)]
    pub writer: WriterConfig,
    /// Remote upload server.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Cleanup timing.
    #[serde(default)]
    pub cleanup: CleanupConfig,
    /// Local ingest server.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from the platform config directory, creating a
    /// default file if none exists.
    #[track_caller]
    #[instrument]
    pub fn load() -> AppResult<Self> {
        let proj_dirs = Self::project_dirs()?;
        let config_dir = proj_dirs.config_dir();

        if !config_dir.exists() {
            fs::create_dir_all(config_dir)?;
            debug!(config_dir = ?config_dir, "Created config directory");
        }

        Self::load_from(&config_dir.join("config.toml"), proj_dirs.data_dir())
    }

    /// Load configuration from `config_path`, writing defaults rooted at
    /// `data_dir` if the file does not exist yet.
    #[track_caller]
    #[instrument]
    pub fn load_from(config_path: &Path, data_dir: &Path) -> AppResult<Self> {
        if !config_path.exists() {
            info!("No config found, creating default");
            let config = Self::defaults(data_dir);
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(config_path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to read config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        info!(config_path = ?config_path, "Configuration loaded");

        Ok(config)
    }

    /// Default configuration storing everything under `data_dir`.
    pub fn defaults(data_dir: &Path) -> Self {
        Config {
            storage: StorageConfig {
                records_root: data_dir.join("records"),
                store_path: data_dir.join("store.json"),
            },
            writer: WriterConfig::default(),
            upload: UploadConfig::default(),
            cleanup: CleanupConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Reject settings the schedulers cannot run with.
    #[track_caller]
    pub fn validate(&self) -> AppResult<()> {
        let zero_fields = [
            ("writer.rotation_bytes", self.writer.rotation_bytes),
            ("upload.poll_interval_secs", self.upload.poll_interval_secs),
            ("cleanup.interval_secs", self.cleanup.interval_secs),
        ];

        if let Some((name, _)) = zero_fields.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::ConfigError {
                reason: format!("{} must be greater than zero", name),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if self.upload.server_url.trim().is_empty() {
            return Err(AppError::ConfigError {
                reason: "upload.server_url must not be empty".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(())
    }

    /// Save configuration to `config_path` using atomic write pattern.
    ///
    /// Writes to a temporary file first, then renames to prevent corruption
    /// if the process crashes during the write.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn save_to(&self, config_path: &Path) -> AppResult<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        // Atomic write: write to temp file then rename
        let temp_path = config_path.with_extension("toml.tmp");

        let mut temp_file = fs::File::create(&temp_path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to create temp config file: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(|e| AppError::ConfigError {
                reason: format!("Failed to write temp config file: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        temp_file.sync_all().map_err(|e| AppError::ConfigError {
            reason: format!("Failed to sync temp config file: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        fs::rename(&temp_path, config_path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to rename temp config to final: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        info!(config_path = ?config_path, "Configuration saved (atomic write)");

        Ok(())
    }

    /// Directory for the rolling log files.
    #[track_caller]
    pub fn log_dir() -> AppResult<PathBuf> {
        Ok(Self::project_dirs()?.data_dir().join("logs"))
    }

    /// Chunk writer settings derived from this configuration.
    pub fn writer_settings(&self) -> WriterSettings {
        WriterSettings {
            rotation_bytes: self.writer.rotation_bytes,
            last_chunk_hold: Duration::from_millis(self.writer.last_chunk_hold_ms),
            ..WriterSettings::new(&self.storage.records_root)
        }
    }

    /// Cleanup settings derived from this configuration.
    pub fn cleanup_settings(&self) -> CleanupSettings {
        CleanupSettings {
            interval: Duration::from_secs(self.cleanup.interval_secs),
            cancel_grace: Duration::from_secs(self.cleanup.cancel_grace_secs),
        }
    }

    /// Time between upload scheduler ticks.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.upload.poll_interval_secs)
    }

    /// How long a completed recording keeps its progress entry.
    pub fn progress_retention(&self) -> Duration {
        Duration::from_secs(self.cleanup.progress_retention_secs)
    }

    #[track_caller]
    fn project_dirs() -> AppResult<ProjectDirs> {
        ProjectDirs::from("com", "reelsync", "ReelSync").ok_or_else(|| AppError::ConfigError {
            reason: "Failed to get project directories".to_string(),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}
