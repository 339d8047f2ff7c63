//! Configuration for the `chatsync` engine.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. TOML config file (`~/.config/chatsync/config.toml`, or an explicit path)
//! 2. Compiled defaults
//!
//! A missing default config file is not an error (defaults are used). An
//! explicit path that doesn't exist is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chat::ChatOptions;
use crate::retry::{RetryPolicy, StoreGuard};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    store: StoreFileConfig,
    retry: RetryFileConfig,
    chat: ChatFileConfig,
    media: MediaFileConfig,
    logging: LoggingFileConfig,
}

/// `[store]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreFileConfig {
    call_timeout_ms: Option<u64>,
}

/// `[retry]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RetryFileConfig {
    max_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
}

/// `[chat]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    unique_requests: Option<bool>,
    image_summary: Option<String>,
    max_message_size: Option<usize>,
}

/// `[media]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct MediaFileConfig {
    max_download_bytes: Option<usize>,
}

/// `[logging]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LoggingFileConfig {
    level: Option<String>,
    file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Timeout and retry applied to every store call.
    pub store: StoreGuard,
    /// Chat subsystem options.
    pub chat: ChatOptions,
    /// Log level filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log file; `$TMPDIR/chatsync.log` when unset.
    pub log_file: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store: StoreGuard::default(),
            chat: ChatOptions::default(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl SyncConfig {
    /// Loads configuration from `explicit_path`, or from the default path
    /// if none is given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit file cannot be read, or if any
    /// file that was found cannot be parsed.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = load_config_file(explicit_path)?;
        Ok(Self::resolve(&file))
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseToml`] for invalid TOML.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents)?;
        Ok(Self::resolve(&file))
    }

    /// Resolves a parsed file against the compiled defaults.
    fn resolve(file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let retry_defaults = defaults.store.retry;

        Self {
            store: StoreGuard {
                timeout: file
                    .store
                    .call_timeout_ms
                    .map_or(defaults.store.timeout, Duration::from_millis),
                retry: RetryPolicy {
                    max_attempts: file
                        .retry
                        .max_attempts
                        .unwrap_or(retry_defaults.max_attempts),
                    initial_backoff: file
                        .retry
                        .initial_backoff_ms
                        .map_or(retry_defaults.initial_backoff, Duration::from_millis),
                    max_backoff: file
                        .retry
                        .max_backoff_ms
                        .map_or(retry_defaults.max_backoff, Duration::from_millis),
                },
            },
            chat: ChatOptions {
                unique_requests: file
                    .chat
                    .unique_requests
                    .unwrap_or(defaults.chat.unique_requests),
                image_summary: file
                    .chat
                    .image_summary
                    .clone()
                    .unwrap_or(defaults.chat.image_summary),
                max_message_size: file
                    .chat
                    .max_message_size
                    .unwrap_or(defaults.chat.max_message_size),
                max_download: file
                    .media
                    .max_download_bytes
                    .unwrap_or(defaults.chat.max_download),
            },
            log_level: file
                .logging
                .level
                .clone()
                .unwrap_or(defaults.log_level),
            log_file: file.logging.file.clone().or(defaults.log_file),
        }
    }
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist. Otherwise the default
/// path is tried and a missing file is treated as an empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("chatsync").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
