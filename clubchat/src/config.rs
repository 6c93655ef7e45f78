//! Configuration for the sync engine.
//!
//! Layered with the following priority (highest first):
//! 1. Values set programmatically by the embedding application
//! 2. TOML config file (`~/.config/clubchat/config.toml`)
//! 3. Compiled defaults
//!
//! A missing config file is not an error (defaults are used). An explicit
//! path that doesn't exist is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

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

/// `[sync]` section of the config file (all fields optional for partial
/// overrides).
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    page_size: Option<usize>,
    send_timeout_secs: Option<u64>,
    jump_search_max_pages: Option<usize>,
    event_buffer: Option<usize>,
    missed_buffer_cap: Option<usize>,
}

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    sync: SyncFileConfig,
}

/// Fully resolved sync engine configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Number of messages per history page.
    pub page_size: usize,
    /// How long an outgoing send may wait for server confirmation before
    /// the placeholder is marked failed.
    pub send_timeout: Duration,
    /// Maximum pages fetched while searching for a jump target before
    /// giving up.
    pub jump_search_max_pages: usize,
    /// Capacity of the session event channel toward the UI.
    pub event_buffer: usize,
    /// Maximum messages buffered while history is still loading.
    pub missed_buffer_cap: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            send_timeout: Duration::from_secs(10),
            jump_search_max_pages: 20,
            event_buffer: 64,
            missed_buffer_cap: 512,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file merged over defaults.
    ///
    /// With `path = None` the default location
    /// (`~/.config/clubchat/config.toml`) is tried and silently skipped
    /// if absent. An explicit path that cannot be read is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit config file cannot be read
    /// or any config file fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = load_config_file(path)?;
        Ok(Self::resolve(&file))
    }

    /// Resolve a `SyncConfig` from a parsed config file over defaults.
    fn resolve(file: &ConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            page_size: file.sync.page_size.unwrap_or(defaults.page_size),
            send_timeout: file
                .sync
                .send_timeout_secs
                .map_or(defaults.send_timeout, Duration::from_secs),
            jump_search_max_pages: file
                .sync
                .jump_search_max_pages
                .unwrap_or(defaults.jump_search_max_pages),
            event_buffer: file.sync.event_buffer.unwrap_or(defaults.event_buffer),
            missed_buffer_cap: file
                .sync
                .missed_buffer_cap
                .unwrap_or(defaults.missed_buffer_cap),
        }
    }
}

/// Load and parse the TOML config file.
///
/// Explicit path: must exist and parse. Default path: missing file is
/// treated as an empty config.
fn load_config_file(explicit: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let Some(config_dir) = dirs::config_dir() else {
                return Ok(ConfigFile::default());
            };
            let default_path = config_dir.join("clubchat").join("config.toml");
            if !default_path.exists() {
                return Ok(ConfigFile::default());
            }
            default_path
        }
    };

    let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
        path: path.clone(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}
