// Daemon configuration file: `~/.labnote/config.toml`.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::editing::autosave::DEFAULT_MAX_CONTENT_BYTES;
use crate::editing::EditingOptions;
use crate::security::{ensure_owner_only_dir, ensure_owner_only_file};

const DEFAULT_IDLE_TIMEOUT_SEC: u64 = 30 * 60;
const MAX_IDLE_TIMEOUT_SEC: i64 = 10 * 365 * 24 * 60 * 60;
const DB_FILE_NAME: &str = "labnote.db";

/// Root directory for labnote state: `~/.labnote/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".labnote"))
}

/// Path to the config file: `~/.labnote/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

// ── Config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct DaemonConfig {
    pub storage: StorageConfig,
    pub sessions: SessionsConfig,
    pub autosave: AutosaveConfig,
}

impl DaemonConfig {
    /// Load from `~/.labnote/config.toml`. Returns defaults if the file
    /// doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        match global_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
            ensure_owner_only_dir(parent)
                .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io).and_then(|_| {
            ensure_owner_only_file(path)
                .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))
        })
    }

    /// Database location: `storage.db_path`, else `<base_dir>/labnote.db`.
    pub fn db_path(&self, base_dir: &Path) -> PathBuf {
        self.storage.db_path.clone().unwrap_or_else(|| base_dir.join(DB_FILE_NAME))
    }

    pub fn idle_timeout(&self) -> Duration {
        let secs = i64::try_from(self.sessions.idle_timeout_sec).unwrap_or(i64::MAX);
        Duration::seconds(secs.min(MAX_IDLE_TIMEOUT_SEC))
    }

    pub fn editing_options(&self) -> EditingOptions {
        EditingOptions { max_content_bytes: self.autosave.max_content_bytes }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Overrides `~/.labnote/labnote.db`.
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionsConfig {
    /// A session not seen for this long no longer protects its edit locks.
    pub idle_timeout_sec: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self { idle_timeout_sec: DEFAULT_IDLE_TIMEOUT_SEC }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AutosaveConfig {
    pub max_content_bytes: usize,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self { max_content_bytes: DEFAULT_MAX_CONTENT_BYTES }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
