use std::path::{Path, PathBuf};
use std::time::Duration;

use chorder_core::{DEFAULT_REPEAT, DEFAULT_TEMPO};
use chorder_services::storage::DEFAULT_NAMESPACE;
use chorder_services::{backend, FileStore, SchedulerConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// BPM for documents without a usable tempo
    pub tempo: u32,
    pub hush_before_ms: u64,
    pub grace_ms: u64,
    /// Bars per entry when the entry has no repeat count
    pub default_repeat: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            hush_before_ms: 150,
            grace_ms: 100,
            default_repeat: DEFAULT_REPEAT,
        }
    }
}

impl PlaybackConfig {
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            grace: Duration::from_millis(self.grace_ms),
            hush_before: Duration::from_millis(self.hush_before_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: Option<PathBuf>,
    pub namespace: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(FileStore::default_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: backend::DEFAULT_BASE_URL.to_string(),
            timeout_secs: backend::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chorder")
        .join("config.toml")
}

/// Missing file means defaults; a malformed one is reported and ignored
pub fn load_config(path: &Path) -> AppConfig {
    let Ok(text) = std::fs::read_to_string(path) else {
        return AppConfig::default();
    };
    match toml::from_str(&text) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed config");
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &Path, config: &AppConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}
