use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./plants.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EngineConfig {
    /// Seconds between two evaluations of the same rule instance
    #[serde(default = "crate::util::get_default_interval")]
    pub interval: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval: crate::util::get_default_interval(),
        }
    }
}

impl EngineConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    pub engine: Option<EngineConfig>,
}

impl Config {
    pub fn storage(&self) -> StorageConfig {
        self.storage.clone().unwrap_or_default()
    }

    /// Engine settings with environment overrides applied
    pub fn engine(&self) -> EngineConfig {
        let mut engine = self.engine.clone().unwrap_or_default();
        if let Some(interval) = crate::util::get_interval_override() {
            trace!("evaluation interval overridden from environment: {interval}s");
            engine.interval = interval;
        }
        engine
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config = serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;

    if config.engine.as_ref().is_some_and(|engine| engine.interval == 0) {
        anyhow::bail!("engine.interval must be at least one second");
    }

    trace!("loaded config: {config:?}");
    Ok(config)
}
