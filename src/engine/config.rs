// Memory subsystem configuration.
// Loaded from `jarvis.toml`; every field is optional and falls back to the
// defaults in atoms::constants. Unknown keys are rejected so typos surface.

use crate::atoms::constants::*;
use crate::atoms::error::{MemoryError, MemoryResult};
use crate::engine::paths;
use crate::engine::summarizer::SummaryRules;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Directory holding the snapshot file and the database.
    pub data_dir: PathBuf,
    /// Working-set capacity (interactions).
    pub cache_max_size: usize,
    pub snapshot_file: String,
    pub database_file: String,
    pub retention: RetentionConfig,
    pub store: StoreConfig,
    /// Topic and key-point keyword tables.
    pub summarizer: SummaryRules,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            data_dir: paths::default_data_dir(),
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
            snapshot_file: DEFAULT_SNAPSHOT_FILE.to_string(),
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            retention: RetentionConfig::default(),
            store: StoreConfig::default(),
            summarizer: SummaryRules::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionConfig {
    /// Interactions older than this are folded into a PeriodSummary.
    pub max_age_days: u32,
    /// Cap on interactions kept after compaction.
    pub max_interactions: usize,
    /// Run retention after this many `record` calls (0 = only on demand).
    pub auto_every: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: DEFAULT_RETENTION_MAX_AGE_DAYS,
            max_interactions: DEFAULT_RETENTION_MAX_INTERACTIONS,
            auto_every: DEFAULT_AUTO_RETENTION_EVERY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub busy_timeout_ms: u64,
    pub write_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            write_retries: DEFAULT_WRITE_RETRIES,
        }
    }
}

impl MemoryConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Self::default() }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot_file)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(s: &str) -> MemoryResult<Self> {
        let config: MemoryConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> MemoryResult<Self> {
        if !path.exists() {
            info!("[memory] No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MemoryError::Config(format!("cannot read {:?}: {}", path, e)))?;
        let config = Self::from_toml_str(&raw)?;
        info!("[memory] Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> MemoryResult<()> {
        if self.cache_max_size == 0 {
            return Err(MemoryError::Config("cache_max_size must be at least 1".into()));
        }
        if self.snapshot_file.trim().is_empty() || self.database_file.trim().is_empty() {
            return Err(MemoryError::Config("snapshot_file and database_file must be non-empty".into()));
        }
        if self.snapshot_file == self.database_file {
            return Err(MemoryError::Config("snapshot_file and database_file must differ".into()));
        }
        Ok(())
    }
}
