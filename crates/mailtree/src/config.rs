//! Store configuration
//!
//! Settings are resolved in order of priority:
//! 1. Environment variables (`MAILTREE_DB`, `MAILTREE_ORPHAN_GRACE_SECS`)
//! 2. JSON file (`mailtree.json` in the mailtree config directory)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Config filename in the mailtree config directory
pub const CONFIG_FILE: &str = "mailtree.json";

/// Default database filename inside the data directory
const DEFAULT_DB_FILE: &str = "mailtree.sqlite";

/// How `insert_child` keeps `rght` values of the rest of the tree in step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// Shift every ancestor and every node to the right by 2, so every
    /// stored tree stays a valid nested set.
    #[default]
    ShiftAncestors,
    /// Only the immediate parent's `rght` grows. Ancestors above the
    /// parent keep stale bounds once a tree is deeper than one level.
    ///
    /// This is the legacy insert of the earlier nested-set store, kept so
    /// trees written by it can be extended the same way.
    ParentOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; `None` means `<data dir>/mailtree.sqlite`
    pub db_path: Option<PathBuf>,
    /// zstd level for stored bodies
    pub compression_level: i32,
    /// Content younger than this is never swept, even when unreferenced
    pub orphan_grace_secs: u64,
    /// How long a writer waits for the database lock
    pub busy_timeout_ms: u64,
    /// Deepest accepted MIME nesting (root part is depth 0)
    pub max_part_depth: usize,
    pub insert_mode: InsertMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            compression_level: 3,
            orphan_grace_secs: 3600,
            busy_timeout_ms: 5000,
            max_part_depth: 64,
            insert_mode: InsertMode::default(),
        }
    }
}

impl StoreConfig {
    /// Load from the config file (if present) and apply environment overrides
    pub fn load() -> Result<Self> {
        let config: Self = config::load_json_or_default(CONFIG_FILE)?;
        config.with_env_overrides()
    }

    /// Load from an explicit file and apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Self = config::load_json_file(path)?;
        config.with_env_overrides()
    }

    /// Write the built-in defaults to the config directory unless a config
    /// file is already there. Returns the path written, if any.
    pub fn write_default_file() -> Result<Option<PathBuf>> {
        if config::config_exists(CONFIG_FILE) {
            return Ok(None);
        }
        config::save_json(CONFIG_FILE, &Self::default()).map(Some)
    }

    /// Parse a config from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse store config JSON")
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(db) = std::env::var_os("MAILTREE_DB").filter(|v| !v.is_empty()) {
            self.db_path = Some(PathBuf::from(db));
        }
        if let Ok(grace) = std::env::var("MAILTREE_ORPHAN_GRACE_SECS") {
            self.orphan_grace_secs = grace
                .trim()
                .parse()
                .context("MAILTREE_ORPHAN_GRACE_SECS must be a whole number of seconds")?;
        }
        Ok(self)
    }

    /// Resolve the database path, creating the data directory if needed
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config::ensure_data_dir()?.join(DEFAULT_DB_FILE)),
        }
    }

    pub fn orphan_grace(&self) -> Duration {
        Duration::from_secs(self.orphan_grace_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
