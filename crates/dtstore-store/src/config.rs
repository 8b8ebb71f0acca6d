//! Store connection settings

use crate::errors::{config_error, Result};
use serde::Deserialize;
use std::time::Duration;

/// SQLite `journal_mode` setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
    Truncate,
    Memory,
}

impl JournalMode {
    /// Pragma value, also what SQLite reports back once applied
    pub fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Wal => "wal",
            JournalMode::Delete => "delete",
            JournalMode::Truncate => "truncate",
            JournalMode::Memory => "memory",
        }
    }
}

/// Settings applied to every connection a `SqliteConnector` opens
///
/// ```
/// use dtstore_store::{JournalMode, SqliteOptions};
///
/// let options = SqliteOptions::from_toml_str("journal_mode = \"delete\"").unwrap();
/// assert_eq!(options.journal_mode, JournalMode::Delete);
/// assert!(options.foreign_keys);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqliteOptions {
    pub journal_mode: JournalMode,
    pub foreign_keys: bool,
    /// Busy timeout in milliseconds
    pub busy_timeout_ms: u64,
}

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            journal_mode: JournalMode::default(),
            foreign_keys: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl SqliteOptions {
    /// Parse options from TOML; absent keys keep their defaults
    ///
    /// # Errors
    ///
    /// `Configuration` on malformed TOML, unknown keys or bad values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(config_error)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
