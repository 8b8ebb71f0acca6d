//! dtstore Store - SQLite store collaborator
//!
//! Provides:
//! - `SqliteConnector` / `SqliteBackend` implementing the dtstore-core
//!   store traits on top of rusqlite
//! - `SqliteOptions` connection settings, loadable from TOML
//! - rusqlite error mapping into the canonical `ExError`

pub mod config;
pub mod db;
pub mod errors;

// Re-export key types
pub use config::{JournalMode, SqliteOptions};
pub use db::{SqliteBackend, SqliteConnector, SqliteExecutor};
pub use errors::Result;

/// Persistence manager over SQLite
pub type SqliteManager = dtstore_core::PersistenceManager<SqliteConnector>;
