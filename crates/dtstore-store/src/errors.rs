//! Error handling for dtstore-store
//!
//! Maps rusqlite and filesystem failures onto dtstore-core `ExError` kinds

use dtstore_core::errors::{ExError, ExErrorKind};
use std::path::Path;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Statement failure on an open store
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Storage)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Failure while opening, keying or validating a store file
pub fn open_error(path: &Path, err: impl std::fmt::Display) -> ExError {
    ExError::new(ExErrorKind::StorageOpen)
        .with_op("open")
        .with_message(format!("Cannot open store {}: {}", path.display(), err))
}

/// Close refused or failed
pub fn close_error(reason: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::StorageClose)
        .with_op("close")
        .with_message(reason)
}

/// Store file removal failure
pub fn delete_error(path: &Path, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::StorageDelete)
        .with_op("delete_store")
        .with_message(format!("Cannot remove {}: {}", path.display(), err))
}

/// Invalid store configuration
pub fn config_error(err: toml::de::Error) -> ExError {
    ExError::new(ExErrorKind::Configuration)
        .with_op("load_options")
        .with_message(format!("Invalid store options: {}", err))
}
