//! Store collaborator interface
//!
//! The relational engine is external to this crate. A collaborator provides
//! three pieces:
//! - [`StoreConnector`]: open-or-create at a path (optionally keyed) and
//!   delete the backing file
//! - [`StoreBackend`]: one open handle with transactions and close
//! - [`Executor`]: parameterized statements and queries, also handed to
//!   migration procedures

use crate::errors::{ExError, Result};
use crate::value::{Row, Value};
use dtstore_core_types::{ObjectId, Sensitive};
use std::path::Path;

/// Statement execution against an open store
pub trait Executor {
    /// Execute one parameterized statement, returning the affected row count
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize>;

    /// Execute a batch of unparameterized statements
    fn execute_batch(&mut self, sql: &str) -> Result<()>;

    /// Execute one INSERT and return the row identifier assigned by the store
    fn insert(&mut self, sql: &str, params: &[Value]) -> Result<ObjectId>;

    /// Run a parameterized query and collect every row
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;
}

/// An open store handle owned by exactly one manager
pub trait StoreBackend: Executor + Sized {
    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`
    fn with_transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Executor) -> Result<T>;

    /// Whether a transaction opened through raw statements is still pending
    fn is_in_transaction(&self) -> bool;

    /// Release the handle; on failure the handle is handed back
    fn close(self) -> std::result::Result<(), (Self, ExError)>;
}

/// Opens store handles and removes store files
pub trait StoreConnector {
    type Backend: StoreBackend;

    /// Open or create the store at `path`, applying `key` when supplied
    fn connect(&self, path: &Path, key: Option<&Sensitive<String>>) -> Result<Self::Backend>;

    /// Remove the store file at `path` and any sidecar files
    fn destroy(&self, path: &Path) -> Result<()>;
}
