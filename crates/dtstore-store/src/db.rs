//! SQLite connection management
//!
//! `SqliteConnector` opens and removes store files; `SqliteBackend` owns one
//! connection and implements the dtstore-core store traits on it.

use crate::config::SqliteOptions;
use crate::errors::{close_error, delete_error, from_rusqlite, open_error, Result};
use dtstore_core::{
    ExError, Executor, ObjectId, Row, Sensitive, StoreBackend, StoreConnector, Value,
};
use rusqlite::config::DbConfig;
use rusqlite::types::Value as SqlValue;
use rusqlite::{
    params_from_iter, Connection, DatabaseName, OpenFlags, OptionalExtension, TransactionBehavior,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Files SQLite may keep next to the main database file
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Real(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Blob(v) => SqlValue::Blob(v.clone()),
    }
}

fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(v),
        SqlValue::Real(v) => Value::Real(v),
        SqlValue::Text(v) => Value::Text(v),
        SqlValue::Blob(v) => Value::Blob(v),
    }
}

/// Statement execution over a borrowed connection or transaction
pub struct SqliteExecutor<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteExecutor<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl Executor for SqliteExecutor<'_> {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize> {
        tracing::debug!(sql, params = params.len(), "execute");
        self.conn
            .execute(sql, params_from_iter(params.iter().map(to_sql)))
            .map_err(from_rusqlite)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        tracing::debug!(sql, "execute_batch");
        self.conn.execute_batch(sql).map_err(from_rusqlite)
    }

    fn insert(&mut self, sql: &str, params: &[Value]) -> Result<ObjectId> {
        self.execute(sql, params)?;
        Ok(ObjectId::new(self.conn.last_insert_rowid()))
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        tracing::debug!(sql, params = params.len(), "query");
        let mut stmt = self.conn.prepare(sql).map_err(from_rusqlite)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_sql)))
            .map_err(from_rusqlite)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(from_rusqlite)? {
            let values = (0..columns.len())
                .map(|i| row.get::<_, SqlValue>(i).map(from_sql))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(from_rusqlite)?;
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }
}

/// One open SQLite store
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// The underlying connection, for pragmas or statements outside the
    /// entity API
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn executor(&self) -> SqliteExecutor<'_> {
        SqliteExecutor::new(&self.conn)
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.conn.path())
            .field("autocommit", &self.conn.is_autocommit())
            .finish()
    }
}

impl Executor for SqliteBackend {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize> {
        self.executor().execute(sql, params)
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.executor().execute_batch(sql)
    }

    fn insert(&mut self, sql: &str, params: &[Value]) -> Result<ObjectId> {
        self.executor().insert(sql, params)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.executor().query(sql, params)
    }
}

impl StoreBackend for SqliteBackend {
    fn with_transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Executor) -> Result<T>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(from_rusqlite)?;

        let outcome = f(&mut SqliteExecutor::new(&tx));
        match outcome {
            Ok(value) => {
                tx.commit().map_err(from_rusqlite)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::debug!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    fn is_in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn close(self) -> std::result::Result<(), (Self, ExError)> {
        if self.is_in_transaction() {
            return Err((self, close_error("A transaction is still open")));
        }
        self.conn
            .close()
            .map_err(|(conn, err)| (SqliteBackend { conn }, close_error(err.to_string())))
    }
}

/// Opens SQLite stores with a fixed set of options
#[derive(Debug, Clone, Default)]
pub struct SqliteConnector {
    options: SqliteOptions,
}

impl SqliteConnector {
    pub fn new(options: SqliteOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }

    fn configure(&self, conn: &Connection) -> rusqlite::Result<()> {
        // A misspelled "column" must fail instead of becoming a string literal
        conn.set_db_config(DbConfig::SQLITE_DBCONFIG_DQS_DML, false)?;
        conn.set_db_config(DbConfig::SQLITE_DBCONFIG_DQS_DDL, false)?;
        conn.pragma_update(None, "foreign_keys", self.options.foreign_keys)?;
        conn.busy_timeout(self.options.busy_timeout())?;

        let requested = self.options.journal_mode.pragma_value();
        let applied: String =
            conn.pragma_update_and_check(None, "journal_mode", requested, |row| row.get(0))?;
        if !applied.eq_ignore_ascii_case(requested) {
            tracing::debug!(requested, applied = %applied, "journal mode not applied");
        }
        Ok(())
    }
}

impl StoreConnector for SqliteConnector {
    type Backend = SqliteBackend;

    fn connect(&self, path: &Path, key: Option<&Sensitive<String>>) -> Result<SqliteBackend> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| open_error(path, e))?;

        if let Some(key) = key {
            conn.pragma_update(None, "key", key.expose().as_str())
                .map_err(|e| open_error(path, e))?;

            // Plain SQLite ignores `PRAGMA key`; only SQLCipher answers this
            let cipher: Option<String> = conn
                .query_row("PRAGMA cipher_version", [], |row| row.get(0))
                .optional()
                .map_err(|e| open_error(path, e))?;
            if cipher.is_none() {
                return Err(open_error(
                    path,
                    "an encryption key was supplied but SQLite was built without SQLCipher",
                ));
            }
        }

        // First read of the file: fails for non-databases and wrong keys
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| open_error(path, e))?;

        // READ_WRITE falls back to read-only when the file cannot be written
        if conn
            .is_readonly(DatabaseName::Main)
            .map_err(|e| open_error(path, e))?
        {
            return Err(open_error(path, "store file is read-only"));
        }

        self.configure(&conn).map_err(|e| open_error(path, e))?;

        tracing::debug!(
            path = %path.display(),
            encrypted = key.is_some(),
            journal_mode = self.options.journal_mode.pragma_value(),
            "sqlite store connected"
        );
        Ok(SqliteBackend { conn })
    }

    fn destroy(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path).map_err(|e| delete_error(path, e))?;

        for suffix in SIDECAR_SUFFIXES {
            let sidecar = sidecar_path(path, suffix);
            match std::fs::remove_file(&sidecar) {
                Ok(()) => tracing::debug!(path = %sidecar.display(), "sidecar removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(delete_error(&sidecar, e)),
            }
        }
        Ok(())
    }
}

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
