//! Schema migration protocol
//!
//! On every open the manager runs exactly one migration procedure inside a
//! single transaction:
//! 1. ensure the metadata table exists
//! 2. read the stored schema version (zero for a new store)
//! 3. call the procedure with an executor and the current version
//! 4. reject a returned version lower than the stored one
//! 5. persist the returned version
//!
//! Any failure rolls back the whole unit, so a store never records a
//! partially applied migration.

use crate::backend::{Executor, StoreBackend};
use crate::errors::{DtsError, ExError, ExErrorKind, Result};
use crate::value::Value;
use dtstore_core_types::SchemaVersion;

/// Reserved table holding engine metadata
pub const METADATA_TABLE: &str = "dts_metadata";

/// Metadata key of the schema version counter
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// A caller-supplied migration procedure
///
/// Receives the current version and returns the version the store is at
/// after the procedure's statements. Returning the input version is the
/// no-op case for an already migrated store.
pub trait SchemaMigration {
    fn migrate(self, exec: &mut dyn Executor, current: SchemaVersion) -> Result<SchemaVersion>;
}

impl<F> SchemaMigration for F
where
    F: FnOnce(&mut dyn Executor, SchemaVersion) -> Result<SchemaVersion>,
{
    fn migrate(self, exec: &mut dyn Executor, current: SchemaVersion) -> Result<SchemaVersion> {
        self(exec, current)
    }
}

/// One versioned batch of DDL/DML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub version: SchemaVersion,
    pub sql: String,
}

/// Ordered list of versioned migration steps
///
/// Applies every step above the store's current version, in version order.
///
/// ```
/// use dtstore_core::MigrationPlan;
///
/// let plan = MigrationPlan::new()
///     .step(2, "ALTER TABLE widgets ADD COLUMN color TEXT")
///     .step(1, "CREATE TABLE widgets (objectId INTEGER PRIMARY KEY, name TEXT)");
///
/// assert_eq!(plan.target().get(), 2);
/// assert_eq!(plan.steps()[0].version.get(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    steps: Vec<MigrationStep>,
}

impl MigrationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step that brings the store to `version`
    pub fn step(mut self, version: u32, sql: impl Into<String>) -> Self {
        self.steps.push(MigrationStep {
            version: SchemaVersion::new(version),
            sql: sql.into(),
        });
        self.steps.sort_by_key(|s| s.version);
        self
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Version reached once every step has run
    pub fn target(&self) -> SchemaVersion {
        self.steps
            .last()
            .map(|s| s.version)
            .unwrap_or(SchemaVersion::ZERO)
    }

    /// Apply the pending steps and return the resulting version
    pub fn apply(&self, exec: &mut dyn Executor, current: SchemaVersion) -> Result<SchemaVersion> {
        if let Some(pair) = self.steps.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(ExError::new(ExErrorKind::Migration)
                .with_op("migration_plan")
                .with_message(format!("Duplicate migration step {}", pair[0].version)));
        }

        let mut version = current;
        for step in self.steps.iter().filter(|s| s.version > current) {
            exec.execute_batch(&step.sql).map_err(|e| {
                ExError::new(ExErrorKind::Migration)
                    .with_op("migration_step")
                    .with_message(format!("Step {} failed: {}", step.version, e.message()))
                    .with_source(e)
            })?;
            tracing::debug!(schema_version = step.version.get(), "migration step applied");
            version = step.version;
        }
        Ok(version)
    }
}

impl SchemaMigration for MigrationPlan {
    fn migrate(self, exec: &mut dyn Executor, current: SchemaVersion) -> Result<SchemaVersion> {
        self.apply(exec, current)
    }
}

/// Versions before and after one open-time migration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub previous: SchemaVersion,
    pub current: SchemaVersion,
}

/// Run a migration procedure and persist its version in one transaction
pub fn run_migration<B, M>(backend: &mut B, migration: M) -> Result<MigrationOutcome>
where
    B: StoreBackend,
    M: SchemaMigration,
{
    backend
        .with_transaction(|exec| {
            ensure_metadata_table(exec)?;
            let previous = read_schema_version(exec)?;

            let current = migration.migrate(exec, previous)?;
            if current < previous {
                return Err(DtsError::VersionRegression {
                    current: previous,
                    proposed: current,
                }
                .into());
            }

            write_schema_version(exec, current)?;
            Ok(MigrationOutcome { previous, current })
        })
        .map_err(as_migration_error)
}

fn as_migration_error(err: ExError) -> ExError {
    if err.kind() == ExErrorKind::Migration {
        err
    } else {
        err.wrap(ExErrorKind::Migration, "migrate")
    }
}

/// Create the metadata table when missing
pub fn ensure_metadata_table(exec: &mut dyn Executor) -> Result<()> {
    exec.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            key TEXT PRIMARY KEY NOT NULL,
            value INTEGER NOT NULL
        )",
        METADATA_TABLE
    ))
}

/// Read the stored schema version, zero when never written
pub fn read_schema_version(exec: &mut dyn Executor) -> Result<SchemaVersion> {
    let rows = exec.query(
        &format!("SELECT value FROM {} WHERE key = ?1", METADATA_TABLE),
        &[Value::from(SCHEMA_VERSION_KEY)],
    )?;

    let Some(row) = rows.first() else {
        return Ok(SchemaVersion::ZERO);
    };

    match row.value("value")? {
        Value::Integer(raw) => u32::try_from(*raw).map(SchemaVersion::new).map_err(|_| {
            DtsError::InvalidStoredVersion {
                reason: format!("{} is out of range", raw),
            }
            .into()
        }),
        other => Err(DtsError::InvalidStoredVersion {
            reason: format!("expected INTEGER, found {}", other.type_label()),
        }
        .into()),
    }
}

/// Persist the schema version
pub fn write_schema_version(exec: &mut dyn Executor, version: SchemaVersion) -> Result<()> {
    exec.execute(
        &format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            METADATA_TABLE
        ),
        &[
            Value::from(SCHEMA_VERSION_KEY),
            Value::Integer(i64::from(version.get())),
        ],
    )?;
    Ok(())
}
