//! Persistence manager
//!
//! The façade callers hold: it owns the class and codec registries and at
//! most one open store, and implements open/close/delete of the store plus
//! save/load/delete/query of entities.
//!
//! ## Logging Ownership
//!
//! The manager owns lifecycle logging for its public store and entity
//! operations:
//! - `log_op_start!` at entry
//! - `log_op_end!` on success
//! - `log_op_error!` on failure
//!
//! Registries and store collaborators use only `tracing::debug!()`.

pub mod statements;

use crate::backend::{Executor, StoreBackend, StoreConnector};
use crate::class_registry::{ManagedClassEntry, ManagedClassRegistry};
use crate::codec::{Codec, CodecResolution, CodecScope, TypeCodecRegistry};
use crate::errors::{DtsError, ExError, ExErrorKind, Result};
use crate::migration::{self, SchemaMigration};
use crate::model::descriptor::{EntityDescriptor, PropertyDescriptor};
use crate::model::{Persistable, OBJECT_ID_COLUMN};
use crate::value::{RowParams, Value};
use crate::{log_op_end, log_op_error, log_op_start};
use dtstore_core_types::{ObjectId, SchemaVersion, Sensitive};
use statements::Predicate;
use std::any::{type_name, TypeId};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Equality predicate for identifier queries
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFilter {
    pub property: String,
    pub value: Value,
}

impl PropertyFilter {
    /// Match rows whose `property` column equals `value`; `Value::Null`
    /// matches NULL columns
    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}

/// Identifier order of query results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Persistence façade over one store collaborator
///
/// Lifecycle: construct, register classes and codecs, `open`, use, `close`.
/// Registrations survive close and reopen.
pub struct PersistenceManager<C: StoreConnector> {
    connector: C,
    classes: ManagedClassRegistry,
    codecs: TypeCodecRegistry,
    store: Option<C::Backend>,
    path: Option<PathBuf>,
    schema_version: Option<SchemaVersion>,
}

impl<C: StoreConnector> PersistenceManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            classes: ManagedClassRegistry::new(),
            codecs: TypeCodecRegistry::new(),
            store: None,
            path: None,
            schema_version: None,
        }
    }

    // ===== Registration =====

    /// Make entity type `E` persistable
    ///
    /// # Errors
    ///
    /// `Configuration` when a store is open or the class is rejected by the
    /// registry (duplicate, empty or colliding table, invalid properties).
    pub fn register_managed_class<E: Persistable>(&mut self) -> Result<()> {
        if self.store.is_some() {
            return Err(DtsError::RegistrationAfterOpen {
                subject: format!("class {}", type_name::<E>()),
            }
            .into());
        }
        self.classes.register::<E>()?;
        Ok(())
    }

    /// Register a codec for a type name or an entity class
    ///
    /// A later registration for the same scope replaces the earlier one.
    ///
    /// # Errors
    ///
    /// `Configuration` when a store is open.
    pub fn register_codec(&mut self, codec: Codec, scope: CodecScope) -> Result<()> {
        if self.store.is_some() {
            return Err(DtsError::RegistrationAfterOpen {
                subject: scope.describe(),
            }
            .into());
        }
        self.codecs.register(scope, codec);
        Ok(())
    }

    pub fn classes(&self) -> &ManagedClassRegistry {
        &self.classes
    }

    pub fn codecs(&self) -> &TypeCodecRegistry {
        &self.codecs
    }

    // ===== Store lifecycle =====

    /// Open or create the store at `path` and negotiate its schema version
    ///
    /// `migrate` runs on every open, inside one transaction with the version
    /// write; it receives the stored version (zero for a new store) and
    /// returns the version the store is at afterwards.
    ///
    /// # Errors
    ///
    /// `StorageOpen` if a store is already open or the file cannot be opened
    /// as a writable database; `Migration` if the procedure fails, moves the
    /// version backwards, or the version cannot be written. Nothing is kept
    /// open on failure.
    pub fn open<M: SchemaMigration>(
        &mut self,
        path: impl AsRef<Path>,
        migrate: M,
    ) -> Result<SchemaVersion> {
        self.open_with(path.as_ref(), None, migrate)
    }

    /// Like [`open`](Self::open), forwarding an encryption key to the store
    ///
    /// # Errors
    ///
    /// As for `open`; a wrong key, or a store engine without encryption
    /// support, surfaces as `StorageOpen`.
    pub fn open_encrypted<M: SchemaMigration>(
        &mut self,
        path: impl AsRef<Path>,
        key: impl Into<Sensitive<String>>,
        migrate: M,
    ) -> Result<SchemaVersion> {
        let key = key.into();
        self.open_with(path.as_ref(), Some(&key), migrate)
    }

    fn open_with<M: SchemaMigration>(
        &mut self,
        path: &Path,
        key: Option<&Sensitive<String>>,
        migrate: M,
    ) -> Result<SchemaVersion> {
        log_op_start!("open", path = %path.display(), encrypted = key.is_some());
        let start = Instant::now();

        let version = self.open_impl(path, key, migrate).map_err(|e| {
            log_op_error!(
                "open",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "open",
            duration_ms = start.elapsed().as_millis() as u64,
            schema_version = version.get()
        );
        Ok(version)
    }

    fn open_impl<M: SchemaMigration>(
        &mut self,
        path: &Path,
        key: Option<&Sensitive<String>>,
        migrate: M,
    ) -> Result<SchemaVersion> {
        if self.store.is_some() {
            return Err(DtsError::StoreAlreadyOpen {
                path: self
                    .path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            }
            .into());
        }

        let mut backend = self.connector.connect(path, key)?;
        self.path = Some(path.to_path_buf());

        match migration::run_migration(&mut backend, migrate) {
            Ok(outcome) => {
                tracing::debug!(
                    previous = outcome.previous.get(),
                    current = outcome.current.get(),
                    "schema version negotiated"
                );
                self.store = Some(backend);
                self.schema_version = Some(outcome.current);
                Ok(outcome.current)
            }
            Err(err) => {
                if let Err((_, close_err)) = backend.close() {
                    tracing::debug!(error = %close_err, "close after failed migration");
                }
                Err(err)
            }
        }
    }

    /// Release the open store
    ///
    /// # Errors
    ///
    /// `NotOpen` without a store; `StorageClose` when pending work blocks
    /// the close, in which case the store stays open.
    pub fn close(&mut self) -> Result<()> {
        log_op_start!("close");
        let start = Instant::now();

        self.close_impl().map_err(|e| {
            log_op_error!(
                "close",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!("close", duration_ms = start.elapsed().as_millis() as u64);
        Ok(())
    }

    fn close_impl(&mut self) -> Result<()> {
        let backend = self.store.take().ok_or_else(|| not_open("close"))?;
        match backend.close() {
            Ok(()) => {
                self.schema_version = None;
                Ok(())
            }
            Err((backend, err)) => {
                self.store = Some(backend);
                Err(err)
            }
        }
    }

    /// Close the store if open and remove its backing file
    ///
    /// # Errors
    ///
    /// `StorageDelete` when no store path was ever opened, the close is
    /// blocked, or the file cannot be removed.
    pub fn delete_store(&mut self) -> Result<()> {
        log_op_start!("delete_store");
        let start = Instant::now();

        self.delete_store_impl().map_err(|e| {
            log_op_error!(
                "delete_store",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "delete_store",
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(())
    }

    fn delete_store_impl(&mut self) -> Result<()> {
        if self.store.is_some() {
            self.close_impl()
                .map_err(|e| e.wrap(ExErrorKind::StorageDelete, "delete_store"))?;
        }
        let path = self.path.clone().ok_or(DtsError::NoStorePath)?;
        self.connector.destroy(&path)?;
        self.path = None;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    /// Schema version negotiated by the current open, `None` when closed
    pub fn schema_version(&self) -> Option<SchemaVersion> {
        self.schema_version
    }

    /// Path of the most recently opened store
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The open store handle, for statements outside the entity API
    ///
    /// # Errors
    ///
    /// `NotOpen` without a store.
    pub fn store_mut(&mut self) -> Result<&mut C::Backend> {
        self.store.as_mut().ok_or_else(|| not_open("store_mut"))
    }

    // ===== Entity operations =====

    /// Insert or update an entity, assigning its identifier on first save
    ///
    /// # Errors
    ///
    /// `NotOpen`, `Configuration` for an unmanaged type, `UnresolvedCodec`,
    /// `Serialization` from a codec, or `Storage` from the statement.
    pub fn save<E: Persistable>(&mut self, entity: &mut E) -> Result<ObjectId> {
        log_op_start!("save", table = E::table_name());
        let start = Instant::now();

        let id = self.save_impl(entity).map_err(|e| {
            log_op_error!(
                "save",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                table = E::table_name()
            );
            e
        })?;

        log_op_end!(
            "save",
            duration_ms = start.elapsed().as_millis() as u64,
            table = E::table_name(),
            object_id = id.get()
        );
        Ok(id)
    }

    fn save_impl<E: Persistable>(&mut self, entity: &mut E) -> Result<ObjectId> {
        let Self {
            classes,
            codecs,
            store,
            ..
        } = self;
        let store = store.as_mut().ok_or_else(|| not_open("save"))?;
        let descriptor = classes.descriptor::<E>()?;
        let table = descriptor.table_name();
        let params = encode_entity(codecs, descriptor, entity)?;

        match entity.object_id() {
            None => {
                let sql = statements::insert(table, params.columns());
                let values: Vec<Value> = params.values().cloned().collect();
                let id = store
                    .insert(&sql, &values)
                    .map_err(|e| e.with_table(table))?;
                entity.object_id_slot_mut().assign(id);
                Ok(id)
            }
            Some(id) => {
                let sql = statements::upsert(table, params.columns());
                let mut values = Vec::with_capacity(params.len() + 1);
                values.push(Value::Integer(id.get()));
                values.extend(params.values().cloned());
                store
                    .execute(&sql, &values)
                    .map_err(|e| e.with_table(table).with_object_id(id))?;
                Ok(id)
            }
        }
    }

    /// Load the entity stored under `id`, `None` when no such row exists
    ///
    /// # Errors
    ///
    /// `NotOpen`, `Configuration` for an unmanaged type, `UnresolvedCodec`,
    /// `Serialization` when a column does not fit its field, or `Storage`.
    pub fn load<E: Persistable>(&mut self, id: ObjectId) -> Result<Option<E>> {
        log_op_start!("load", table = E::table_name(), object_id = id.get());
        let start = Instant::now();

        let loaded = self.load_impl::<E>(id).map_err(|e| {
            log_op_error!(
                "load",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                table = E::table_name()
            );
            e
        })?;

        log_op_end!(
            "load",
            duration_ms = start.elapsed().as_millis() as u64,
            table = E::table_name(),
            found = loaded.is_some()
        );
        Ok(loaded)
    }

    fn load_impl<E: Persistable>(&mut self, id: ObjectId) -> Result<Option<E>> {
        let Self {
            classes,
            codecs,
            store,
            ..
        } = self;
        let store = store.as_mut().ok_or_else(|| not_open("load"))?;
        let descriptor = classes.descriptor::<E>()?;
        let table = descriptor.table_name();

        let rows = store
            .query(&statements::select_by_id(table), &[Value::Integer(id.get())])
            .map_err(|e| e.with_table(table).with_object_id(id))?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let mut entity = E::default();
        entity.object_id_slot_mut().assign(id);
        for property in descriptor.properties() {
            let codec = resolve(codecs, property)?;
            codec
                .deserialize(property.name(), &row, property.get_mut(&mut entity))
                .map_err(|e| in_property::<E>(e, property.name()).with_object_id(id))?;
        }
        Ok(Some(entity))
    }

    /// Remove an entity's row; the in-memory entity keeps its identifier
    ///
    /// # Errors
    ///
    /// `NotPersisted` when the entity was never saved, `NotOpen`,
    /// `Configuration` for an unmanaged type, or `Storage`.
    pub fn delete<E: Persistable>(&mut self, entity: &E) -> Result<()> {
        log_op_start!("delete", table = E::table_name());
        let start = Instant::now();

        self.delete_impl(entity).map_err(|e| {
            log_op_error!(
                "delete",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                table = E::table_name()
            );
            e
        })?;

        log_op_end!(
            "delete",
            duration_ms = start.elapsed().as_millis() as u64,
            table = E::table_name()
        );
        Ok(())
    }

    fn delete_impl<E: Persistable>(&mut self, entity: &E) -> Result<()> {
        let Self { classes, store, .. } = self;
        let store = store.as_mut().ok_or_else(|| not_open("delete"))?;
        let entry = classes.entry::<E>()?;
        let table = entry.table_name();

        let id = entity.object_id().ok_or_else(|| {
            ExError::from(DtsError::NotPersisted {
                entity: entry.entity_name().to_string(),
            })
            .with_op("delete")
            .with_table(table)
        })?;

        let removed = store
            .execute(&statements::delete_by_id(table), &[Value::Integer(id.get())])
            .map_err(|e| e.with_table(table).with_object_id(id))?;
        tracing::debug!(table, object_id = id.get(), removed, "row deleted");
        Ok(())
    }

    /// Identifiers of stored `E` rows, optionally filtered by one property
    ///
    /// # Errors
    ///
    /// `NotOpen`, `Storage`, or `Configuration` for an unmanaged type or a
    /// filter on a property that is undeclared or handled by a registered
    /// codec.
    pub fn query_ids<E: Persistable>(
        &mut self,
        filter: Option<PropertyFilter>,
        order: SortOrder,
    ) -> Result<Vec<ObjectId>> {
        log_op_start!("query_ids", table = E::table_name(), order = ?order);
        let start = Instant::now();

        let ids = self
            .query_ids_impl::<E>(filter.as_ref(), order)
            .map_err(|e| {
                log_op_error!(
                    "query_ids",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    table = E::table_name()
                );
                e
            })?;

        log_op_end!(
            "query_ids",
            duration_ms = start.elapsed().as_millis() as u64,
            table = E::table_name(),
            row_count = ids.len() as u64
        );
        Ok(ids)
    }

    fn query_ids_impl<E: Persistable>(
        &mut self,
        filter: Option<&PropertyFilter>,
        order: SortOrder,
    ) -> Result<Vec<ObjectId>> {
        let Self {
            classes,
            codecs,
            store,
            ..
        } = self;
        let store = store.as_mut().ok_or_else(|| not_open("query_ids"))?;
        let entry = classes.entry::<E>()?;
        let table = entry.table_name();

        let mut params = Vec::new();
        let predicate = match filter {
            None => None,
            Some(filter) if !is_filterable::<E>(codecs, entry, &filter.property) => {
                return Err(DtsError::UnknownFilterProperty {
                    entity: entry.entity_name().to_string(),
                    property: filter.property.clone(),
                }
                .into());
            }
            Some(filter) if filter.value.is_null() => Some(Predicate::IsNull(&filter.property)),
            Some(filter) => {
                params.push(filter.value.clone());
                Some(Predicate::Equals(&filter.property))
            }
        };

        let sql = statements::select_ids(table, predicate, order == SortOrder::Descending);
        let rows = store
            .query(&sql, &params)
            .map_err(|e| e.with_table(table))?;

        rows.iter()
            .map(|row| -> Result<ObjectId> {
                match row.value(OBJECT_ID_COLUMN)? {
                    Value::Integer(id) => Ok(ObjectId::new(*id)),
                    other => Err(DtsError::IncompatibleValue {
                        column: OBJECT_ID_COLUMN.to_string(),
                        expected: "INTEGER".to_string(),
                        found: other.type_label().to_string(),
                    }
                    .into()),
                }
            })
            .collect()
    }

    /// Every stored identifier of `E`, ascending
    ///
    /// # Errors
    ///
    /// As for [`query_ids`](Self::query_ids).
    pub fn all_ids<E: Persistable>(&mut self) -> Result<Vec<ObjectId>> {
        self.query_ids::<E>(None, SortOrder::Ascending)
    }

    /// Every stored identifier of `E`, descending
    ///
    /// # Errors
    ///
    /// As for [`query_ids`](Self::query_ids).
    pub fn all_ids_desc<E: Persistable>(&mut self) -> Result<Vec<ObjectId>> {
        self.query_ids::<E>(None, SortOrder::Descending)
    }

    /// Ascending identifiers of `E` rows whose `property` equals `value`
    ///
    /// # Errors
    ///
    /// As for [`query_ids`](Self::query_ids).
    pub fn ids_where<E: Persistable>(
        &mut self,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<ObjectId>> {
        self.query_ids::<E>(
            Some(PropertyFilter::eq(property, value)),
            SortOrder::Ascending,
        )
    }

    /// `CREATE TABLE` statement for `E`, for use inside migrations
    ///
    /// Works without an open store, so the text can be built before `open`
    /// and moved into the migration procedure.
    ///
    /// # Errors
    ///
    /// `Configuration` for an unmanaged type or when a property is handled
    /// by a registered codec, whose columns cannot be derived.
    pub fn create_table_sql<E: Persistable>(&self) -> Result<String> {
        let descriptor = self.classes.descriptor::<E>()?;

        let mut columns = Vec::with_capacity(descriptor.properties().len());
        for property in descriptor.properties() {
            match self.codecs.resolve(TypeId::of::<E>(), property.type_name()) {
                Some(CodecResolution::BuiltIn(kind)) => {
                    columns.push((property.name(), kind.column_type()));
                }
                _ => {
                    return Err(DtsError::UnderivableColumn {
                        entity: type_name::<E>().to_string(),
                        property: property.name().to_string(),
                        type_name: property.type_name().to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(statements::create_table(descriptor.table_name(), &columns))
    }
}

/// Only built-in codecs write a single column named after the property
fn is_filterable<E: Persistable>(
    codecs: &TypeCodecRegistry,
    entry: &ManagedClassEntry,
    property: &str,
) -> bool {
    entry.property_types().type_of(property).is_some_and(|type_name| {
        matches!(
            codecs.resolve(TypeId::of::<E>(), type_name),
            Some(CodecResolution::BuiltIn(_))
        )
    })
}

fn not_open(op: &str) -> ExError {
    DtsError::StoreNotOpen { op: op.to_string() }.into()
}

fn resolve<'r, E: Persistable>(
    codecs: &'r TypeCodecRegistry,
    property: &PropertyDescriptor<E>,
) -> Result<CodecResolution<'r>> {
    codecs
        .resolve(TypeId::of::<E>(), property.type_name())
        .ok_or_else(|| {
            DtsError::UnresolvedCodec {
                entity: type_name::<E>().to_string(),
                property: property.name().to_string(),
                type_name: property.type_name().to_string(),
            }
            .into()
        })
}

fn in_property<E: Persistable>(err: ExError, property: &str) -> ExError {
    let err = err.with_entity(type_name::<E>());
    if err.property().is_some() {
        err
    } else {
        err.with_property(property)
    }
}

/// Column values of `entity` in declaration order
fn encode_entity<E: Persistable>(
    codecs: &TypeCodecRegistry,
    descriptor: &EntityDescriptor<E>,
    entity: &E,
) -> Result<RowParams> {
    let mut params = RowParams::new();
    for property in descriptor.properties() {
        let codec = resolve(codecs, property)?;
        tracing::debug!(
            property = property.name(),
            scope = codec.scope_label(),
            "codec resolved"
        );
        codec
            .serialize(property.name(), property.get(entity), &mut params)
            .map_err(|e| in_property::<E>(e, property.name()))?;
    }
    Ok(params)
}
