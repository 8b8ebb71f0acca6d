use dtstore_core_types::{ObjectId, SchemaVersion};
use thiserror::Error;

/// Result type alias using the canonical ExError
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every failure surfaced by the engine carries exactly one kind. Each kind
/// maps to a stable error code usable in tests and by callers that branch
/// on failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Registration / usage
    /// Registration ordering or uniqueness violation, unmanaged class, bad filter
    Configuration,
    /// A property has no class, type or built-in codec
    UnresolvedCodec,
    /// The operation needs an identifier the entity does not have
    NotPersisted,
    /// No store is open
    NotOpen,

    // Store lifecycle
    StorageOpen,
    StorageClose,
    StorageDelete,
    Migration,

    // Statement execution and value conversion
    Storage,
    Serialization,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Configuration => "ERR_CONFIGURATION",
            ExErrorKind::UnresolvedCodec => "ERR_UNRESOLVED_CODEC",
            ExErrorKind::NotPersisted => "ERR_NOT_PERSISTED",
            ExErrorKind::NotOpen => "ERR_NOT_OPEN",
            ExErrorKind::StorageOpen => "ERR_STORAGE_OPEN",
            ExErrorKind::StorageClose => "ERR_STORAGE_CLOSE",
            ExErrorKind::StorageDelete => "ERR_STORAGE_DELETE",
            ExErrorKind::Migration => "ERR_MIGRATION",
            ExErrorKind::Storage => "ERR_STORAGE",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries a classification kind for programmatic handling plus optional
/// context (operation, entity type, table, property, object id).
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity: Option<String>,
    table: Option<String>,
    property: Option<String>,
    object_id: Option<ObjectId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity: None,
            table: None,
            property: None,
            object_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity type context
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Add table context
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add property context
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// Add object id context
    pub fn with_object_id(mut self, object_id: ObjectId) -> Self {
        self.object_id = Some(object_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Re-classify under a new kind, keeping the original as source
    pub fn wrap(self, kind: ExErrorKind, op: impl Into<String>) -> Self {
        let message = self.message.clone();
        ExError::new(kind)
            .with_op(op)
            .with_message(message)
            .with_source(self)
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        self.object_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity) = &self.entity {
            write!(f, " (entity: {})", entity)?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {})", table)?;
        }
        if let Some(property) = &self.property {
            write!(f, " (property: {})", property)?;
        }
        if let Some(object_id) = self.object_id {
            write!(f, " (object_id: {})", object_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Specific failures raised by the engine
///
/// Each variant converts into an [`ExError`] with a stable kind; public APIs
/// return `ExError`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DtsError {
    // ===== Registration =====
    /// Registration attempted while a store is open
    #[error("Cannot register {subject} after the store is open")]
    RegistrationAfterOpen { subject: String },

    /// Entity type registered twice
    #[error("Class already registered: {entity}")]
    ClassAlreadyRegistered { entity: String },

    /// Two entity types claim the same table
    #[error("Table {table} of {entity} is already used by {existing}")]
    TableNameCollision {
        table: String,
        entity: String,
        existing: String,
    },

    /// Entity declares an empty table name
    #[error("Class {entity} declares an empty table name")]
    EmptyTableName { entity: String },

    /// Property declared twice on the same entity
    #[error("Property {property} declared twice on {entity}")]
    DuplicateProperty { entity: String, property: String },

    /// Property collides with the engine-managed identifier column
    #[error("Property {property} on {entity} collides with the identifier column")]
    ReservedProperty { entity: String, property: String },

    // ===== Usage =====
    /// Entity type was never registered
    #[error("Class is not managed: {entity}")]
    ClassNotManaged { entity: String },

    /// Query filter names a property the entity does not declare, or one
    /// written by a custom codec and so without a column of its own
    #[error("Cannot filter {entity} on property {property}")]
    UnknownFilterProperty { entity: String, property: String },

    /// DDL requested for an entity with custom-coded properties
    #[error("Cannot derive columns for {property} ({type_name}) on {entity}")]
    UnderivableColumn {
        entity: String,
        property: String,
        type_name: String,
    },

    /// No codec resolves for a property
    #[error("No codec for property {property} of type {type_name} on {entity}")]
    UnresolvedCodec {
        entity: String,
        property: String,
        type_name: String,
    },

    /// Entity has no identifier
    #[error("Entity {entity} has not been saved")]
    NotPersisted { entity: String },

    /// Operation requires an open store
    #[error("No store is open for {op}")]
    StoreNotOpen { op: String },

    /// Open called on a manager that already holds a store
    #[error("A store is already open at {path}")]
    StoreAlreadyOpen { path: String },

    /// Delete requested without any known store path
    #[error("No store path is known")]
    NoStorePath,

    // ===== Values =====
    /// Codec received a value of an unexpected Rust type
    #[error("Property {property} does not hold a {expected}")]
    CodecTypeMismatch { property: String, expected: String },

    /// Column missing from a loaded row
    #[error("Column {column} missing from row")]
    MissingColumn { column: String },

    /// Column value cannot convert into the target field
    #[error("Column {column} holds {found}, expected {expected}")]
    IncompatibleValue {
        column: String,
        expected: String,
        found: String,
    },

    // ===== Migration =====
    /// Migration procedure returned a version below the stored one
    #[error("Migration moved schema version backwards from {current} to {proposed}")]
    VersionRegression {
        current: SchemaVersion,
        proposed: SchemaVersion,
    },

    /// Stored schema version is not a valid counter
    #[error("Stored schema version is invalid: {reason}")]
    InvalidStoredVersion { reason: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Conversion from DtsError to ExError
impl From<DtsError> for ExError {
    fn from(err: DtsError) -> Self {
        let message = err.to_string();
        match err {
            DtsError::RegistrationAfterOpen { .. } => ExError::new(ExErrorKind::Configuration)
                .with_op("register")
                .with_message(message),

            DtsError::ClassAlreadyRegistered { entity }
            | DtsError::EmptyTableName { entity } => ExError::new(ExErrorKind::Configuration)
                .with_op("register_managed_class")
                .with_entity(entity)
                .with_message(message),

            DtsError::TableNameCollision { table, entity, .. } => {
                ExError::new(ExErrorKind::Configuration)
                    .with_op("register_managed_class")
                    .with_entity(entity)
                    .with_table(table)
                    .with_message(message)
            }

            DtsError::DuplicateProperty { entity, property }
            | DtsError::ReservedProperty { entity, property } => {
                ExError::new(ExErrorKind::Configuration)
                    .with_op("register_managed_class")
                    .with_entity(entity)
                    .with_property(property)
                    .with_message(message)
            }

            DtsError::ClassNotManaged { entity } => ExError::new(ExErrorKind::Configuration)
                .with_entity(entity)
                .with_message(message),

            DtsError::UnknownFilterProperty { entity, property } => {
                ExError::new(ExErrorKind::Configuration)
                    .with_op("query_ids")
                    .with_entity(entity)
                    .with_property(property)
                    .with_message(message)
            }

            DtsError::UnderivableColumn {
                entity, property, ..
            } => ExError::new(ExErrorKind::Configuration)
                .with_op("create_table_sql")
                .with_entity(entity)
                .with_property(property)
                .with_message(message),

            DtsError::UnresolvedCodec {
                entity, property, ..
            } => ExError::new(ExErrorKind::UnresolvedCodec)
                .with_entity(entity)
                .with_property(property)
                .with_message(message),

            DtsError::NotPersisted { entity } => ExError::new(ExErrorKind::NotPersisted)
                .with_entity(entity)
                .with_message(message),

            DtsError::StoreNotOpen { op } => ExError::new(ExErrorKind::NotOpen)
                .with_op(op)
                .with_message(message),

            DtsError::StoreAlreadyOpen { .. } => ExError::new(ExErrorKind::StorageOpen)
                .with_op("open")
                .with_message(message),

            DtsError::NoStorePath => ExError::new(ExErrorKind::StorageDelete)
                .with_op("delete_store")
                .with_message(message),

            DtsError::CodecTypeMismatch { property, .. } => {
                ExError::new(ExErrorKind::Serialization)
                    .with_property(property)
                    .with_message(message)
            }

            DtsError::MissingColumn { column } | DtsError::IncompatibleValue { column, .. } => {
                ExError::new(ExErrorKind::Serialization)
                    .with_property(column)
                    .with_message(message)
            }

            DtsError::VersionRegression { .. } | DtsError::InvalidStoredVersion { .. } => {
                ExError::new(ExErrorKind::Migration)
                    .with_op("migrate")
                    .with_message(message)
            }

            DtsError::Internal { .. } => ExError::new(ExErrorKind::Internal).with_message(message),
        }
    }
}
