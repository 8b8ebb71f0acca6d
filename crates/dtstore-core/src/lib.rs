//! dtstore Core - typed entity persistence engine
//!
//! This crate maps caller-defined entity types onto rows of a relational
//! store:
//! - `Persistable` contract and per-type property descriptors
//! - Managed class registry and codec registry with built-in scalar codecs
//! - Schema migration protocol with a persisted version counter
//! - `PersistenceManager` façade for open/close/save/load/delete/query
//!
//! The relational engine is reached only through the traits in [`backend`];
//! `dtstore-store` provides the SQLite implementation.

pub mod backend;
pub mod class_registry;
pub mod codec;
pub mod errors;
pub mod logging_facility;
pub mod manager;
pub mod migration;
pub mod model;
pub mod value;

// Re-export commonly used types
pub use backend::{Executor, StoreBackend, StoreConnector};
pub use class_registry::{ManagedClassEntry, ManagedClassRegistry};
pub use codec::{BuiltinKind, Codec, CodecResolution, CodecScope, TypeCodecRegistry};
pub use dtstore_core_types::{ObjectId, SchemaVersion, Sensitive};
pub use errors::{DtsError, ExError, ExErrorKind, Result};
pub use manager::{PersistenceManager, PropertyFilter, SortOrder};
pub use migration::{MigrationPlan, SchemaMigration};
pub use model::{
    ObjectIdSlot, Persistable, PropertyMapBuilder, PropertyType, PropertyTypeMap,
    OBJECT_ID_COLUMN,
};
pub use value::{Row, RowParams, Value};
