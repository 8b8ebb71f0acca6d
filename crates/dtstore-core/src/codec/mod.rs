//! Property codecs
//!
//! A codec turns one property value into one or more columns of a
//! [`RowParams`] bag on save, and reads those columns back out of a [`Row`]
//! into the entity's field on load. Resolution order for a property is an
//! explicit ordered lookup: class scope of the declaring entity, then the
//! property's declared type name, then the built-in scalar kinds.

mod builtin;
mod registry;

pub use builtin::BuiltinKind;
pub use registry::TypeCodecRegistry;

use crate::errors::{DtsError, ExError, ExErrorKind, Result};
use crate::model::Persistable;
use crate::value::{Row, RowParams, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Type-erased serializer: (property key, field value, output bag)
pub type SerializeFn = dyn Fn(&str, &dyn Any, &mut RowParams) -> Result<()> + Send + Sync;

/// Type-erased deserializer: (property key, loaded row, field to fill)
pub type DeserializeFn = dyn Fn(&str, &Row, &mut dyn Any) -> Result<()> + Send + Sync;

/// Paired serialize/deserialize logic for a property type or entity class
#[derive(Clone)]
pub struct Codec {
    serialize: Arc<SerializeFn>,
    deserialize: Arc<DeserializeFn>,
}

impl Codec {
    /// Build a codec from type-erased procedures
    pub fn new<S, D>(serialize: S, deserialize: D) -> Self
    where
        S: Fn(&str, &dyn Any, &mut RowParams) -> Result<()> + Send + Sync + 'static,
        D: Fn(&str, &Row, &mut dyn Any) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            serialize: Arc::new(serialize),
            deserialize: Arc::new(deserialize),
        }
    }

    /// Build a codec for fields of type `T`
    ///
    /// Values of any other Rust type are rejected with a serialization error.
    ///
    /// ```
    /// use dtstore_core::{Codec, Value};
    ///
    /// #[derive(Debug, Default, Clone, PartialEq)]
    /// struct Point { x: i64, y: i64 }
    ///
    /// let codec = Codec::for_type::<Point, _, _>(
    ///     |key, p, params| {
    ///         params.insert(format!("{key}_x"), p.x);
    ///         params.insert(format!("{key}_y"), p.y);
    ///         Ok(())
    ///     },
    ///     |key, row| {
    ///         Ok(Point {
    ///             x: row.value(&format!("{key}_x"))?.as_i64().unwrap_or_default(),
    ///             y: row.value(&format!("{key}_y"))?.as_i64().unwrap_or_default(),
    ///         })
    ///     },
    /// );
    /// # let _ = codec;
    /// ```
    pub fn for_type<T, S, D>(serialize: S, deserialize: D) -> Self
    where
        T: Any,
        S: Fn(&str, &T, &mut RowParams) -> Result<()> + Send + Sync + 'static,
        D: Fn(&str, &Row) -> Result<T> + Send + Sync + 'static,
    {
        Self::new(
            move |key: &str, value: &dyn Any, params: &mut RowParams| {
                let value = value
                    .downcast_ref::<T>()
                    .ok_or_else(|| type_mismatch::<T>(key))?;
                serialize(key, value, params)
            },
            move |key: &str, row: &Row, target: &mut dyn Any| {
                let decoded = deserialize(key, row)?;
                let slot = target
                    .downcast_mut::<T>()
                    .ok_or_else(|| type_mismatch::<T>(key))?;
                *slot = decoded;
                Ok(())
            },
        )
    }

    /// Store any serde type as a JSON text column named after the property
    pub fn json<T>() -> Self
    where
        T: Serialize + DeserializeOwned + Any,
    {
        Self::for_type::<T, _, _>(
            |key, value, params| {
                let json = serde_json::to_string(value).map_err(|e| json_error(key, e))?;
                params.insert(key, Value::Text(json));
                Ok(())
            },
            |key, row| match row.value(key)? {
                Value::Text(json) => serde_json::from_str(json).map_err(|e| json_error(key, e)),
                Value::Null => serde_json::from_str("null").map_err(|e| json_error(key, e)),
                other => Err(DtsError::IncompatibleValue {
                    column: key.to_string(),
                    expected: "TEXT".to_string(),
                    found: other.type_label().to_string(),
                }
                .into()),
            },
        )
    }

    pub fn serialize(&self, key: &str, value: &dyn Any, params: &mut RowParams) -> Result<()> {
        (self.serialize)(key, value, params)
    }

    pub fn deserialize(&self, key: &str, row: &Row, target: &mut dyn Any) -> Result<()> {
        (self.deserialize)(key, row, target)
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

fn type_mismatch<T: Any>(key: &str) -> ExError {
    DtsError::CodecTypeMismatch {
        property: key.to_string(),
        expected: std::any::type_name::<T>().to_string(),
    }
    .into()
}

fn json_error(key: &str, err: serde_json::Error) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_property(key)
        .with_message(format!("JSON codec failed: {}", err))
}

/// Where a registered codec applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecScope {
    /// Every property of one entity class
    Class { type_id: TypeId, name: &'static str },
    /// Every property declared with this type name
    Type(String),
}

impl CodecScope {
    pub fn class<E: Persistable>() -> Self {
        CodecScope::Class {
            type_id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }

    pub fn type_name(name: impl Into<String>) -> Self {
        CodecScope::Type(name.into())
    }

    pub fn describe(&self) -> String {
        match self {
            CodecScope::Class { name, .. } => format!("class codec for {}", name),
            CodecScope::Type(name) => format!("type codec for {}", name),
        }
    }
}

/// Outcome of codec resolution for one property, most specific first
#[derive(Debug, Clone, Copy)]
pub enum CodecResolution<'a> {
    Class(&'a Codec),
    Type(&'a Codec),
    BuiltIn(BuiltinKind),
}

impl CodecResolution<'_> {
    pub fn serialize(&self, key: &str, value: &dyn Any, params: &mut RowParams) -> Result<()> {
        match self {
            CodecResolution::Class(codec) | CodecResolution::Type(codec) => {
                codec.serialize(key, value, params)
            }
            CodecResolution::BuiltIn(kind) => kind.serialize(key, value, params),
        }
    }

    pub fn deserialize(&self, key: &str, row: &Row, target: &mut dyn Any) -> Result<()> {
        match self {
            CodecResolution::Class(codec) | CodecResolution::Type(codec) => {
                codec.deserialize(key, row, target)
            }
            CodecResolution::BuiltIn(kind) => kind.deserialize(key, row, target),
        }
    }

    /// Short label of the winning scope, for debug logging
    pub fn scope_label(&self) -> &'static str {
        match self {
            CodecResolution::Class(_) => "class",
            CodecResolution::Type(_) => "type",
            CodecResolution::BuiltIn(_) => "builtin",
        }
    }
}
