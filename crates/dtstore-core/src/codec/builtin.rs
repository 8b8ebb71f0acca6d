//! Built-in codecs for the store's native scalar types
//!
//! Each kind writes one column named after the property. Fields may be the
//! plain Rust type or an `Option` of it; `None` maps to NULL.

use crate::errors::{DtsError, Result};
use crate::value::{Row, RowParams, Value};
use std::any::Any;

/// Default codec kinds, selected by declared type name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    /// i64, i32, u32
    Integer,
    /// f64, f32
    Real,
    /// bool, stored as 0/1
    Boolean,
    /// String
    Text,
    /// Vec<u8>
    Blob,
    /// `Value` passed through untouched
    Value,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 6] = [
        BuiltinKind::Integer,
        BuiltinKind::Real,
        BuiltinKind::Boolean,
        BuiltinKind::Text,
        BuiltinKind::Blob,
        BuiltinKind::Value,
    ];

    /// Match a declared type name, ignoring ASCII case
    pub fn from_type_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "integer" | "int" | "i32" | "i64" | "long" => Some(BuiltinKind::Integer),
            "real" | "float" | "double" | "f32" | "f64" => Some(BuiltinKind::Real),
            "boolean" | "bool" => Some(BuiltinKind::Boolean),
            "text" | "string" | "varchar" => Some(BuiltinKind::Text),
            "blob" | "bytes" | "data" => Some(BuiltinKind::Blob),
            "value" | "any" => Some(BuiltinKind::Value),
            _ => None,
        }
    }

    /// Canonical type name
    pub fn type_name(&self) -> &'static str {
        match self {
            BuiltinKind::Integer => "integer",
            BuiltinKind::Real => "real",
            BuiltinKind::Boolean => "boolean",
            BuiltinKind::Text => "text",
            BuiltinKind::Blob => "blob",
            BuiltinKind::Value => "value",
        }
    }

    /// Column type used in generated DDL; `None` leaves the column untyped
    pub fn column_type(&self) -> Option<&'static str> {
        match self {
            BuiltinKind::Integer | BuiltinKind::Boolean => Some("INTEGER"),
            BuiltinKind::Real => Some("REAL"),
            BuiltinKind::Text => Some("TEXT"),
            BuiltinKind::Blob => Some("BLOB"),
            BuiltinKind::Value => None,
        }
    }

    pub fn serialize(&self, key: &str, value: &dyn Any, params: &mut RowParams) -> Result<()> {
        let encoded = match self {
            BuiltinKind::Integer => encode::<i64>(value)
                .or_else(|| encode::<i32>(value))
                .or_else(|| encode::<u32>(value)),
            BuiltinKind::Real => encode::<f64>(value).or_else(|| encode::<f32>(value)),
            BuiltinKind::Boolean => encode::<bool>(value),
            BuiltinKind::Text => encode::<String>(value),
            BuiltinKind::Blob => encode::<Vec<u8>>(value),
            BuiltinKind::Value => encode::<Value>(value),
        };
        let encoded = encoded.ok_or_else(|| self.mismatch(key))?;
        params.insert(key, encoded);
        Ok(())
    }

    pub fn deserialize(&self, key: &str, row: &Row, target: &mut dyn Any) -> Result<()> {
        let stored = row.value(key)?;
        let outcome = match self {
            BuiltinKind::Integer => decode::<i64>(key, stored, target)
                .or_else(|| decode::<i32>(key, stored, target))
                .or_else(|| decode::<u32>(key, stored, target)),
            BuiltinKind::Real => decode::<f64>(key, stored, target)
                .or_else(|| decode::<f32>(key, stored, target)),
            BuiltinKind::Boolean => decode::<bool>(key, stored, target),
            BuiltinKind::Text => decode::<String>(key, stored, target),
            BuiltinKind::Blob => decode::<Vec<u8>>(key, stored, target),
            BuiltinKind::Value => decode::<Value>(key, stored, target),
        };
        outcome.unwrap_or_else(|| Err(self.mismatch(key)))
    }

    fn mismatch(&self, key: &str) -> crate::errors::ExError {
        DtsError::CodecTypeMismatch {
            property: key.to_string(),
            expected: format!("{} field", self.type_name()),
        }
        .into()
    }
}

/// A Rust type with a lossless mapping to a store value
trait Scalar: Any + Sized {
    const LABEL: &'static str;
    fn to_value(&self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
}

impl Scalar for i64 {
    const LABEL: &'static str = "INTEGER";
    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl Scalar for i32 {
    const LABEL: &'static str = "INTEGER";
    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|v| i32::try_from(v).ok())
    }
}

impl Scalar for u32 {
    const LABEL: &'static str = "INTEGER";
    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|v| u32::try_from(v).ok())
    }
}

impl Scalar for f64 {
    const LABEL: &'static str = "REAL";
    fn to_value(&self) -> Value {
        Value::Real(*self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl Scalar for f32 {
    const LABEL: &'static str = "REAL";
    fn to_value(&self) -> Value {
        Value::Real(f64::from(*self))
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64().map(|v| v as f32)
    }
}

impl Scalar for bool {
    const LABEL: &'static str = "INTEGER";
    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().map(|v| v != 0)
    }
}

impl Scalar for String {
    const LABEL: &'static str = "TEXT";
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl Scalar for Vec<u8> {
    const LABEL: &'static str = "BLOB";
    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }
    fn from_value(value: &Value) -> Option<Self> {
        value.as_blob().map(<[u8]>::to_vec)
    }
}

impl Scalar for Value {
    const LABEL: &'static str = "any value";
    fn to_value(&self) -> Value {
        self.clone()
    }
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

fn encode<T: Scalar>(value: &dyn Any) -> Option<Value> {
    if let Some(v) = value.downcast_ref::<T>() {
        return Some(v.to_value());
    }
    value
        .downcast_ref::<Option<T>>()
        .map(|v| v.as_ref().map_or(Value::Null, Scalar::to_value))
}

/// `None` when the target field is neither `T` nor `Option<T>`
fn decode<T: Scalar>(key: &str, stored: &Value, target: &mut dyn Any) -> Option<Result<()>> {
    if let Some(slot) = target.downcast_mut::<T>() {
        return Some(match T::from_value(stored) {
            Some(v) => {
                *slot = v;
                Ok(())
            }
            None => Err(incompatible::<T>(key, stored)),
        });
    }
    let slot = target.downcast_mut::<Option<T>>()?;
    if stored.is_null() {
        *slot = None;
        return Some(Ok(()));
    }
    Some(match T::from_value(stored) {
        Some(v) => {
            *slot = Some(v);
            Ok(())
        }
        None => Err(incompatible::<T>(key, stored)),
    })
}

fn incompatible<T: Scalar>(key: &str, stored: &Value) -> crate::errors::ExError {
    DtsError::IncompatibleValue {
        column: key.to_string(),
        expected: T::LABEL.to_string(),
        found: stored.type_label().to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trip<T: Any + Default>(kind: BuiltinKind, value: &T) -> T {
        let mut params = RowParams::new();
        kind.serialize("field", value, &mut params).unwrap();
        let row = Row::new(vec!["field".to_string()], params.values().cloned().collect());
        let mut out = T::default();
        kind.deserialize("field", &row, &mut out).unwrap();
        out
    }

    #[test]
    fn test_type_names_are_case_insensitive() {
        assert_eq!(BuiltinKind::from_type_name("TEXT"), Some(BuiltinKind::Text));
        assert_eq!(BuiltinKind::from_type_name("Int"), Some(BuiltinKind::Integer));
        assert_eq!(BuiltinKind::from_type_name("Point"), None);
    }

    #[test]
    fn test_canonical_names_resolve_to_themselves() {
        for kind in BuiltinKind::ALL {
            assert_eq!(BuiltinKind::from_type_name(kind.type_name()), Some(kind));
        }
    }

    #[test]
    fn test_option_none_is_null() {
        let mut params = RowParams::new();
        BuiltinKind::Text
            .serialize("nickname", &None::<String>, &mut params)
            .unwrap();
        assert_eq!(params.get("nickname"), Some(&Value::Null));

        assert_eq!(round_trip(BuiltinKind::Text, &None::<String>), None);
        assert_eq!(
            round_trip(BuiltinKind::Integer, &Some(7i32)),
            Some(7i32)
        );
    }

    #[test]
    fn test_null_into_plain_field_fails() {
        let row = Row::new(vec!["count".to_string()], vec![Value::Null]);
        let mut count = 0i64;
        let err = BuiltinKind::Integer
            .deserialize("count", &row, &mut count)
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ExErrorKind::Serialization);
    }

    #[test]
    fn test_wrong_field_type_fails() {
        let mut params = RowParams::new();
        let err = BuiltinKind::Boolean
            .serialize("flag", &"yes".to_string(), &mut params)
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::ExErrorKind::Serialization);
    }

    #[test]
    fn test_value_passes_through() {
        let blob = Value::Blob(vec![0, 1, 2]);
        assert_eq!(round_trip(BuiltinKind::Value, &blob), blob);
    }

    proptest! {
        #[test]
        fn prop_integer_round_trip(v in any::<i64>()) {
            prop_assert_eq!(round_trip(BuiltinKind::Integer, &v), v);
        }

        #[test]
        fn prop_real_round_trip(v in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
            prop_assert_eq!(round_trip(BuiltinKind::Real, &v), v);
        }

        #[test]
        fn prop_boolean_round_trip(v in any::<bool>()) {
            prop_assert_eq!(round_trip(BuiltinKind::Boolean, &v), v);
        }

        #[test]
        fn prop_text_round_trip(v in ".*") {
            prop_assert_eq!(round_trip(BuiltinKind::Text, &v), v);
        }

        #[test]
        fn prop_blob_round_trip(v in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(round_trip(BuiltinKind::Blob, &v), v);
        }
    }
}
