use crate::codec::{BuiltinKind, Codec, CodecResolution, CodecScope};
use std::any::TypeId;
use std::collections::HashMap;

/// Registered codecs keyed by entity class and by declared type name
#[derive(Debug, Clone, Default)]
pub struct TypeCodecRegistry {
    by_class: HashMap<TypeId, Codec>,
    by_type: HashMap<String, Codec>,
}

impl TypeCodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec, returning the one it replaces for the same scope
    pub fn register(&mut self, scope: CodecScope, codec: Codec) -> Option<Codec> {
        let replaced = match &scope {
            CodecScope::Class { type_id, .. } => self.by_class.insert(*type_id, codec),
            CodecScope::Type(name) => self.by_type.insert(name.clone(), codec),
        };
        if replaced.is_some() {
            tracing::debug!(scope = %scope.describe(), "codec replaced");
        }
        replaced
    }

    /// Resolve the codec for one property of the entity identified by `entity`
    ///
    /// Order: class scope, then exact type name, then built-in kinds.
    pub fn resolve(&self, entity: TypeId, type_name: &str) -> Option<CodecResolution<'_>> {
        if let Some(codec) = self.by_class.get(&entity) {
            return Some(CodecResolution::Class(codec));
        }
        if let Some(codec) = self.by_type.get(type_name) {
            return Some(CodecResolution::Type(codec));
        }
        BuiltinKind::from_type_name(type_name).map(CodecResolution::BuiltIn)
    }

    pub fn has_class_codec(&self, entity: TypeId) -> bool {
        self.by_class.contains_key(&entity)
    }

    pub fn has_type_codec(&self, type_name: &str) -> bool {
        self.by_type.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.by_class.len() + self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
