//! Registry of entity classes the engine is allowed to persist

use crate::errors::{DtsError, Result};
use crate::model::{
    EntityDescriptor, Persistable, PropertyMapBuilder, PropertyTypeMap, OBJECT_ID_COLUMN,
};
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// One registered entity class
#[derive(Debug)]
pub struct ManagedClassEntry {
    type_id: TypeId,
    entity_name: &'static str,
    table_name: &'static str,
    property_types: PropertyTypeMap,
    descriptor: Box<dyn Any + Send + Sync>,
}

impl ManagedClassEntry {
    fn of<E: Persistable>() -> Self {
        let mut props = PropertyMapBuilder::<E>::new();
        E::describe(&mut props);
        let descriptor = props.build(E::table_name());

        Self {
            type_id: TypeId::of::<E>(),
            entity_name: std::any::type_name::<E>(),
            table_name: E::table_name(),
            property_types: descriptor.property_type_map(),
            descriptor: Box::new(descriptor),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name of the entity, used in errors and logs
    pub fn entity_name(&self) -> &'static str {
        self.entity_name
    }

    pub fn table_name(&self) -> &'static str {
        self.table_name
    }

    pub fn property_types(&self) -> &PropertyTypeMap {
        &self.property_types
    }

    /// Typed accessor table, `None` if `E` is not this entry's type
    pub fn descriptor<E: Persistable>(&self) -> Option<&EntityDescriptor<E>> {
        self.descriptor.downcast_ref::<EntityDescriptor<E>>()
    }

    fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(DtsError::EmptyTableName {
                entity: self.entity_name.to_string(),
            }
            .into());
        }

        let mut seen: Vec<String> = Vec::with_capacity(self.property_types.len());
        for property in &self.property_types {
            // SQLite column names are case-insensitive
            let folded = property.name.to_ascii_lowercase();
            if folded == OBJECT_ID_COLUMN.to_ascii_lowercase() {
                return Err(DtsError::ReservedProperty {
                    entity: self.entity_name.to_string(),
                    property: property.name.clone(),
                }
                .into());
            }
            if seen.contains(&folded) {
                return Err(DtsError::DuplicateProperty {
                    entity: self.entity_name.to_string(),
                    property: property.name.clone(),
                }
                .into());
            }
            seen.push(folded);
        }
        Ok(())
    }
}

/// Entity classes in registration order
#[derive(Debug, Default)]
pub struct ManagedClassRegistry {
    entries: Vec<ManagedClassEntry>,
    index: HashMap<TypeId, usize>,
}

impl ManagedClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity class
    ///
    /// # Errors
    ///
    /// `Configuration` when the class is already registered, its table name
    /// is empty or taken by another class, or its properties are invalid.
    pub fn register<E: Persistable>(&mut self) -> Result<&ManagedClassEntry> {
        let entry = ManagedClassEntry::of::<E>();

        if self.index.contains_key(&entry.type_id) {
            return Err(DtsError::ClassAlreadyRegistered {
                entity: entry.entity_name.to_string(),
            }
            .into());
        }
        entry.validate()?;

        if let Some(existing) = self
            .entries
            .iter()
            .find(|e| e.table_name.eq_ignore_ascii_case(entry.table_name))
        {
            return Err(DtsError::TableNameCollision {
                table: entry.table_name.to_string(),
                entity: entry.entity_name.to_string(),
                existing: existing.entity_name.to_string(),
            }
            .into());
        }

        tracing::debug!(
            entity = entry.entity_name,
            table = entry.table_name,
            properties = entry.property_types.len(),
            "managed class registered"
        );

        let position = self.entries.len();
        self.index.insert(entry.type_id, position);
        self.entries.push(entry);
        Ok(&self.entries[position])
    }

    pub fn get(&self, type_id: TypeId) -> Option<&ManagedClassEntry> {
        self.index.get(&type_id).map(|&i| &self.entries[i])
    }

    /// Entry for `E`, failing if it was never registered
    pub fn entry<E: Persistable>(&self) -> Result<&ManagedClassEntry> {
        self.get(TypeId::of::<E>()).ok_or_else(|| {
            DtsError::ClassNotManaged {
                entity: std::any::type_name::<E>().to_string(),
            }
            .into()
        })
    }

    pub fn descriptor<E: Persistable>(&self) -> Result<&EntityDescriptor<E>> {
        let entry = self.entry::<E>()?;
        entry.descriptor::<E>().ok_or_else(|| {
            DtsError::Internal {
                message: format!("descriptor type mismatch for {}", entry.entity_name),
            }
            .into()
        })
    }

    pub fn contains<E: Persistable>(&self) -> bool {
        self.index.contains_key(&TypeId::of::<E>())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedClassEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
