//! Per-type property descriptors
//!
//! An entity's `describe` call is captured once, at registration, into an
//! [`EntityDescriptor`]: the ordered property list with a typed accessor
//! pair per property, erased to `dyn Any` so codecs can be resolved by
//! declared type name.

use std::any::Any;

/// Declared name and type name of one persisted property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyType {
    pub name: String,
    pub type_name: String,
}

/// Ordered property name → declared type name mapping of an entity type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyTypeMap {
    entries: Vec<PropertyType>,
}

impl PropertyTypeMap {
    pub fn get(&self, name: &str) -> Option<&PropertyType> {
        self.entries.iter().find(|p| p.name == name)
    }

    /// Declared type name of a property
    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.get(name).map(|p| p.type_name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|p| p.name.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PropertyType> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a PropertyTypeMap {
    type Item = &'a PropertyType;
    type IntoIter = std::slice::Iter<'a, PropertyType>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Type-erased field access for one property of `E`
trait ErasedAccessor<E>: Send + Sync {
    fn get<'a>(&self, entity: &'a E) -> &'a dyn Any;
    fn get_mut<'a>(&self, entity: &'a mut E) -> &'a mut dyn Any;
}

struct FieldAccessor<E, T> {
    get: fn(&E) -> &T,
    get_mut: fn(&mut E) -> &mut T,
}

impl<E: 'static, T: Any> ErasedAccessor<E> for FieldAccessor<E, T> {
    fn get<'a>(&self, entity: &'a E) -> &'a dyn Any {
        (self.get)(entity)
    }

    fn get_mut<'a>(&self, entity: &'a mut E) -> &'a mut dyn Any {
        (self.get_mut)(entity)
    }
}

/// One declared property with its accessor pair
pub struct PropertyDescriptor<E> {
    name: String,
    type_name: String,
    accessor: Box<dyn ErasedAccessor<E>>,
}

impl<E> PropertyDescriptor<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Borrow this property's value out of an entity
    pub fn get<'a>(&self, entity: &'a E) -> &'a dyn Any {
        self.accessor.get(entity)
    }

    /// Borrow this property's field mutably for deserialization
    pub fn get_mut<'a>(&self, entity: &'a mut E) -> &'a mut dyn Any {
        self.accessor.get_mut(entity)
    }
}

impl<E> std::fmt::Debug for PropertyDescriptor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Collects property declarations inside `Persistable::describe`
pub struct PropertyMapBuilder<E> {
    properties: Vec<PropertyDescriptor<E>>,
}

impl<E: 'static> PropertyMapBuilder<E> {
    pub(crate) fn new() -> Self {
        Self {
            properties: Vec::new(),
        }
    }

    /// Declare a persisted property
    ///
    /// `type_name` selects the codec: a built-in kind such as `"text"` or
    /// `"integer"`, or a name registered with `CodecScope::Type`. The
    /// accessors are usually closures like `|w| &w.name`.
    pub fn property<T: Any>(
        &mut self,
        name: &str,
        type_name: &str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> &mut Self {
        self.properties.push(PropertyDescriptor {
            name: name.to_string(),
            type_name: type_name.to_string(),
            accessor: Box::new(FieldAccessor { get, get_mut }),
        });
        self
    }

    pub(crate) fn build(self, table_name: &'static str) -> EntityDescriptor<E> {
        EntityDescriptor {
            table_name,
            properties: self.properties,
        }
    }
}

/// Registration-time snapshot of an entity type's shape
#[derive(Debug)]
pub struct EntityDescriptor<E> {
    table_name: &'static str,
    properties: Vec<PropertyDescriptor<E>>,
}

impl<E> EntityDescriptor<E> {
    pub fn table_name(&self) -> &'static str {
        self.table_name
    }

    pub fn properties(&self) -> &[PropertyDescriptor<E>] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor<E>> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_type_map(&self) -> PropertyTypeMap {
        PropertyTypeMap {
            entries: self
                .properties
                .iter()
                .map(|p| PropertyType {
                    name: p.name.clone(),
                    type_name: p.type_name.clone(),
                })
                .collect(),
        }
    }
}
