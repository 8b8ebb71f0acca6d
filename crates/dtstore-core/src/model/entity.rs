//! The contract every persisted entity type implements

use crate::model::descriptor::{PropertyMapBuilder, PropertyTypeMap};
use dtstore_core_types::ObjectId;

/// Name of the engine-managed identifier column in every entity table
pub const OBJECT_ID_COLUMN: &str = "objectId";

/// Holder for an entity's engine-assigned identifier
///
/// Empty until the entity is first saved. Only `PersistenceManager` can fill
/// it; callers can read it but have no setter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ObjectIdSlot(Option<ObjectId>);

impl ObjectIdSlot {
    pub fn get(&self) -> Option<ObjectId> {
        self.0
    }

    pub fn is_assigned(&self) -> bool {
        self.0.is_some()
    }

    /// Fill an empty slot; an assigned identifier never changes
    pub(crate) fn assign(&mut self, id: ObjectId) {
        if self.0.is_none() {
            self.0 = Some(id);
        }
    }
}

/// A caller-defined entity type the engine can persist
///
/// Implementors are plain data holders. The engine only uses the table
/// name, the property declaration and the identifier slot.
///
/// # Example
///
/// ```
/// use dtstore_core::{ObjectIdSlot, Persistable, PropertyMapBuilder};
///
/// #[derive(Debug, Default, Clone, PartialEq)]
/// struct Widget {
///     id: ObjectIdSlot,
///     name: String,
///     weight: f64,
/// }
///
/// impl Persistable for Widget {
///     fn table_name() -> &'static str {
///         "widgets"
///     }
///
///     fn describe(props: &mut PropertyMapBuilder<Self>) {
///         props
///             .property("name", "text", |w| &w.name, |w| &mut w.name)
///             .property("weight", "real", |w| &w.weight, |w| &mut w.weight);
///     }
///
///     fn object_id_slot(&self) -> &ObjectIdSlot {
///         &self.id
///     }
///
///     fn object_id_slot_mut(&mut self) -> &mut ObjectIdSlot {
///         &mut self.id
///     }
/// }
///
/// let map = Widget::property_type_map();
/// assert_eq!(map.type_of("weight"), Some("real"));
/// assert!(Widget::default().object_id().is_none());
/// ```
pub trait Persistable: Default + 'static {
    /// Table holding rows of this type
    fn table_name() -> &'static str;

    /// Declare persisted properties in column order
    fn describe(props: &mut PropertyMapBuilder<Self>);

    fn object_id_slot(&self) -> &ObjectIdSlot;

    fn object_id_slot_mut(&mut self) -> &mut ObjectIdSlot;

    /// Identifier, absent until first save
    fn object_id(&self) -> Option<ObjectId> {
        self.object_id_slot().get()
    }

    /// Declared property name → type name mapping, in declaration order
    fn property_type_map() -> PropertyTypeMap {
        let mut props = PropertyMapBuilder::<Self>::new();
        Self::describe(&mut props);
        props.build(Self::table_name()).property_type_map()
    }
}
