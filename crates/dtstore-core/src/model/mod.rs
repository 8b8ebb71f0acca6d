pub mod descriptor;
pub mod entity;

pub use descriptor::{EntityDescriptor, PropertyMapBuilder, PropertyType, PropertyTypeMap};
pub use entity::{ObjectIdSlot, Persistable, OBJECT_ID_COLUMN};
