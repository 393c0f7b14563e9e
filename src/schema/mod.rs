pub mod descriptor;
pub mod entity;

pub use descriptor::{is_reference_column, Dependency, EntityDescriptor};
pub use entity::{EntityKind, UnknownEntity};

/// Fields every entity carries
pub const ID_FIELD: &str = "id";
pub const SYSTEM_FIELDS: &[&str] = &["id", "createdAt", "updatedAt"];
