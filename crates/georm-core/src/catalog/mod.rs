//! Schema catalog for georm.
//!
//! The catalog holds classes (single inheritance, typed properties, table
//! bindings) and relationships, validated once at load so that the compiler
//! can rely on typed bindings instead of string-keyed attributes.

mod catalog;
mod class;
mod property;
mod relationship;
mod schema;

pub use catalog::{Catalog, OwnedProperty};
pub use class::{ClassDef, TableBinding};
pub use property::{BBoxColumns, ColumnBinding, JoinTable, PropertyDef, SpatialColumn};
pub use relationship::{RelationshipDef, RelationshipMapping};
pub use schema::SchemaBundle;

/// Which set of bindings a compilation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingSource {
    /// The primary relational tables.
    #[default]
    Primary,
    /// The cache mirror tables.
    Cache,
}
