//! Relationship definitions between classes.

use serde::{Deserialize, Serialize};

/// A named relationship from a source class to a target class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    /// Relationship name (unique within the schema).
    pub name: String,
    pub source_class: String,
    pub target_class: String,
    /// How the relationship is stored.
    pub mapping: RelationshipMapping,
}

/// Storage of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationshipMapping {
    /// `source_table.source_column = target_table.target_column`.
    ForeignKey {
        source_column: String,
        target_column: String,
    },
    /// Link table holding one row per related pair; the columns reference
    /// the key columns of the source and target tables.
    Intermediate {
        table: String,
        source_column: String,
        target_column: String,
    },
}

impl RelationshipDef {
    /// Create a foreign-key relationship.
    pub fn foreign_key(
        name: impl Into<String>,
        source_class: impl Into<String>,
        source_column: impl Into<String>,
        target_class: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_class: source_class.into(),
            target_class: target_class.into(),
            mapping: RelationshipMapping::ForeignKey {
                source_column: source_column.into(),
                target_column: target_column.into(),
            },
        }
    }

    /// Create a relationship stored in a link table.
    pub fn intermediate(
        name: impl Into<String>,
        source_class: impl Into<String>,
        target_class: impl Into<String>,
        table: impl Into<String>,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_class: source_class.into(),
            target_class: target_class.into(),
            mapping: RelationshipMapping::Intermediate {
                table: table.into(),
                source_column: source_column.into(),
                target_column: target_column.into(),
            },
        }
    }
}
