//! Schema bundle - the full set of class and relationship definitions.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ClassDef, RelationshipDef};
use crate::error::Error;

/// Serializable snapshot of the schema metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaBundle {
    #[serde(default)]
    pub classes: Vec<ClassDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
}

impl SchemaBundle {
    /// Create an empty schema bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class to the schema.
    pub fn with_class(mut self, class: ClassDef) -> Self {
        self.classes.push(class);
        self
    }

    /// Add a relationship to the schema.
    pub fn with_relationship(mut self, relationship: RelationshipDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Parse a bundle from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Schema(format!("invalid schema: {}", e)))
    }

    /// Render the bundle as pretty JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Load a bundle from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Schema(format!("cannot read schema {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }
}
