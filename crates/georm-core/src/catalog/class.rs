//! Class definitions.

use serde::{Deserialize, Serialize};

use super::property::PropertyDef;
use super::BindingSource;

/// A node in the single-inheritance class tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    /// Class name (unique within the schema).
    pub name: String,
    /// Base classes. More than one is rejected when the hierarchy is walked.
    #[serde(default)]
    pub base_classes: Vec<String>,
    /// Properties declared on this class.
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    /// Primary backing table. `None` shares the nearest ancestor's table.
    #[serde(default)]
    pub table: Option<TableBinding>,
    /// Cache mirror table. `None` shares the nearest ancestor's mirror table.
    #[serde(default)]
    pub cache_table: Option<TableBinding>,
    /// Name of the instance-id property, inherited when absent.
    #[serde(default)]
    pub id_property: Option<String>,
    /// Whether the class can be the target of a query.
    #[serde(default)]
    pub queryable: bool,
    /// Binary payload column in the primary table.
    #[serde(default)]
    pub stream_column: Option<String>,
    /// Binary payload column in the mirror table.
    #[serde(default)]
    pub cache_stream_column: Option<String>,
    /// Records arrive in two phases (metadata, payload) with separate freshness.
    #[serde(default)]
    pub two_phase: bool,
}

/// A table a class is stored in, with the key column linking it to the
/// tables of its base and derived classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBinding {
    pub name: String,
    pub key_column: String,
}

impl TableBinding {
    pub fn new(name: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_column: key_column.into(),
        }
    }
}

impl ClassDef {
    /// Create a class with no properties or bindings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_classes: Vec::new(),
            properties: Vec::new(),
            table: None,
            cache_table: None,
            id_property: None,
            queryable: false,
            stream_column: None,
            cache_stream_column: None,
            two_phase: false,
        }
    }

    /// Derive from a base class.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base_classes.push(base.into());
        self
    }

    /// Add a property.
    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Add multiple properties.
    pub fn with_properties(mut self, properties: impl IntoIterator<Item = PropertyDef>) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Set the primary table.
    pub fn with_table(mut self, name: impl Into<String>, key_column: impl Into<String>) -> Self {
        self.table = Some(TableBinding::new(name, key_column));
        self
    }

    /// Set the cache mirror table.
    pub fn with_cache_table(
        mut self,
        name: impl Into<String>,
        key_column: impl Into<String>,
    ) -> Self {
        self.cache_table = Some(TableBinding::new(name, key_column));
        self
    }

    /// Set the instance-id property.
    pub fn with_id_property(mut self, name: impl Into<String>) -> Self {
        self.id_property = Some(name.into());
        self
    }

    /// Mark the class as a valid query target.
    pub fn queryable(mut self) -> Self {
        self.queryable = true;
        self
    }

    /// Set the stream payload column in both primary and mirror tables.
    pub fn with_stream_column(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        self.cache_stream_column = Some(column.clone());
        self.stream_column = Some(column);
        self
    }

    pub fn two_phase(mut self) -> Self {
        self.two_phase = true;
        self
    }

    /// Get a declared property by name.
    pub fn get_property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Own table for a source.
    pub fn own_table(&self, source: BindingSource) -> Option<&TableBinding> {
        match source {
            BindingSource::Primary => self.table.as_ref(),
            BindingSource::Cache => self.cache_table.as_ref(),
        }
    }

    /// Own stream column for a source.
    pub fn own_stream_column(&self, source: BindingSource) -> Option<&str> {
        match source {
            BindingSource::Primary => self.stream_column.as_deref(),
            BindingSource::Cache => self.cache_stream_column.as_deref(),
        }
    }
}
