//! Materialized records and their cache bookkeeping metadata.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Completeness and creation time of one phase of a two-phase source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseState {
    pub complete: bool,
    pub date_created: Option<NaiveDateTime>,
}

impl PhaseState {
    pub fn new(complete: bool, date_created: Option<NaiveDateTime>) -> Self {
        Self {
            complete,
            date_created,
        }
    }
}

/// Metadata attached to a record outside its schema properties.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtendedData {
    /// Id of the related or matched object that produced this row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
    /// Tag of the source that produced the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// When the record was written to the cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_created: Option<NaiveDateTime>,
    /// Whether the source delivered the full record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PhaseState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PhaseState>,
    /// Named extra columns read alongside the properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// A typed object reconstructed from a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Class the record was materialized as.
    pub class: String,
    /// Instance id, taken from the class's id property.
    #[serde(default)]
    pub id: Option<String>,
    /// Property values keyed by property name.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Binary stream payload, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<Bytes>,
    #[serde(default)]
    pub extended: ExtendedData,
}

impl Record {
    /// Create an empty record of a class.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            id: None,
            properties: BTreeMap::new(),
            stream: None,
            extended: ExtendedData::default(),
        }
    }

    /// Set the instance id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set a property value.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Set the stream payload.
    pub fn with_stream(mut self, stream: impl Into<Bytes>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    /// Set the source tag.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.extended.source = Some(source.into());
        self
    }

    /// Mark the record complete or incomplete.
    pub fn with_complete(mut self, complete: bool) -> Self {
        self.extended.complete = Some(complete);
        self
    }

    /// Look up a property value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Set a property value in place.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.properties.insert(name.into(), value);
    }

    /// Records are incomplete unless explicitly marked complete.
    pub fn is_complete(&self) -> bool {
        self.extended.complete.unwrap_or(false)
    }
}
