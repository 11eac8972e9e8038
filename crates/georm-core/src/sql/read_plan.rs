//! Column read-plan: where each logical value sits in a result row.

use std::collections::{BTreeMap, HashMap};

use super::params::ColumnType;
use crate::error::Error;

/// Result ordinals of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertySlot {
    Scalar(usize),
    /// Geometry text and SRID columns.
    Spatial { geometry: usize, srid: usize },
}

/// Append-only mapping from column roles to ordinals.
///
/// Every role is written at most once; a second write is an internal error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadPlan {
    properties: HashMap<String, PropertySlot>,
    stream: Option<usize>,
    related_id: Option<usize>,
    extras: BTreeMap<String, (usize, ColumnType)>,
}

impl ReadPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_property(&mut self, name: &str, slot: PropertySlot) -> Result<(), Error> {
        if self.properties.contains_key(name) {
            return Err(Error::Internal(format!(
                "property '{}' already has a result column",
                name
            )));
        }
        self.properties.insert(name.to_string(), slot);
        Ok(())
    }

    pub fn property(&self, name: &str) -> Option<PropertySlot> {
        self.properties.get(name).copied()
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn set_stream(&mut self, ordinal: usize) -> Result<(), Error> {
        write_once(&mut self.stream, ordinal, "stream")
    }

    pub fn stream(&self) -> Option<usize> {
        self.stream
    }

    pub fn set_related_id(&mut self, ordinal: usize) -> Result<(), Error> {
        write_once(&mut self.related_id, ordinal, "related id")
    }

    pub fn related_id(&self) -> Option<usize> {
        self.related_id
    }

    pub fn set_extra(
        &mut self,
        name: &str,
        ordinal: usize,
        column_type: ColumnType,
    ) -> Result<(), Error> {
        if self.extras.contains_key(name) {
            return Err(Error::Internal(format!(
                "extra column '{}' already has a result column",
                name
            )));
        }
        self.extras.insert(name.to_string(), (ordinal, column_type));
        Ok(())
    }

    pub fn extra(&self, name: &str) -> Option<(usize, ColumnType)> {
        self.extras.get(name).copied()
    }

    /// Extra columns ordered by name.
    pub fn extras(&self) -> impl Iterator<Item = (&str, usize, ColumnType)> {
        self.extras
            .iter()
            .map(|(name, (ordinal, ty))| (name.as_str(), *ordinal, *ty))
    }
}

fn write_once(slot: &mut Option<usize>, ordinal: usize, role: &str) -> Result<(), Error> {
    if slot.is_some() {
        return Err(Error::Internal(format!("{} column already selected", role)));
    }
    *slot = Some(ordinal);
    Ok(())
}
