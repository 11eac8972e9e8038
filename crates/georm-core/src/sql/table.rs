//! Table descriptors and the per-statement join graph.
//!
//! Descriptors live in an arena owned by the statement; a join edge refers
//! to its parent by [`TableId`]. Two descriptors are equivalent when they
//! name the same table through the same keys from equivalent parents, and a
//! statement never holds two equivalent joined tables.

use crate::error::Error;

/// Index of a table in a [`JoinGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub(crate) usize);

/// How a table was joined to its parent: `own.own_key = parent.parent_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEdge {
    pub parent: TableId,
    pub parent_key: String,
    pub own_key: String,
}

/// A table reference, optionally joined to a parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    edge: Option<JoinEdge>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            edge: None,
        }
    }

    /// Record how this table joins to `parent`. A descriptor is joined at
    /// most once.
    pub fn join(
        &mut self,
        parent: TableId,
        parent_key: impl Into<String>,
        own_key: impl Into<String>,
    ) -> Result<(), Error> {
        if self.edge.is_some() {
            return Err(Error::Internal(format!(
                "table '{}' is already joined to a parent",
                self.name
            )));
        }
        self.edge = Some(JoinEdge {
            parent,
            parent_key: parent_key.into(),
            own_key: own_key.into(),
        });
        Ok(())
    }

    /// Builder form of [`TableDescriptor::join`] for fresh descriptors.
    pub fn joined(
        name: impl Into<String>,
        parent: TableId,
        parent_key: impl Into<String>,
        own_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            edge: Some(JoinEdge {
                parent,
                parent_key: parent_key.into(),
                own_key: own_key.into(),
            }),
        }
    }

    pub fn edge(&self) -> Option<&JoinEdge> {
        self.edge.as_ref()
    }
}

/// Arena of descriptors with their aliases.
#[derive(Debug, Default)]
pub struct JoinGraph {
    tables: Vec<(TableDescriptor, String)>,
}

impl JoinGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, descriptor: TableDescriptor, alias: String) -> TableId {
        self.tables.push((descriptor, alias));
        TableId(self.tables.len() - 1)
    }

    pub fn get(&self, id: TableId) -> Result<&TableDescriptor, Error> {
        self.tables
            .get(id.0)
            .map(|(d, _)| d)
            .ok_or_else(|| Error::Internal(format!("unknown table id {}", id.0)))
    }

    pub fn alias(&self, id: TableId) -> Result<&str, Error> {
        self.tables
            .get(id.0)
            .map(|(_, a)| a.as_str())
            .ok_or_else(|| Error::Internal(format!("unknown table id {}", id.0)))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Structural equivalence of a candidate against a table in the graph.
    pub fn equivalent(&self, candidate: &TableDescriptor, existing: TableId) -> Result<bool, Error> {
        let other = self.get(existing)?;
        if candidate.name != other.name {
            return Ok(false);
        }
        match (&candidate.edge, &other.edge) {
            (None, None) => Ok(true),
            (Some(a), Some(b)) => {
                if a.parent_key != b.parent_key || a.own_key != b.own_key {
                    return Ok(false);
                }
                self.ids_equivalent(a.parent, b.parent)
            }
            _ => Ok(false),
        }
    }

    fn ids_equivalent(&self, a: TableId, b: TableId) -> Result<bool, Error> {
        if a == b {
            return Ok(true);
        }
        let descriptor = self.get(a)?.clone();
        self.equivalent(&descriptor, b)
    }

    /// First table in the graph equivalent to the candidate.
    pub fn find_equivalent(&self, candidate: &TableDescriptor) -> Result<Option<TableId>, Error> {
        for index in 0..self.tables.len() {
            if self.equivalent(candidate, TableId(index))? {
                return Ok(Some(TableId(index)));
            }
        }
        Ok(None)
    }
}
