//! Property definitions and their column bindings.

use georm_proto::ValueKind;
use serde::{Deserialize, Serialize};

use super::BindingSource;

/// A typed property of a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Property name (unique within the class hierarchy branch).
    pub name: String,
    /// Semantic kind.
    pub kind: ValueKind,
    /// Binding in the primary tables. `None` means the property is not backed.
    #[serde(default)]
    pub column: Option<ColumnBinding>,
    /// Binding in the cache mirror tables.
    #[serde(default)]
    pub cache_column: Option<ColumnBinding>,
}

impl PropertyDef {
    /// Create an unbacked property.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            column: None,
            cache_column: None,
        }
    }

    /// Bind the property to a primary column.
    pub fn with_column(mut self, column: ColumnBinding) -> Self {
        self.column = Some(column);
        self
    }

    /// Bind the property to a cache mirror column.
    pub fn with_cache_column(mut self, column: ColumnBinding) -> Self {
        self.cache_column = Some(column);
        self
    }

    /// Bind both primary and cache tables to the same column layout.
    pub fn mirrored(mut self, column: ColumnBinding) -> Self {
        self.cache_column = Some(column.clone());
        self.column = Some(column);
        self
    }

    /// Binding for a source, `None` if the property is not backed there.
    pub fn binding(&self, source: BindingSource) -> Option<&ColumnBinding> {
        match source {
            BindingSource::Primary => self.column.as_ref(),
            BindingSource::Cache => self.cache_column.as_ref(),
        }
    }

    pub fn is_spatial(&self) -> bool {
        self.kind == ValueKind::Polygon
    }
}

/// Where a property's value lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnBinding {
    /// Column name.
    pub column: String,
    /// Secondary table holding the column, joined from the owning class table.
    #[serde(default)]
    pub join: Option<JoinTable>,
    /// Spatial storage details; only meaningful for polygon properties.
    #[serde(default)]
    pub spatial: Option<SpatialColumn>,
}

impl ColumnBinding {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            join: None,
            spatial: None,
        }
    }

    /// Read the column from a secondary table.
    pub fn with_join(mut self, join: JoinTable) -> Self {
        self.join = Some(join);
        self
    }

    /// Attach spatial companion columns.
    pub fn with_spatial(mut self, spatial: SpatialColumn) -> Self {
        self.spatial = Some(spatial);
        self
    }
}

/// A secondary table joined as `table.key = owner.parent_key`.
///
/// Both keys are optional in the serialized form so that an incomplete
/// declaration can be reported as a schema error instead of a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinTable {
    pub table: String,
    /// Column of the secondary table.
    #[serde(default)]
    pub key: Option<String>,
    /// Column of the owning class table.
    #[serde(default)]
    pub parent_key: Option<String>,
}

impl JoinTable {
    pub fn new(
        table: impl Into<String>,
        key: impl Into<String>,
        parent_key: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            key: Some(key.into()),
            parent_key: Some(parent_key.into()),
        }
    }

    /// Both join keys, or `None` if either is missing.
    pub fn keys(&self) -> Option<(&str, &str)> {
        match (&self.key, &self.parent_key) {
            (Some(key), Some(parent_key)) => Some((key.as_str(), parent_key.as_str())),
            _ => None,
        }
    }
}

/// Companion columns of a spatial property.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpatialColumn {
    /// Column holding the SRID where the backend has no native geometry type.
    #[serde(default)]
    pub srid_column: Option<String>,
    /// Bounding-box columns used as a prefilter.
    #[serde(default)]
    pub bbox: Option<BBoxColumns>,
}

impl SpatialColumn {
    pub fn with_srid_column(mut self, column: impl Into<String>) -> Self {
        self.srid_column = Some(column.into());
        self
    }

    pub fn with_bbox(mut self, bbox: BBoxColumns) -> Self {
        self.bbox = Some(bbox);
        self
    }
}

/// Bounding-box companion column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BBoxColumns {
    pub min_x: String,
    pub min_y: String,
    pub max_x: String,
    pub max_y: String,
}

impl BBoxColumns {
    /// Columns named `{prefix}MinX`, `{prefix}MinY`, `{prefix}MaxX`, `{prefix}MaxY`.
    pub fn prefixed(prefix: &str) -> Self {
        Self {
            min_x: format!("{}MinX", prefix),
            min_y: format!("{}MinY", prefix),
            max_x: format!("{}MaxX", prefix),
            max_y: format!("{}MaxY", prefix),
        }
    }

    pub fn columns(&self) -> [&str; 4] {
        [&self.min_x, &self.min_y, &self.max_x, &self.max_y]
    }
}
