//! Result materialization: typed rows back into records.

use bytes::Bytes;
use georm_proto::{Record, Value, ValueKind};

use super::compiler::CompiledQuery;
use crate::backend::RowAccess;
use crate::error::Error;
use crate::spatial::polygon_from_wkt;
use crate::sql::{ColumnType, PropertySlot};

/// Turns result rows into records following a compiled query's read-plan.
pub struct Materializer<'a> {
    query: &'a CompiledQuery,
    default_stream: Option<Bytes>,
}

impl<'a> Materializer<'a> {
    pub fn new(query: &'a CompiledQuery) -> Self {
        Self {
            query,
            default_stream: None,
        }
    }

    /// Payload used when the stream column is null.
    pub fn with_default_stream(mut self, payload: Option<Bytes>) -> Self {
        self.default_stream = payload;
        self
    }

    /// Materialize one row.
    pub fn materialize_row(&self, row: &dyn RowAccess) -> Result<Record, Error> {
        let plan = &self.query.read_plan;
        let mut record = Record::new(self.query.class.clone());

        if let Some(ordinal) = plan.stream() {
            record.stream = match row.get_bytes(ordinal)? {
                Some(bytes) => Some(Bytes::from(bytes)),
                None => self.default_stream.clone(),
            };
        }

        if let Some(ordinal) = plan.related_id() {
            record.extended.related_id = row.get_text(ordinal)?;
        }

        for property in &self.query.properties {
            match plan.property(&property.name) {
                None => continue,
                Some(PropertySlot::Scalar(ordinal)) => {
                    let value = read_scalar(row, ordinal, property.kind, &property.name)?;
                    record.properties.insert(property.name.clone(), value);
                }
                Some(PropertySlot::Spatial { geometry, srid }) => {
                    let (Some(text), Some(srid)) = (row.get_string(geometry)?, row.get_i32(srid)?)
                    else {
                        continue;
                    };
                    let polygon = polygon_from_wkt(&text, srid)?;
                    record
                        .properties
                        .insert(property.name.clone(), Value::Polygon(polygon));
                }
            }
        }

        for (name, ordinal, column_type) in plan.extras() {
            let value = read_column(row, ordinal, column_type)?;
            record.extended.extra.insert(name.to_string(), value);
        }

        record.id = match record.get(&self.query.id_property) {
            Some(Value::Null) | None => None,
            Some(id) => Some(id.to_string()),
        };
        Ok(record)
    }
}

/// Read a property column by declared kind.
fn read_scalar(
    row: &dyn RowAccess,
    ordinal: usize,
    kind: ValueKind,
    property: &str,
) -> Result<Value, Error> {
    let column_type = match kind {
        ValueKind::String => ColumnType::String,
        ValueKind::Double => ColumnType::Double,
        ValueKind::Boolean => ColumnType::Bool,
        ValueKind::Int32 => ColumnType::Int32,
        ValueKind::Int64 => ColumnType::Int64,
        ValueKind::DateTime => ColumnType::DateTime,
        ValueKind::Polygon | ValueKind::Binary => {
            return Err(Error::Schema(format!(
                "property '{}' of kind {} has no column coercion",
                property, kind
            )))
        }
    };
    read_column(row, ordinal, column_type)
}

/// Read a column with the accessor matching its type.
pub(crate) fn read_column(
    row: &dyn RowAccess,
    ordinal: usize,
    column_type: ColumnType,
) -> Result<Value, Error> {
    let value = match column_type {
        ColumnType::String => row.get_string(ordinal)?.map(Value::String),
        ColumnType::Double => row.get_f64(ordinal)?.map(Value::Double),
        ColumnType::Bool => row.get_bool(ordinal)?.map(Value::Bool),
        ColumnType::Int32 => row.get_i32(ordinal)?.map(Value::Int32),
        ColumnType::Int64 => row.get_i64(ordinal)?.map(Value::Int64),
        ColumnType::DateTime => row.get_datetime(ordinal)?.map(Value::DateTime),
        ColumnType::Binary => row.get_bytes(ordinal)?.map(Value::Bytes),
    };
    Ok(value.unwrap_or(Value::Null))
}
