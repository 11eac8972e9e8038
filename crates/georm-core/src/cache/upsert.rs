//! Mirror-table layout and the chunked delete-then-insert write path.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use georm_proto::{Record, Value, ValueKind};
use tracing::{debug, info};

use super::bookkeeping::{self, SOURCE_COLUMN};
use crate::backend::{Command, Database};
use crate::catalog::{BindingSource, Catalog};
use crate::config::CacheConfig;
use crate::error::Error;
use crate::spatial::polygon_to_wkt;
use crate::sql::{default_srid_column, ColumnType, Dialect, ParameterList};

/// Parameters of the delete predicate per row: id, source and stale cutoff.
const DELETE_PARAMS_PER_ROW: usize = 3;

/// A caller-supplied column written next to the record's properties.
pub struct ExtraColumn {
    pub name: String,
    pub column_type: ColumnType,
    value: Box<dyn Fn(&Record) -> Value + Send + Sync>,
}

impl ExtraColumn {
    pub fn new<F>(name: impl Into<String>, column_type: ColumnType, value: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            column_type,
            value: Box::new(value),
        }
    }

    /// Column holding the same value for every record.
    pub fn constant(name: impl Into<String>, value: Value, column_type: ColumnType) -> Self {
        Self::new(name, column_type, move |_| value.clone())
    }

    pub fn value(&self, record: &Record) -> Value {
        (self.value)(record)
    }
}

impl std::fmt::Debug for ExtraColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtraColumn")
            .field("name", &self.name)
            .field("column_type", &self.column_type)
            .finish_non_exhaustive()
    }
}

/// Outcome of a cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertSummary {
    /// Records written after de-duplication.
    pub records: usize,
    /// Delete-then-insert batches executed.
    pub chunks: usize,
    pub rows_per_chunk: usize,
    pub params_per_row: usize,
    /// Rows affected by all deletes and inserts.
    pub affected: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Corner {
    MinX,
    MinY,
    MaxX,
    MaxY,
}

#[derive(Debug, Clone, PartialEq)]
enum ColumnSource {
    Id,
    Bookkeeping(&'static str),
    Property { name: String, kind: ValueKind },
    /// WKT text of a spatial property, with the column carrying its SRID.
    Geometry { property: String, srid_column: String },
    Srid(String),
    BBox(String, Corner),
    Stream,
    Extra(usize),
}

#[derive(Debug, Clone, PartialEq)]
struct WriteColumn {
    name: String,
    column_type: ColumnType,
    source: ColumnSource,
    /// Whether the column exists in the mirror table; SQL Server reads the
    /// SRID from a helper column of the row source only.
    stored: bool,
}

/// Columns of a class's mirror table, in write order.
///
/// Only columns stored in the class's own mirror table are written:
/// properties declared on classes with another mirror table and properties
/// held in secondary join tables are skipped.
#[derive(Debug, Clone)]
pub struct MirrorLayout {
    class: String,
    table: String,
    dialect: Dialect,
    id_column: String,
    id_kind: ValueKind,
    two_phase: bool,
    columns: Vec<WriteColumn>,
}

impl MirrorLayout {
    pub fn new(
        catalog: &Catalog,
        class: &str,
        dialect: Dialect,
        extras: &[ExtraColumn],
    ) -> Result<Self, Error> {
        let table = catalog.table_binding(class, BindingSource::Cache)?.name.clone();
        let two_phase = is_two_phase(catalog, class)?;

        let id = catalog.id_property(class)?;
        let id_column = match id.property.binding(BindingSource::Cache) {
            Some(binding) if binding.join.is_none() => binding.column.clone(),
            _ => {
                return Err(Error::Schema(format!(
                    "instance-id property '{}' of class '{}' has no column in mirror table '{}'",
                    id.name(),
                    class,
                    table
                )))
            }
        };

        let mut columns = vec![WriteColumn {
            name: id_column.clone(),
            column_type: ColumnType::from(id.property.kind),
            source: ColumnSource::Id,
            stored: true,
        }];
        for (name, column_type) in bookkeeping::columns(two_phase) {
            columns.push(WriteColumn {
                name: name.to_string(),
                column_type,
                source: ColumnSource::Bookkeeping(name),
                stored: true,
            });
        }

        for owned in catalog.properties(class)? {
            if owned.name() == id.name() {
                continue;
            }
            let Some(binding) = owned.property.binding(BindingSource::Cache) else {
                continue;
            };
            let owner_table = &catalog
                .table_binding(&owned.owner.name, BindingSource::Cache)?
                .name;
            if binding.join.is_some() || *owner_table != table {
                debug!(class, property = owned.name(), "property is not stored in the mirror table");
                continue;
            }

            if owned.property.is_spatial() {
                let spatial = binding.spatial.clone().unwrap_or_default();
                let srid_column = spatial
                    .srid_column
                    .clone()
                    .unwrap_or_else(|| default_srid_column(&binding.column));
                columns.push(WriteColumn {
                    name: binding.column.clone(),
                    column_type: ColumnType::String,
                    source: ColumnSource::Geometry {
                        property: owned.name().to_string(),
                        srid_column: srid_column.clone(),
                    },
                    stored: true,
                });
                columns.push(WriteColumn {
                    name: srid_column,
                    column_type: ColumnType::Int32,
                    source: ColumnSource::Srid(owned.name().to_string()),
                    stored: !dialect.supports_native_spatial(),
                });
                if let Some(bbox) = &spatial.bbox {
                    let corners = [
                        (&bbox.min_x, Corner::MinX),
                        (&bbox.min_y, Corner::MinY),
                        (&bbox.max_x, Corner::MaxX),
                        (&bbox.max_y, Corner::MaxY),
                    ];
                    for (column, corner) in corners {
                        columns.push(WriteColumn {
                            name: column.clone(),
                            column_type: ColumnType::Double,
                            source: ColumnSource::BBox(owned.name().to_string(), corner),
                            stored: true,
                        });
                    }
                }
            } else {
                columns.push(WriteColumn {
                    name: binding.column.clone(),
                    column_type: ColumnType::from(owned.property.kind),
                    source: ColumnSource::Property {
                        name: owned.name().to_string(),
                        kind: owned.property.kind,
                    },
                    stored: true,
                });
            }
        }

        if let Some((owner, column)) = catalog.stream_column(class, BindingSource::Cache)? {
            let owner_table = &catalog.table_binding(&owner.name, BindingSource::Cache)?.name;
            if *owner_table == table {
                columns.push(WriteColumn {
                    name: column.to_string(),
                    column_type: ColumnType::Binary,
                    source: ColumnSource::Stream,
                    stored: true,
                });
            }
        }

        for (index, extra) in extras.iter().enumerate() {
            columns.push(WriteColumn {
                name: extra.name.clone(),
                column_type: extra.column_type,
                source: ColumnSource::Extra(index),
                stored: true,
            });
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::Schema(format!(
                    "mirror table '{}' of class '{}' maps column '{}' twice",
                    table, class, column.name
                )));
            }
        }

        Ok(Self {
            class: class.to_string(),
            table,
            dialect,
            id_column,
            id_kind: id.property.kind,
            two_phase,
            columns,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_two_phase(&self) -> bool {
        self.two_phase
    }

    /// Names of the columns stored in the mirror table.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.stored)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Upper bound on parameters one record contributes to a chunk.
    pub fn params_per_row(&self) -> usize {
        DELETE_PARAMS_PER_ROW + self.columns.len()
    }

    /// `CREATE TABLE` statement for the mirror table.
    pub fn create_table_sql(&self) -> String {
        let columns: Vec<(String, String)> = self
            .columns
            .iter()
            .filter(|c| c.stored)
            .map(|c| {
                let ty = match c.source {
                    ColumnSource::Geometry { .. } => self.dialect.geometry_type(),
                    _ => self.dialect.column_type(c.column_type),
                };
                (c.name.clone(), ty.to_string())
            })
            .collect();
        self.dialect
            .create_table(&self.table, &columns, &[&self.id_column, SOURCE_COLUMN])
    }

    fn row_values(
        &self,
        record: &Record,
        id: &Value,
        extras: &[ExtraColumn],
        now: NaiveDateTime,
    ) -> Result<Vec<Value>, Error> {
        let mut values = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let value = match &column.source {
                ColumnSource::Id => id.clone(),
                ColumnSource::Bookkeeping(name) => bookkeeping::value(name, record, now),
                ColumnSource::Property { name, kind } => record
                    .get(name)
                    .cloned()
                    .unwrap_or(Value::Null)
                    .coerce(*kind)
                    .map_err(|e| {
                        Error::InvalidRequest(format!(
                            "record '{}' property '{}': {}",
                            id, name, e
                        ))
                    })?,
                ColumnSource::Geometry { property, .. } => match spatial_value(record, property)? {
                    Some(polygon) => Value::String(polygon_to_wkt(polygon)),
                    None => Value::Null,
                },
                ColumnSource::Srid(property) => match spatial_value(record, property)? {
                    Some(polygon) => Value::Int32(polygon.srid()?),
                    None => Value::Null,
                },
                ColumnSource::BBox(property, corner) => {
                    match spatial_value(record, property)?.and_then(|p| p.bounding_box()) {
                        Some(bbox) => Value::Double(match corner {
                            Corner::MinX => bbox.min_x,
                            Corner::MinY => bbox.min_y,
                            Corner::MaxX => bbox.max_x,
                            Corner::MaxY => bbox.max_y,
                        }),
                        None => Value::Null,
                    }
                }
                ColumnSource::Stream => match &record.stream {
                    Some(bytes) => Value::Bytes(bytes.to_vec()),
                    None => Value::Null,
                },
                ColumnSource::Extra(index) => extras
                    .get(*index)
                    .map(|extra| extra.value(record))
                    .ok_or_else(|| {
                        Error::Internal(format!("extra column {} was not supplied", index))
                    })?,
            };
            values.push(value);
        }
        Ok(values)
    }

    fn insert_expression(&self, column: &WriteColumn) -> String {
        let d = self.dialect;
        match &column.source {
            ColumnSource::Geometry { srid_column, .. } if d.supports_native_spatial() => format!(
                "geometry::STGeomFromText({}, {})",
                d.column("v", &column.name),
                d.column("v", srid_column)
            ),
            _ => d.column("v", &column.name),
        }
    }

    fn delete_command(&self, rows: &[PreparedRow], cutoff: NaiveDateTime) -> Command {
        let d = self.dialect;
        let mut params = ParameterList::new();
        let id_type = ColumnType::from(self.id_kind);
        let predicates: Vec<String> = rows
            .iter()
            .map(|row| {
                let id = params.push(row.id.clone(), id_type);
                let source = params.push(row.source.clone(), ColumnType::String);
                let mut predicate = format!(
                    "{} = {} AND {} = {}",
                    d.quote(&self.id_column),
                    id,
                    d.quote(SOURCE_COLUMN),
                    source
                );
                if !row.complete {
                    let cutoff = params.push(Value::DateTime(cutoff), ColumnType::DateTime);
                    predicate.push_str(&format!(
                        " AND ({} = 0 OR {} < {})",
                        d.quote(bookkeeping::COMPLETE_COLUMN),
                        d.quote(bookkeeping::DATE_CREATED_COLUMN),
                        cutoff
                    ));
                }
                format!("({})", predicate)
            })
            .collect();
        Command::new(format!(
            "DELETE FROM {} WHERE {}",
            d.quote(&self.table),
            predicates.join(" OR ")
        ))
        .with_parameters(params.into_vec())
    }

    fn insert_command(&self, rows: &[PreparedRow]) -> Command {
        let d = self.dialect;
        let mut params = ParameterList::new();
        let placeholders: Vec<Vec<String>> = rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(&row.values)
                    .map(|(column, value)| params.push(value.clone(), column.column_type))
                    .collect()
            })
            .collect();
        let source_columns: Vec<String> = self.columns.iter().map(|c| c.name.clone()).collect();
        let (prefix, from) = d.values_source(&source_columns, &placeholders);

        let stored: Vec<&WriteColumn> = self.columns.iter().filter(|c| c.stored).collect();
        let targets: Vec<String> = stored.iter().map(|c| d.quote(&c.name)).collect();
        let expressions: Vec<String> = stored.iter().map(|c| self.insert_expression(c)).collect();

        Command::new(format!(
            "{}INSERT INTO {} ({}) SELECT {} FROM {} WHERE NOT EXISTS (SELECT 1 FROM {} x WHERE {} = {} AND {} = {})",
            prefix,
            d.quote(&self.table),
            targets.join(", "),
            expressions.join(", "),
            from,
            d.quote(&self.table),
            d.column("x", &self.id_column),
            d.column("v", &self.id_column),
            d.column("x", SOURCE_COLUMN),
            d.column("v", SOURCE_COLUMN),
        ))
        .with_parameters(params.into_vec())
    }
}

/// Whether a class or one of its ancestors is delivered in two phases.
pub fn is_two_phase(catalog: &Catalog, class: &str) -> Result<bool, Error> {
    Ok(catalog.class(class)?.two_phase || catalog.ancestors(class)?.iter().any(|c| c.two_phase))
}

fn spatial_value<'r>(
    record: &'r Record,
    property: &str,
) -> Result<Option<&'r georm_proto::PolygonDescriptor>, Error> {
    match record.get(property) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Polygon(polygon)) => {
            polygon.validate()?;
            Ok(Some(polygon))
        }
        Some(other) => Err(Error::InvalidRequest(format!(
            "property '{}' holds {:?}, expected a polygon",
            property, other
        ))),
    }
}

struct PreparedRow {
    id: Value,
    source: Value,
    complete: bool,
    values: Vec<Value>,
}

/// Write records to the mirror table in chunks bounded by the parameter
/// ceiling.
///
/// Records are de-duplicated by id and source, first occurrence wins. Each
/// chunk runs one delete and one insert in a transaction; chunks are not
/// atomic with each other.
pub fn upsert<D: Database + ?Sized>(
    db: &D,
    layout: &MirrorLayout,
    records: &[Record],
    extras: &[ExtraColumn],
    config: &CacheConfig,
    now: NaiveDateTime,
) -> Result<UpsertSummary, Error> {
    let params_per_row = layout.params_per_row();
    let rows_per_chunk = config.parameter_ceiling / params_per_row;
    if rows_per_chunk == 0 {
        return Err(Error::InvalidRequest(format!(
            "parameter ceiling {} is below the {} parameters of one '{}' row",
            config.parameter_ceiling, params_per_row, layout.class
        )));
    }

    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let raw_id = record.id.as_ref().ok_or_else(|| {
            Error::InvalidRequest(format!("cannot cache a '{}' record without id", record.class))
        })?;
        let source = record.extended.source.clone().unwrap_or_default();
        if !seen.insert((raw_id.clone(), source.clone())) {
            debug!(id = %raw_id, source = %source, "skipping duplicate record");
            continue;
        }
        let id = Value::String(raw_id.clone())
            .coerce(layout.id_kind)
            .map_err(|e| Error::InvalidRequest(format!("record id '{}': {}", raw_id, e)))?;
        let values = layout.row_values(record, &id, extras, now)?;
        rows.push(PreparedRow {
            id,
            source: Value::String(source),
            complete: record.is_complete(),
            values,
        });
    }

    let cutoff = now - config.stale_incomplete_age();
    let mut summary = UpsertSummary {
        records: rows.len(),
        rows_per_chunk,
        params_per_row,
        ..UpsertSummary::default()
    };
    for chunk in rows.chunks(rows_per_chunk) {
        let commands = [
            layout.delete_command(chunk, cutoff),
            layout.insert_command(chunk),
        ];
        debug!(table = %layout.table, rows = chunk.len(), "writing cache chunk");
        summary.affected += db.execute_batch(&commands)?;
        summary.chunks += 1;
    }

    info!(
        class = %layout.class,
        table = %layout.table,
        records = summary.records,
        chunks = summary.chunks,
        "cache write complete"
    );
    Ok(summary)
}
