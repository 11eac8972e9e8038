//! Output formatters for records and compiled queries.

use std::collections::BTreeSet;

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use georm_core::spatial::polygon_to_wkt;
use georm_core::CompiledQuery;
use georm_proto::{Record, Value};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format materialized records, with the total match count when known.
    fn format_records(&self, records: &[Record], total_count: Option<u64>) -> String;

    /// Format a compiled query.
    fn format_compiled(&self, compiled: &CompiledQuery) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_records(&self, records: &[Record], total_count: Option<u64>) -> String {
        if records.is_empty() {
            return match total_count {
                Some(total) => format!("No results ({} total)", total),
                None => "No results".to_string(),
            };
        }

        let columns = property_columns(records);
        let with_source = records.iter().any(|r| r.extended.source.is_some());
        let with_stream = records.iter().any(|r| r.stream.is_some());

        let mut headers: Vec<Cell> = vec![Cell::new("id")];
        headers.extend(columns.iter().map(Cell::new));
        if with_source {
            headers.push(Cell::new("source"));
        }
        if with_stream {
            headers.push(Cell::new("stream"));
        }

        let mut table = Table::new();
        table.set_header(headers);
        for record in records {
            let mut cells: Vec<Cell> = vec![Cell::new(record.id.as_deref().unwrap_or("NULL"))];
            for column in &columns {
                cells.push(Cell::new(
                    record.get(column).map(format_value).unwrap_or_default(),
                ));
            }
            if with_source {
                cells.push(Cell::new(record.extended.source.as_deref().unwrap_or("")));
            }
            if with_stream {
                cells.push(Cell::new(
                    record.stream.as_ref().map(hex::encode).unwrap_or_default(),
                ));
            }
            table.add_row(cells);
        }

        match total_count {
            Some(total) => format!("{}\n{} row(s) of {}", table, records.len(), total),
            None => format!("{}\n{} row(s)", table, records.len()),
        }
    }

    fn format_compiled(&self, compiled: &CompiledQuery) -> String {
        let mut output = format!("SQL:\n{}", compiled.sql);
        if let Some(count_sql) = &compiled.count_sql {
            output.push_str(&format!("\n\nCount SQL:\n{}", count_sql));
        }
        if !compiled.parameters.is_empty() {
            let mut table = Table::new();
            table.set_header(vec!["parameter", "type", "value"]);
            for p in &compiled.parameters {
                table.add_row(vec![
                    p.name.clone(),
                    p.column_type.sql_type().to_string(),
                    format_value(&p.value),
                ]);
            }
            output.push_str(&format!("\n\n{}", table));
        }
        if let Some(filter) = &compiled.spatial_filter {
            output.push_str(&format!(
                "\n\nExact polygon filter on '{}' after fetch",
                filter.property
            ));
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_records(&self, records: &[Record], total_count: Option<u64>) -> String {
        let rows: Vec<serde_json::Value> = records.iter().map(record_to_json).collect();
        let output = match total_count {
            Some(total) => serde_json::json!({ "total_count": total, "records": rows }),
            None => serde_json::Value::Array(rows),
        };
        serde_json::to_string_pretty(&output).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_compiled(&self, compiled: &CompiledQuery) -> String {
        let parameters: Vec<serde_json::Value> = compiled
            .parameters
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "type": p.column_type.sql_type(),
                    "value": value_to_json(&p.value),
                })
            })
            .collect();
        serde_json::to_string_pretty(&serde_json::json!({
            "sql": compiled.sql,
            "count_sql": compiled.count_sql,
            "parameters": parameters,
            "exact_polygon_filter": compiled.spatial_filter.as_ref().map(|f| f.property.clone()),
        }))
        .unwrap_or_else(|_| "{}".to_string())
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({
            "message": message
        })
        .to_string()
    }
}

/// Property names across all records, sorted.
fn property_columns(records: &[Record]) -> Vec<String> {
    let names: BTreeSet<&String> = records.iter().flat_map(|r| r.properties.keys()).collect();
    names.into_iter().cloned().collect()
}

/// Format a Value as a display string.
fn format_value(value: &Value) -> String {
    match value {
        Value::Polygon(polygon) => polygon_to_wkt(polygon),
        Value::Bytes(bytes) => hex::encode(bytes),
        other => other.to_string(),
    }
}

fn record_to_json(record: &Record) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    obj.insert("class".to_string(), serde_json::Value::String(record.class.clone()));
    obj.insert(
        "id".to_string(),
        record
            .id
            .clone()
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null),
    );
    let properties: serde_json::Map<String, serde_json::Value> = record
        .properties
        .iter()
        .map(|(name, value)| (name.clone(), value_to_json(value)))
        .collect();
    obj.insert("properties".to_string(), serde_json::Value::Object(properties));
    if let Some(stream) = &record.stream {
        obj.insert("stream".to_string(), serde_json::Value::String(hex::encode(stream)));
    }
    if let Some(source) = &record.extended.source {
        obj.insert("source".to_string(), serde_json::Value::String(source.clone()));
    }
    if let Some(complete) = record.extended.complete {
        obj.insert("complete".to_string(), serde_json::Value::Bool(complete));
    }
    if let Some(related_id) = &record.extended.related_id {
        obj.insert("related_id".to_string(), serde_json::Value::String(related_id.clone()));
    }
    serde_json::Value::Object(obj)
}

/// Convert a Value to JSON.
fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int32(i) => serde_json::Value::Number((*i).into()),
        Value::Int64(i) => serde_json::Value::Number((*i).into()),
        Value::Double(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::DateTime(_) => serde_json::Value::String(value.to_string()),
        Value::Polygon(polygon) => serde_json::to_value(polygon).unwrap_or(serde_json::Value::Null),
        Value::Bytes(b) => serde_json::Value::String(hex::encode(b)),
    }
}
