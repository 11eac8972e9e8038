//! Runtime values carried by criteria, parameters and materialized records.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::polygon::PolygonDescriptor;

/// Semantic kind of a schema property.
///
/// The set is closed: every kind has exactly one column type and one
/// materialization rule in `georm-core`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Double,
    Boolean,
    Int32,
    Int64,
    DateTime,
    /// Spatial ring stored as geometry (or WKT text plus an SRID column).
    Polygon,
    Binary,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Double => "double",
            ValueKind::Boolean => "boolean",
            ValueKind::Int32 => "int32",
            ValueKind::Int64 => "int64",
            ValueKind::DateTime => "datetime",
            ValueKind::Polygon => "polygon",
            ValueKind::Binary => "binary",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A runtime value.
///
/// Serialized untagged so that query files can write plain JSON scalars.
/// Strings stay strings on input; [`Value::coerce`] converts them to the
/// declared property kind before binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Timestamp without zone, interpreted as UTC.
    DateTime(NaiveDateTime),
    /// Spatial polygon.
    Polygon(PolygonDescriptor),
    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Kind of this value, `None` for null.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Boolean),
            Value::Int32(_) => Some(ValueKind::Int32),
            Value::Int64(_) => Some(ValueKind::Int64),
            Value::Double(_) => Some(ValueKind::Double),
            Value::String(_) => Some(ValueKind::String),
            Value::DateTime(_) => Some(ValueKind::DateTime),
            Value::Polygon(_) => Some(ValueKind::Polygon),
            Value::Bytes(_) => Some(ValueKind::Binary),
        }
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i32.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Int32(i) => Some(*i as i64),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as timestamp.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(t) => Some(*t),
            _ => None,
        }
    }

    /// Try to get as polygon reference.
    pub fn as_polygon(&self) -> Option<&PolygonDescriptor> {
        match self {
            Value::Polygon(p) => Some(p),
            _ => None,
        }
    }

    /// Try to get as bytes reference.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Convert this value to `kind`.
    ///
    /// Null converts to null for every kind. Strings are parsed, integers
    /// widen, integral doubles narrow, and any scalar renders to a string.
    pub fn coerce(self, kind: ValueKind) -> Result<Value, Error> {
        if self.is_null() || self.kind() == Some(kind) {
            return Ok(self);
        }

        let converted = match (kind, &self) {
            (ValueKind::String, Value::Bool(_))
            | (ValueKind::String, Value::Int32(_))
            | (ValueKind::String, Value::Int64(_))
            | (ValueKind::String, Value::Double(_))
            | (ValueKind::String, Value::DateTime(_)) => Some(Value::String(self.to_string())),
            (ValueKind::String, Value::Polygon(p)) => Some(Value::String(p.to_json()?)),

            (ValueKind::Double, Value::Int32(i)) => Some(Value::Double(*i as f64)),
            (ValueKind::Double, Value::Int64(i)) => Some(Value::Double(*i as f64)),
            (ValueKind::Double, Value::String(s)) => s.trim().parse().ok().map(Value::Double),

            (ValueKind::Boolean, Value::Int32(i)) => int_to_bool(*i as i64),
            (ValueKind::Boolean, Value::Int64(i)) => int_to_bool(*i),
            (ValueKind::Boolean, Value::String(s)) => parse_bool(s).map(Value::Bool),

            (ValueKind::Int32, Value::Int64(i)) => i32::try_from(*i).ok().map(Value::Int32),
            (ValueKind::Int32, Value::Double(f)) => integral(*f)
                .and_then(|i| i32::try_from(i).ok())
                .map(Value::Int32),
            (ValueKind::Int32, Value::String(s)) => s.trim().parse().ok().map(Value::Int32),

            (ValueKind::Int64, Value::Int32(i)) => Some(Value::Int64(*i as i64)),
            (ValueKind::Int64, Value::Double(f)) => integral(*f).map(Value::Int64),
            (ValueKind::Int64, Value::String(s)) => s.trim().parse().ok().map(Value::Int64),

            (ValueKind::DateTime, Value::String(s)) => parse_datetime(s).map(Value::DateTime),

            (ValueKind::Polygon, Value::String(s)) => {
                Some(Value::Polygon(PolygonDescriptor::from_json(s)?))
            }

            _ => None,
        };

        converted.ok_or_else(|| {
            Error::InvalidValue(format!("cannot convert {} to {}", self.describe(), kind))
        })
    }

    fn describe(&self) -> String {
        match self.kind() {
            Some(kind) => format!("{} value '{}'", kind, self),
            None => "null".to_string(),
        }
    }
}

fn int_to_bool(i: i64) -> Option<Value> {
    match i {
        0 => Some(Value::Bool(false)),
        1 => Some(Value::Bool(true)),
        _ => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Parse a timestamp in any of the accepted textual forms.
///
/// RFC 3339 values are converted to UTC; naive forms are taken as UTC.
/// A bare date means midnight.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int32(i) => write!(f, "{}", i),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => f.write_str(s),
            Value::DateTime(t) => write!(f, "{}", t.format("%Y-%m-%dT%H:%M:%S%.f")),
            Value::Polygon(p) => write!(
                f,
                "POLYGON[{} points, {}]",
                p.points.len(),
                p.coordinate_system
            ),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

// Conversion implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<PolygonDescriptor> for Value {
    fn from(v: PolygonDescriptor) -> Self {
        Value::Polygon(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
