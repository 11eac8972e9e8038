//! Command parameters with declared column kinds.

use georm_proto::{Value, ValueKind};

/// Declared type of a bound parameter or read column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Double,
    Bool,
    Int32,
    Int64,
    DateTime,
    Binary,
}

impl From<ValueKind> for ColumnType {
    fn from(kind: ValueKind) -> Self {
        match kind {
            ValueKind::String | ValueKind::Polygon => ColumnType::String,
            ValueKind::Double => ColumnType::Double,
            ValueKind::Boolean => ColumnType::Bool,
            ValueKind::Int32 => ColumnType::Int32,
            ValueKind::Int64 => ColumnType::Int64,
            ValueKind::DateTime => ColumnType::DateTime,
            ValueKind::Binary => ColumnType::Binary,
        }
    }
}

impl ColumnType {
    /// Column type used in generated DDL.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::String => "TEXT",
            ColumnType::Double => "REAL",
            ColumnType::Bool => "INTEGER",
            ColumnType::Int32 => "INTEGER",
            ColumnType::Int64 => "INTEGER",
            ColumnType::DateTime => "TEXT",
            ColumnType::Binary => "BLOB",
        }
    }
}

/// A named parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
    pub column_type: ColumnType,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: Value, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            value,
            column_type,
        }
    }
}

/// Parameters of one command, named `@p0`, `@p1`, ... in push order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterList {
    params: Vec<Parameter>,
}

impl ParameterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter and return its placeholder.
    pub fn push(&mut self, value: Value, column_type: ColumnType) -> String {
        let name = format!("@p{}", self.params.len());
        self.params.push(Parameter::new(name.clone(), value, column_type));
        name
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn as_slice(&self) -> &[Parameter] {
        &self.params
    }

    pub fn into_vec(self) -> Vec<Parameter> {
        self.params
    }
}
