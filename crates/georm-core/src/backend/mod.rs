//! Database seam: parameterized commands, scoped row readers and
//! transactional batches.

mod sqlite;

pub use sqlite::SqliteDatabase;

use chrono::NaiveDateTime;
use georm_proto::Value;

use crate::error::Error;
use crate::sql::Parameter;

/// A parameterized text command.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub sql: String,
    pub parameters: Vec<Parameter>,
}

impl Command {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Typed access to the current row of a reader.
///
/// Every getter returns `Ok(None)` for SQL NULL and a schema error when the
/// stored value cannot be read as the requested type.
pub trait RowAccess {
    fn get_string(&self, ordinal: usize) -> Result<Option<String>, Error>;
    /// Any non-null value rendered as text.
    fn get_text(&self, ordinal: usize) -> Result<Option<String>, Error>;
    fn get_i32(&self, ordinal: usize) -> Result<Option<i32>, Error>;
    fn get_i64(&self, ordinal: usize) -> Result<Option<i64>, Error>;
    fn get_f64(&self, ordinal: usize) -> Result<Option<f64>, Error>;
    fn get_bool(&self, ordinal: usize) -> Result<Option<bool>, Error>;
    fn get_datetime(&self, ordinal: usize) -> Result<Option<NaiveDateTime>, Error>;
    fn get_bytes(&self, ordinal: usize) -> Result<Option<Vec<u8>>, Error>;
}

/// Callback receiving each row of a reader.
pub type RowCallback<'a> = dyn FnMut(&dyn RowAccess) -> Result<(), Error> + 'a;

/// A relational backend.
///
/// Row readers are scoped to [`Database::query`]: the reader is opened for
/// the call and released on every exit path, including callback errors.
pub trait Database: Send + Sync {
    /// Execute a command and return the affected row count.
    fn execute(&self, command: &Command) -> Result<usize, Error>;

    /// Run a query, handing each row to `on_row`.
    fn query(&self, command: &Command, on_row: &mut RowCallback<'_>) -> Result<(), Error>;

    /// Execute several commands in one transaction.
    fn execute_batch(&self, commands: &[Command]) -> Result<usize, Error>;

    /// Run a `COUNT(*)` command.
    fn query_count(&self, command: &Command) -> Result<u64, Error> {
        let mut count = 0i64;
        self.query(command, &mut |row| {
            count = row.get_i64(0)?.unwrap_or(0);
            Ok(())
        })?;
        Ok(count.max(0) as u64)
    }
}

/// An in-memory row of values, used to feed the materializer without a
/// database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRow(pub Vec<Value>);

impl ValueRow {
    fn cell(&self, ordinal: usize) -> Result<&Value, Error> {
        self.0
            .get(ordinal)
            .ok_or_else(|| Error::Schema(format!("row has no column {}", ordinal)))
    }

    fn mismatch(&self, ordinal: usize, expected: &str) -> Error {
        Error::Schema(format!(
            "column {} holds {:?}, expected {}",
            ordinal,
            self.0.get(ordinal),
            expected
        ))
    }
}

impl RowAccess for ValueRow {
    fn get_string(&self, ordinal: usize) -> Result<Option<String>, Error> {
        match self.cell(ordinal)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            _ => Err(self.mismatch(ordinal, "string")),
        }
    }

    fn get_text(&self, ordinal: usize) -> Result<Option<String>, Error> {
        match self.cell(ordinal)? {
            Value::Null => Ok(None),
            other => Ok(Some(other.to_string())),
        }
    }

    fn get_i32(&self, ordinal: usize) -> Result<Option<i32>, Error> {
        match self.cell(ordinal)? {
            Value::Null => Ok(None),
            Value::Int32(i) => Ok(Some(*i)),
            Value::Int64(i) => i32::try_from(*i)
                .map(Some)
                .map_err(|_| self.mismatch(ordinal, "int32")),
            _ => Err(self.mismatch(ordinal, "int32")),
        }
    }

    fn get_i64(&self, ordinal: usize) -> Result<Option<i64>, Error> {
        match self.cell(ordinal)? {
            Value::Null => Ok(None),
            v => v.as_i64().map(Some).ok_or_else(|| self.mismatch(ordinal, "int64")),
        }
    }

    fn get_f64(&self, ordinal: usize) -> Result<Option<f64>, Error> {
        match self.cell(ordinal)? {
            Value::Null => Ok(None),
            Value::Double(d) => Ok(Some(*d)),
            Value::Int32(i) => Ok(Some(*i as f64)),
            Value::Int64(i) => Ok(Some(*i as f64)),
            _ => Err(self.mismatch(ordinal, "double")),
        }
    }

    fn get_bool(&self, ordinal: usize) -> Result<Option<bool>, Error> {
        match self.cell(ordinal)? {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            Value::Int32(i) => Ok(Some(*i != 0)),
            Value::Int64(i) => Ok(Some(*i != 0)),
            _ => Err(self.mismatch(ordinal, "boolean")),
        }
    }

    fn get_datetime(&self, ordinal: usize) -> Result<Option<NaiveDateTime>, Error> {
        match self.cell(ordinal)? {
            Value::Null => Ok(None),
            Value::DateTime(t) => Ok(Some(*t)),
            _ => Err(self.mismatch(ordinal, "datetime")),
        }
    }

    fn get_bytes(&self, ordinal: usize) -> Result<Option<Vec<u8>>, Error> {
        match self.cell(ordinal)? {
            Value::Null => Ok(None),
            Value::Bytes(b) => Ok(Some(b.clone())),
            _ => Err(self.mismatch(ordinal, "binary")),
        }
    }
}
