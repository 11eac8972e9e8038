//! SQLite backend.

use std::path::Path;

use chrono::NaiveDateTime;
use georm_proto::Value;
use parking_lot::Mutex;
use rusqlite::types::{FromSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, Row, Statement, ToSql};
use tracing::debug;

use super::{Command, Database, RowAccess, RowCallback};
use crate::error::Error;
use crate::spatial::polygon_to_wkt;
use crate::sql::Parameter;

/// Timestamp format written to TEXT columns.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A SQLite connection guarded by a mutex.
pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Open or create a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, Error> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run unparameterized SQL, e.g. DDL scripts.
    pub fn execute_script(&self, sql: &str) -> Result<(), Error> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase").finish_non_exhaustive()
    }
}

fn bind(stmt: &mut Statement<'_>, parameters: &[Parameter]) -> Result<(), Error> {
    for parameter in parameters {
        let index = stmt.parameter_index(&parameter.name)?.ok_or_else(|| {
            Error::Internal(format!(
                "parameter {} does not occur in the command",
                parameter.name
            ))
        })?;
        stmt.raw_bind_parameter(index, BoundValue(&parameter.value))?;
    }
    Ok(())
}

/// Binds a [`Value`] with SQLite storage classes. Polygons are stored as WKT.
struct BoundValue<'a>(&'a Value);

impl ToSql for BoundValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as SqlValue;

        Ok(match self.0 {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int32(i) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*i))),
            Value::Int64(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Double(d) => ToSqlOutput::Owned(SqlValue::Real(*d)),
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::DateTime(t) => {
                ToSqlOutput::Owned(SqlValue::Text(t.format(DATETIME_FORMAT).to_string()))
            }
            Value::Polygon(p) => ToSqlOutput::Owned(SqlValue::Text(polygon_to_wkt(p))),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl Database for SqliteDatabase {
    fn execute(&self, command: &Command) -> Result<usize, Error> {
        debug!(sql = %command.sql, params = command.parameters.len(), "execute");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&command.sql)?;
        bind(&mut stmt, &command.parameters)?;
        Ok(stmt.raw_execute()?)
    }

    fn query(&self, command: &Command, on_row: &mut RowCallback<'_>) -> Result<(), Error> {
        debug!(sql = %command.sql, params = command.parameters.len(), "query");
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&command.sql)?;
        bind(&mut stmt, &command.parameters)?;
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next()? {
            on_row(row)?;
        }
        Ok(())
    }

    fn execute_batch(&self, commands: &[Command]) -> Result<usize, Error> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut affected = 0;
        for command in commands {
            debug!(sql = %command.sql, params = command.parameters.len(), "execute in batch");
            let mut stmt = tx.prepare(&command.sql)?;
            bind(&mut stmt, &command.parameters)?;
            affected += stmt.raw_execute()?;
        }
        tx.commit()?;
        Ok(affected)
    }
}

fn typed<T: FromSql>(row: &Row<'_>, ordinal: usize) -> Result<Option<T>, Error> {
    row.get::<_, Option<T>>(ordinal)
        .map_err(|e| Error::Schema(format!("column {}: {}", ordinal, e)))
}

impl RowAccess for Row<'_> {
    fn get_string(&self, ordinal: usize) -> Result<Option<String>, Error> {
        typed(self, ordinal)
    }

    fn get_text(&self, ordinal: usize) -> Result<Option<String>, Error> {
        let value = self
            .get_ref(ordinal)
            .map_err(|e| Error::Schema(format!("column {}: {}", ordinal, e)))?;
        Ok(match value {
            ValueRef::Null => None,
            ValueRef::Integer(i) => Some(i.to_string()),
            ValueRef::Real(f) => Some(f.to_string()),
            ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
        })
    }

    fn get_i32(&self, ordinal: usize) -> Result<Option<i32>, Error> {
        typed(self, ordinal)
    }

    fn get_i64(&self, ordinal: usize) -> Result<Option<i64>, Error> {
        typed(self, ordinal)
    }

    fn get_f64(&self, ordinal: usize) -> Result<Option<f64>, Error> {
        typed(self, ordinal)
    }

    fn get_bool(&self, ordinal: usize) -> Result<Option<bool>, Error> {
        typed(self, ordinal)
    }

    fn get_datetime(&self, ordinal: usize) -> Result<Option<NaiveDateTime>, Error> {
        typed(self, ordinal)
    }

    fn get_bytes(&self, ordinal: usize) -> Result<Option<Vec<u8>>, Error> {
        typed(self, ordinal)
    }
}
