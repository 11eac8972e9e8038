//! SQL dialect differences: quoting, spatial functions, paging and upsert sources.

use serde::{Deserialize, Serialize};

use super::params::ColumnType;

/// Suffix of the SRID companion column when a spatial binding names none.
pub const DEFAULT_SRID_SUFFIX: &str = "Srid";

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SQLite: spatial values stored as WKT text with an SRID column.
    #[default]
    Sqlite,
    /// SQL Server: native `geometry` columns.
    SqlServer,
}

impl Dialect {
    /// Quote an identifier.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::SqlServer => format!("[{}]", ident.replace(']', "]]")),
        }
    }

    /// `alias.column` with the column quoted.
    pub fn column(&self, alias: &str, column: &str) -> String {
        format!("{}.{}", alias, self.quote(column))
    }

    /// Whether spatial predicates run in the database.
    pub fn supports_native_spatial(&self) -> bool {
        matches!(self, Dialect::SqlServer)
    }

    /// Expression selecting a spatial column as WKT text.
    pub fn geometry_text(&self, alias: &str, column: &str) -> String {
        match self {
            Dialect::Sqlite => self.column(alias, column),
            Dialect::SqlServer => format!("{}.STAsText()", self.column(alias, column)),
        }
    }

    /// Expression selecting the SRID of a spatial column.
    pub fn geometry_srid(&self, alias: &str, column: &str, srid_column: Option<&str>) -> String {
        match self {
            Dialect::Sqlite => match srid_column {
                Some(srid) => self.column(alias, srid),
                None => self.column(alias, &default_srid_column(column)),
            },
            Dialect::SqlServer => format!("{}.STSrid", self.column(alias, column)),
        }
    }

    /// Native intersects predicate against a WKT parameter, `None` when the
    /// dialect has no spatial functions.
    pub fn intersects(
        &self,
        alias: &str,
        column: &str,
        wkt_param: &str,
        srid_param: &str,
    ) -> Option<String> {
        match self {
            Dialect::Sqlite => None,
            Dialect::SqlServer => Some(format!(
                "{}.STIntersects(geometry::STGeomFromText({}, {})) = 1",
                self.column(alias, column),
                wkt_param,
                srid_param
            )),
        }
    }

    /// Paging clause appended after ORDER BY.
    pub fn paging(&self, limit: u32, offset: u32) -> String {
        match self {
            Dialect::Sqlite => format!("LIMIT {} OFFSET {}", limit, offset),
            Dialect::SqlServer => format!(
                "OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                offset, limit
            ),
        }
    }

    /// Inline row source named `v` with the given columns.
    ///
    /// Returns the statement prefix (a CTE on SQLite) and the FROM item.
    pub fn values_source(&self, columns: &[String], rows: &[Vec<String>]) -> (String, String) {
        let quoted: Vec<String> = columns.iter().map(|c| self.quote(c)).collect();
        let rendered: Vec<String> = rows
            .iter()
            .map(|row| format!("({})", row.join(", ")))
            .collect();
        match self {
            Dialect::Sqlite => (
                format!(
                    "WITH v({}) AS (VALUES {}) ",
                    quoted.join(", "),
                    rendered.join(", ")
                ),
                "v".to_string(),
            ),
            Dialect::SqlServer => (
                String::new(),
                format!(
                    "(VALUES {}) AS v({})",
                    rendered.join(", "),
                    quoted.join(", ")
                ),
            ),
        }
    }

    /// Column type name used in generated DDL.
    pub fn column_type(&self, column_type: ColumnType) -> &'static str {
        match self {
            Dialect::Sqlite => column_type.sql_type(),
            Dialect::SqlServer => match column_type {
                ColumnType::String => "NVARCHAR(MAX)",
                ColumnType::Double => "FLOAT",
                ColumnType::Bool => "BIT",
                ColumnType::Int32 => "INT",
                ColumnType::Int64 => "BIGINT",
                ColumnType::DateTime => "DATETIME2",
                ColumnType::Binary => "VARBINARY(MAX)",
            },
        }
    }

    /// Column type of a spatial column.
    pub fn geometry_type(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "TEXT",
            Dialect::SqlServer => "GEOMETRY",
        }
    }

    /// `CREATE TABLE` statement creating the table only when absent.
    pub fn create_table(&self, table: &str, columns: &[(String, String)], key: &[&str]) -> String {
        let mut defs: Vec<String> = columns
            .iter()
            .map(|(name, ty)| format!("{} {}", self.quote(name), ty))
            .collect();
        if !key.is_empty() {
            let key: Vec<String> = key.iter().map(|k| self.quote(k)).collect();
            defs.push(format!("PRIMARY KEY ({})", key.join(", ")));
        }
        match self {
            Dialect::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                self.quote(table),
                defs.join(", ")
            ),
            Dialect::SqlServer => format!(
                "IF OBJECT_ID(N'{}', N'U') IS NULL CREATE TABLE {} ({})",
                table.replace('\'', "''"),
                self.quote(table),
                defs.join(", ")
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::SqlServer => "sqlserver",
        }
    }
}

/// SRID companion column name derived from a spatial column.
pub fn default_srid_column(column: &str) -> String {
    format!("{}{}", column, DEFAULT_SRID_SUFFIX)
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            other => Err(format!("unknown dialect '{}'", other)),
        }
    }
}
