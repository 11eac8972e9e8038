//! Provider backed by the local relational store.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use georm_core::{Catalog, CompilerConfig, Database, QueryExecutor, SqliteDatabase};
use georm_proto::{QueryRequest, Record};

use crate::error::Error;
use crate::provider::QueryProvider;

type Connect = dyn Fn() -> Result<Arc<dyn Database>, georm_core::Error> + Send + Sync;

/// Compiles and executes queries against the primary tables.
///
/// The synchronous compiler and backend run on the blocking pool.
#[derive(Clone)]
pub struct LocalProvider {
    connect: Arc<Connect>,
    catalog: Arc<Catalog>,
    config: CompilerConfig,
}

impl LocalProvider {
    /// Share one database handle across queries.
    pub fn new(db: Arc<dyn Database>, catalog: Arc<Catalog>) -> Self {
        Self {
            connect: Arc::new(move || Ok(db.clone())),
            catalog,
            config: CompilerConfig::default(),
        }
    }

    /// Open a fresh SQLite connection for every query.
    pub fn sqlite(path: impl Into<PathBuf>, catalog: Arc<Catalog>) -> Self {
        let path = path.into();
        Self {
            connect: Arc::new(move || {
                let db: Arc<dyn Database> = Arc::new(SqliteDatabase::open(&path)?);
                Ok(db)
            }),
            catalog,
            config: CompilerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl QueryProvider for LocalProvider {
    async fn query(&self, request: &QueryRequest) -> Result<Vec<Record>, Error> {
        let provider = self.clone();
        let request = request.clone();
        let records = tokio::task::spawn_blocking(move || {
            let db = (provider.connect)()?;
            QueryExecutor::new(db.as_ref(), &provider.catalog)
                .with_config(provider.config.clone())
                .execute(&request)
                .map(|result| result.records)
        })
        .await??;
        Ok(records)
    }
}

impl std::fmt::Debug for LocalProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use georm_core::catalog::{ClassDef, ColumnBinding, PropertyDef, SchemaBundle};
    use georm_proto::{Criterion, ValueKind};

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::new(
                SchemaBundle::new().with_class(
                    ClassDef::new("Item")
                        .with_table("items", "id")
                        .with_id_property("Id")
                        .with_property(
                            PropertyDef::new("Id", ValueKind::String)
                                .with_column(ColumnBinding::new("id")),
                        )
                        .with_property(
                            PropertyDef::new("Name", ValueKind::String)
                                .with_column(ColumnBinding::new("name")),
                        )
                        .queryable(),
                ),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_local_query() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_script(
            "CREATE TABLE items (id TEXT PRIMARY KEY, name TEXT);
             INSERT INTO items VALUES ('a', 'alpha'), ('b', 'beta');",
        )
        .unwrap();
        let provider = LocalProvider::new(Arc::new(db), catalog());

        let records = provider
            .query(&QueryRequest::new("Item").filter(Criterion::eq("Name", "beta")))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_deref(), Some("b"));

        let err = provider.query(&QueryRequest::new("Missing")).await.unwrap_err();
        assert!(!err.is_database());
    }

    #[tokio::test]
    async fn test_missing_table_is_database_error() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let provider = LocalProvider::new(Arc::new(db), catalog());
        let err = provider.query(&QueryRequest::new("Item")).await.unwrap_err();
        assert!(err.is_database());
    }
}
