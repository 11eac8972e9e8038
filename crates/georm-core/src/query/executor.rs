//! Query execution against a [`Database`].

use bytes::Bytes;
use georm_proto::{QueryRequest, Record};
use tracing::debug;

use super::compiler::{CompileOptions, CompiledQuery, QueryCompiler};
use super::materializer::Materializer;
use crate::backend::Database;
use crate::catalog::Catalog;
use crate::config::CompilerConfig;
use crate::error::Error;

/// Records and the optional total count of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub records: Vec<Record>,
    /// Matching rows before paging, when the request asked for a count.
    pub total_count: Option<u64>,
}

/// Compiles, runs and materializes object queries.
pub struct QueryExecutor<'a, D: Database + ?Sized> {
    db: &'a D,
    catalog: &'a Catalog,
    config: CompilerConfig,
}

impl<'a, D: Database + ?Sized> QueryExecutor<'a, D> {
    /// Create an executor with the default configuration.
    pub fn new(db: &'a D, catalog: &'a Catalog) -> Self {
        Self {
            db,
            catalog,
            config: CompilerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Compile a request without running it.
    pub fn compile(&self, request: &QueryRequest) -> Result<CompiledQuery, Error> {
        QueryCompiler::new(self.catalog, self.config.clone()).compile(request)
    }

    /// Run a request against the primary tables.
    pub fn execute(&self, request: &QueryRequest) -> Result<QueryResult, Error> {
        self.execute_with(request, &CompileOptions::default())
    }

    /// Run a request with explicit compile options.
    pub fn execute_with(
        &self,
        request: &QueryRequest,
        options: &CompileOptions,
    ) -> Result<QueryResult, Error> {
        let compiled =
            QueryCompiler::new(self.catalog, self.config.clone()).compile_with(request, options)?;

        let records = fetch_records(self.db, &compiled, self.config.default_stream.as_ref())?;
        let total_count = match compiled.count_command() {
            Some(command) => Some(self.db.query_count(&command)?),
            None => None,
        };

        debug!(class = %compiled.class, records = records.len(), total = ?total_count, "query executed");
        Ok(QueryResult {
            records,
            total_count,
        })
    }

    /// Number of matches of a request, ignoring paging.
    pub fn count(&self, request: &QueryRequest) -> Result<u64, Error> {
        let mut request = request.clone();
        request.include_count = true;
        let compiled = self.compile(&request)?;
        let command = compiled
            .count_command()
            .ok_or_else(|| Error::Internal("count statement was not built".to_string()))?;
        self.db.query_count(&command)
    }
}

/// Run a compiled query, materialize its rows and apply the exact spatial
/// filter when the dialect could only prefilter.
pub fn fetch_records<D: Database + ?Sized>(
    db: &D,
    compiled: &CompiledQuery,
    default_stream: Option<&Bytes>,
) -> Result<Vec<Record>, Error> {
    let materializer = Materializer::new(compiled).with_default_stream(default_stream.cloned());
    let mut records = Vec::new();
    db.query(&compiled.command(), &mut |row| {
        records.push(materializer.materialize_row(row)?);
        Ok(())
    })?;

    match &compiled.spatial_filter {
        Some(filter) => {
            let before = records.len();
            let kept = filter.apply(records)?;
            debug!(before, after = kept.len(), "exact spatial filter applied");
            Ok(kept)
        }
        None => Ok(records),
    }
}
