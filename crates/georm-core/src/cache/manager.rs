//! Cache manager: TTL-bounded reads from and chunked writes to mirror tables.

use std::sync::Arc;

use chrono::NaiveDateTime;
use georm_proto::{Criterion, PolygonDescriptor, QueryRequest, Record, WhereCriteria};
use tracing::debug;

use super::bookkeeping;
use super::upsert::{is_two_phase, upsert, ExtraColumn, MirrorLayout, UpsertSummary};
use crate::backend::{Command, Database};
use crate::catalog::Catalog;
use crate::config::CacheConfig;
use crate::error::Error;
use crate::query::{fetch_records, CompileOptions, ExtraSelect, QueryCompiler};

/// Reads and writes cached records in the mirror tables of one database.
#[derive(Clone)]
pub struct CacheManager {
    db: Arc<dyn Database>,
    catalog: Arc<Catalog>,
    config: CacheConfig,
    read_extras: Vec<ExtraSelect>,
}

impl CacheManager {
    pub fn new(db: Arc<dyn Database>, catalog: Arc<Catalog>) -> Self {
        Self {
            db,
            catalog,
            config: CacheConfig::default(),
            read_extras: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Read an extra mirror column into each record's extended data.
    pub fn with_read_extra(mut self, extra: ExtraSelect) -> Self {
        self.read_extras.push(extra);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Query the mirror tables, dropping records past the TTL.
    pub fn query(&self, request: &QueryRequest) -> Result<Vec<Record>, Error> {
        self.query_at(request, now())
    }

    /// [`CacheManager::query`] evaluated at a given time.
    pub fn query_at(&self, request: &QueryRequest, now: NaiveDateTime) -> Result<Vec<Record>, Error> {
        let two_phase = is_two_phase(&self.catalog, &request.class)?;
        let mut options = CompileOptions::cache();
        options.extras = bookkeeping::extras(two_phase);
        options.extras.extend(self.read_extras.iter().cloned());

        let compiled = QueryCompiler::new(&self.catalog, self.config.compiler.clone())
            .compile_with(request, &options)?;
        let records = fetch_records(
            self.db.as_ref(),
            &compiled,
            self.config.compiler.default_stream.as_ref(),
        )?;

        let fetched = records.len();
        let ttl = self.config.ttl();
        let fresh: Vec<Record> = records
            .into_iter()
            .filter_map(|mut record| {
                bookkeeping::apply(&mut record);
                bookkeeping::retain_fresh(&mut record, two_phase, now, ttl).then_some(record)
            })
            .collect();

        debug!(
            class = %request.class,
            fetched,
            fresh = fresh.len(),
            "cache query"
        );
        Ok(fresh)
    }

    /// Cached records with the given ids that also match `criteria`.
    pub fn query_by_ids(
        &self,
        class: &str,
        ids: &[String],
        criteria: WhereCriteria,
    ) -> Result<Vec<Record>, Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut where_criteria = WhereCriteria::single(Criterion::ids(ids.iter().cloned()));
        if !criteria.is_empty() {
            where_criteria = where_criteria.and(Criterion::group(criteria));
        }
        self.query(&QueryRequest::new(class).with_criteria(where_criteria))
    }

    /// Cached records intersecting `polygon` that also match `criteria`.
    pub fn query_by_polygon(
        &self,
        class: &str,
        polygon: PolygonDescriptor,
        criteria: WhereCriteria,
    ) -> Result<Vec<Record>, Error> {
        self.query(
            &QueryRequest::new(class)
                .with_polygon(polygon)
                .with_criteria(criteria),
        )
    }

    /// Write records of `class` to its mirror table.
    pub fn insert(
        &self,
        records: &[Record],
        class: &str,
        extra_columns: &[ExtraColumn],
    ) -> Result<UpsertSummary, Error> {
        self.insert_at(records, class, extra_columns, now())
    }

    /// [`CacheManager::insert`] stamped with a given time.
    pub fn insert_at(
        &self,
        records: &[Record],
        class: &str,
        extra_columns: &[ExtraColumn],
        now: NaiveDateTime,
    ) -> Result<UpsertSummary, Error> {
        let layout = self.layout(class, extra_columns)?;
        upsert(
            self.db.as_ref(),
            &layout,
            records,
            extra_columns,
            &self.config,
            now,
        )
    }

    /// `CREATE TABLE` statement for the mirror table of `class`.
    pub fn mirror_table_sql(&self, class: &str, extra_columns: &[ExtraColumn]) -> Result<String, Error> {
        Ok(self.layout(class, extra_columns)?.create_table_sql())
    }

    /// Create the mirror table of `class` when it does not exist.
    pub fn create_mirror_table(&self, class: &str, extra_columns: &[ExtraColumn]) -> Result<(), Error> {
        let sql = self.mirror_table_sql(class, extra_columns)?;
        self.db.execute(&Command::new(sql))?;
        Ok(())
    }

    fn layout(&self, class: &str, extra_columns: &[ExtraColumn]) -> Result<MirrorLayout, Error> {
        MirrorLayout::new(
            &self.catalog,
            class,
            self.config.compiler.dialect,
            extra_columns,
        )
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("read_extras", &self.read_extras)
            .finish_non_exhaustive()
    }
}

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}
