//! georm core engine.
//!
//! This crate turns object queries over a class catalog into SQL and back
//! into records:
//!
//! - [`catalog`] - Classes, properties, relationships and their table bindings
//! - [`sql`] - Dialects, join graph, statement builder and read-plans
//! - [`query`] - Join planning, compilation, materialization and execution
//! - [`backend`] - Database seam and the SQLite backend
//! - [`spatial`] - WKT encoding and exact polygon filtering
//! - [`cache`] - Mirror-table reads with TTL and chunked upserts
//! - [`config`] - Compiler and cache configuration

pub mod backend;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod query;
pub mod spatial;
pub mod sql;

pub use backend::{Command, Database, RowAccess, SqliteDatabase, ValueRow};
pub use cache::{CacheManager, ExtraColumn, UpsertSummary};
pub use catalog::{BindingSource, Catalog, SchemaBundle};
pub use config::{CacheConfig, CompilerConfig};
pub use error::Error;
pub use query::{CompileOptions, CompiledQuery, QueryCompiler, QueryExecutor, QueryResult};
pub use sql::Dialect;

pub use georm_proto as proto;
