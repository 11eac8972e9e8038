//! Object query compilation and execution.
//!
//! - [`planner`] walks class hierarchies and submits the joins they need
//! - [`compiler`] lowers a [`georm_proto::QueryRequest`] into SQL plus a read-plan
//! - [`materializer`] turns result rows back into records
//! - [`executor`] runs compiled queries against a [`crate::backend::Database`]

pub mod compiler;
pub mod executor;
pub mod materializer;
pub mod planner;

pub use compiler::{CompileOptions, CompiledQuery, ExtraSelect, QueryCompiler, SelectedProperty};
pub use executor::{fetch_records, QueryExecutor, QueryResult};
pub use materializer::Materializer;
pub use planner::JoinPlanner;
