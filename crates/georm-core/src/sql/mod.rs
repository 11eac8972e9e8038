//! SQL generation primitives.
//!
//! Everything here is scoped to a single statement: the alias allocator,
//! the join graph arena, the parameter list and the read-plan are created by
//! [`SqlStatementBuilder::new`] and dropped with it.

mod alias;
mod dialect;
mod params;
mod read_plan;
mod statement;
mod table;
mod where_clause;

pub use alias::AliasAllocator;
pub use dialect::{default_srid_column, Dialect, DEFAULT_SRID_SUFFIX};
pub use params::{ColumnType, Parameter, ParameterList};
pub use read_plan::{PropertySlot, ReadPlan};
pub use statement::{SelectCategory, SqlStatementBuilder};
pub use table::{JoinEdge, JoinGraph, TableDescriptor, TableId};
pub use where_clause::WhereClause;
