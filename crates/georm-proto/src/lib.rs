//! georm protocol types.
//!
//! This crate defines the data exchanged between the georm layers and their
//! callers: runtime values, materialized records, spatial polygons and the
//! object query request with its where-criteria tree. Everything here is
//! plain data with serde support; schema resolution and SQL lowering live in
//! `georm-core`.
//!
//! # Modules
//!
//! - [`value`] - Runtime values and property kinds
//! - [`polygon`] - Spatial polygon descriptor and bounding boxes
//! - [`record`] - Materialized records and cache bookkeeping metadata
//! - [`query`] - Query request and where-criteria types
//! - [`error`] - Protocol error types and the shared error classification

pub mod error;
pub mod polygon;
pub mod query;
pub mod record;
pub mod value;

pub use error::{Error, ErrorKind};

// Re-export commonly used types at crate root
pub use polygon::{BoundingBox, PolygonDescriptor};
pub use query::{
    CriteriaItem, Criterion, IdSetCriterion, LogicalOperator, Operand, Operator, OrderDirection,
    OrderSpec, Pagination, PropertyCriterion, QueryRequest, RelatedCriterion,
    RelationshipDirection, WhereCriteria,
};
pub use record::{ExtendedData, PhaseState, Record};
pub use value::{Value, ValueKind};
