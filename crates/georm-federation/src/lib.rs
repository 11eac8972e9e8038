//! georm federation.
//!
//! Fans one object query out to several independent sources and merges the
//! results:
//!
//! - [`coordinator`] - Concurrent fan-out and the partial-failure policy
//! - [`provider`] - The seam every source implements
//! - [`local`] - The local relational store
//! - [`cached`] - A remote source fronted by the cache mirror tables
//! - [`http`] - HTTP remote sources
//! - [`config`] - Timeouts for sources and remote fetches

pub mod cached;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod local;
pub mod provider;

pub use cached::CacheThroughProvider;
pub use config::{FederationConfig, HttpSourceConfig};
pub use coordinator::{merge_outcomes, Federation, SourceOutcome};
pub use error::Error;
pub use http::{classify_status, HttpFetcher, HttpProvider, JsonRecordSource, RemoteSource};
pub use local::LocalProvider;
pub use provider::QueryProvider;
