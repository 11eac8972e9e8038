//! Fork-join fan-out over providers and the partial-failure merge policy.

use std::sync::Arc;

use futures::future::join_all;
use georm_proto::{QueryRequest, Record};
use tracing::{debug, info, warn};

use crate::config::FederationConfig;
use crate::error::Error;
use crate::provider::QueryProvider;

/// A provider registered under a source tag.
#[derive(Clone)]
struct Source {
    tag: String,
    provider: Arc<dyn QueryProvider>,
}

/// Result of one source.
#[derive(Debug)]
pub struct SourceOutcome {
    pub tag: String,
    pub result: Result<Vec<Record>, Error>,
}

impl SourceOutcome {
    pub fn new(tag: impl Into<String>, result: Result<Vec<Record>, Error>) -> Self {
        Self {
            tag: tag.into(),
            result,
        }
    }
}

/// Runs one query against every registered source concurrently.
#[derive(Clone, Default)]
pub struct Federation {
    sources: Vec<Source>,
    config: FederationConfig,
}

impl Federation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: FederationConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a provider. Records it returns without a source tag are
    /// tagged with `tag`.
    pub fn with_source(mut self, tag: impl Into<String>, provider: Arc<dyn QueryProvider>) -> Self {
        self.sources.push(Source {
            tag: tag.into(),
            provider,
        });
        self
    }

    /// Tags of the registered sources, in registration order.
    pub fn source_tags(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.tag.as_str())
    }

    /// Run `request` on every source and merge the results.
    pub async fn query(&self, request: &QueryRequest) -> Result<Vec<Record>, Error> {
        let outcomes = self.run(request).await;
        merge_outcomes(outcomes)
    }

    /// Run `request` on every source and return each source's result.
    ///
    /// One task per source; every task runs to completion or to the source
    /// timeout. Outcomes are in registration order.
    pub async fn run(&self, request: &QueryRequest) -> Vec<SourceOutcome> {
        let timeout = self.config.source_timeout();
        let handles: Vec<_> = self
            .sources
            .iter()
            .cloned()
            .map(|source| {
                let request = request.clone();
                let tag = source.tag.clone();
                let handle = tokio::spawn(async move {
                    let call = source.provider.query(&request);
                    let result = match timeout {
                        Some(after) => match tokio::time::timeout(after, call).await {
                            Ok(result) => result,
                            Err(_) => Err(Error::Timeout {
                                source_tag: source.tag.clone(),
                                after,
                            }),
                        },
                        None => call.await,
                    };
                    result.map(|records| tag_records(records, &source.tag))
                });
                (tag, handle)
            })
            .collect();

        let (tags, handles): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        join_all(handles)
            .await
            .into_iter()
            .zip(tags)
            .map(|(joined, tag)| {
                let result = joined.map_err(Error::from).and_then(|r| r);
                match &result {
                    Ok(records) => debug!(source = %tag, records = records.len(), "source finished"),
                    Err(e) => debug!(source = %tag, kind = %e.kind(), error = %e, "source failed"),
                }
                SourceOutcome::new(tag, result)
            })
            .collect()
    }
}

impl std::fmt::Debug for Federation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Federation")
            .field("sources", &self.source_tags().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

fn tag_records(mut records: Vec<Record>, tag: &str) -> Vec<Record> {
    for record in &mut records {
        if record.extended.source.is_none() {
            record.extended.source = Some(tag.to_string());
        }
    }
    records
}

/// Merge per-source outcomes.
///
/// - A user-input error from any source is returned, first one wins.
/// - Otherwise, when no source produced a record, the first database error
///   is returned, or failing that the first error of any kind.
/// - Otherwise the records are returned and the errors are logged and
///   dropped.
///
/// With no errors and no records the result is an empty list.
pub fn merge_outcomes(outcomes: Vec<SourceOutcome>) -> Result<Vec<Record>, Error> {
    let mut records = Vec::new();
    let mut errors: Vec<(String, Error)> = Vec::new();
    let sources = outcomes.len();
    for outcome in outcomes {
        match outcome.result {
            Ok(found) => records.extend(found),
            Err(e) => errors.push((outcome.tag, e)),
        }
    }

    if let Some(index) = errors.iter().position(|(_, e)| e.is_user()) {
        let (tag, error) = errors.swap_remove(index);
        warn!(source = %tag, error = %error, "rejecting federated query");
        return Err(error);
    }

    if records.is_empty() {
        let index = errors
            .iter()
            .position(|(_, e)| e.is_database())
            .or((!errors.is_empty()).then_some(0));
        if let Some(index) = index {
            let (_, error) = errors.swap_remove(index);
            return Err(error);
        }
    }

    for (tag, error) in &errors {
        warn!(source = %tag, kind = %error.kind(), error = %error, "suppressed source error");
    }
    info!(
        sources,
        failed = errors.len(),
        records = records.len(),
        "federated query complete"
    );
    Ok(records)
}
