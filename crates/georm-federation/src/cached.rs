//! Cache-through provider: answer from the mirror tables and a remote
//! source, writing what the remote returned back into the cache.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use georm_core::CacheManager;
use georm_proto::{QueryRequest, Record};
use tracing::{debug, warn};

use crate::error::Error;
use crate::provider::QueryProvider;

/// Wraps a remote provider with a cache.
///
/// The result holds every fetched record plus the cached records the fetch
/// did not return; a fetched record replaces a cached one with the same id.
/// When the remote fails for environmental reasons and the cache has
/// records, the cached records are returned. Cache failures other than a
/// rejected request are logged and the remote answer is used alone.
pub struct CacheThroughProvider {
    cache: CacheManager,
    remote: Arc<dyn QueryProvider>,
    tag: String,
}

impl CacheThroughProvider {
    /// `tag` is stored as the source of fetched records in the cache.
    pub fn new(cache: CacheManager, remote: Arc<dyn QueryProvider>, tag: impl Into<String>) -> Self {
        Self {
            cache,
            remote,
            tag: tag.into(),
        }
    }

    async fn read_cache(&self, request: &QueryRequest) -> Result<Vec<Record>, Error> {
        let cache = self.cache.clone();
        let request = request.clone();
        let cached = tokio::task::spawn_blocking(move || cache.query(&request)).await??;
        Ok(cached)
    }

    async fn write_cache(&self, class: &str, records: Vec<Record>) -> Result<(), Error> {
        let cache = self.cache.clone();
        let class = class.to_string();
        let summary =
            tokio::task::spawn_blocking(move || cache.insert(&records, &class, &[])).await??;
        debug!(source = %self.tag, records = summary.records, chunks = summary.chunks, "cached fetched records");
        Ok(())
    }
}

impl std::fmt::Debug for CacheThroughProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheThroughProvider")
            .field("cache", &self.cache)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl QueryProvider for CacheThroughProvider {
    async fn query(&self, request: &QueryRequest) -> Result<Vec<Record>, Error> {
        let cached = match self.read_cache(request).await {
            Ok(cached) => cached,
            Err(e) if e.is_user() => return Err(e),
            Err(e) => {
                warn!(source = %self.tag, error = %e, "cache read failed, querying remote only");
                Vec::new()
            }
        };

        let mut fetched = match self.remote.query(request).await {
            Ok(fetched) => fetched,
            Err(e) if !e.is_user() && !cached.is_empty() => {
                warn!(
                    source = %self.tag,
                    error = %e,
                    cached = cached.len(),
                    "remote failed, answering from cache"
                );
                return Ok(cached);
            }
            Err(e) => return Err(e),
        };
        for record in &mut fetched {
            if record.extended.source.is_none() {
                record.extended.source = Some(self.tag.clone());
            }
        }

        let writable: Vec<Record> = fetched.iter().filter(|r| r.id.is_some()).cloned().collect();
        if !writable.is_empty() {
            if let Err(e) = self.write_cache(&request.class, writable).await {
                warn!(source = %self.tag, error = %e, "cache write failed");
            }
        }

        Ok(merge_fetched(fetched, cached))
    }
}

/// Fetched records followed by the cached records whose id was not fetched.
fn merge_fetched(fetched: Vec<Record>, cached: Vec<Record>) -> Vec<Record> {
    let fetched_ids: HashSet<String> = fetched.iter().filter_map(|r| r.id.clone()).collect();
    let mut merged = fetched;
    merged.extend(
        cached
            .into_iter()
            .filter(|r| r.id.as_ref().map_or(true, |id| !fetched_ids.contains(id))),
    );
    merged
}
