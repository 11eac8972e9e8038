//! End-to-end federation tests with in-process providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use georm_core::catalog::{ClassDef, ColumnBinding, PropertyDef, SchemaBundle};
use georm_core::{CacheManager, Catalog, Database, SqliteDatabase};
use georm_federation::{
    CacheThroughProvider, Error, Federation, FederationConfig, LocalProvider, QueryProvider,
};
use georm_proto::{QueryRequest, Record, Value, ValueKind};
use pretty_assertions::assert_eq;

/// Returns fixed records or a fixed error after an optional delay.
struct StaticProvider {
    delay: Option<Duration>,
    outcome: fn() -> Result<Vec<Record>, Error>,
    calls: AtomicUsize,
}

impl StaticProvider {
    fn new(outcome: fn() -> Result<Vec<Record>, Error>) -> Self {
        Self {
            delay: None,
            outcome,
            calls: AtomicUsize::new(0),
        }
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl QueryProvider for StaticProvider {
    async fn query(&self, _request: &QueryRequest) -> Result<Vec<Record>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.outcome)()
    }
}

struct PanickingProvider;

#[async_trait]
impl QueryProvider for PanickingProvider {
    async fn query(&self, _request: &QueryRequest) -> Result<Vec<Record>, Error> {
        panic!("provider bug");
    }
}

fn remote_records() -> Result<Vec<Record>, Error> {
    Ok(vec![
        Record::new("Item")
            .with_id("r1")
            .with_property("Id", "r1")
            .with_property("Name", "remote-one")
            .with_complete(true),
        Record::new("Item")
            .with_id("shared")
            .with_property("Id", "shared")
            .with_property("Name", "remote-shared")
            .with_complete(true),
    ])
}

fn unavailable() -> Result<Vec<Record>, Error> {
    Err(Error::ServiceUnavailable("http://remote".into()))
}

fn database_down() -> Result<Vec<Record>, Error> {
    Err(georm_core::Error::Database("disk I/O error".into()).into())
}

fn bad_request() -> Result<Vec<Record>, Error> {
    Err(georm_core::Error::InvalidRequest("empty id set".into()).into())
}

fn catalog() -> Arc<Catalog> {
    let column = |name: &str| ColumnBinding::new(name);
    Arc::new(
        Catalog::new(
            SchemaBundle::new().with_class(
                ClassDef::new("Item")
                    .with_table("items", "Id")
                    .with_cache_table("cached_items", "Id")
                    .with_id_property("Id")
                    .with_property(PropertyDef::new("Id", ValueKind::String).mirrored(column("Id")))
                    .with_property(
                        PropertyDef::new("Name", ValueKind::String).mirrored(column("Name")),
                    )
                    .queryable(),
            ),
        )
        .unwrap(),
    )
}

fn local_db() -> Arc<dyn Database> {
    let db = SqliteDatabase::open_in_memory().unwrap();
    db.execute_script(
        "CREATE TABLE items (Id TEXT PRIMARY KEY, Name TEXT);
         INSERT INTO items VALUES ('l1', 'local-one'), ('shared', 'local-shared');",
    )
    .unwrap();
    Arc::new(db)
}

fn names(records: &[Record]) -> Vec<String> {
    let mut names: Vec<String> = records
        .iter()
        .filter_map(|r| r.get("Name").and_then(Value::as_str).map(str::to_string))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_local_and_remote_merge_with_tags() {
    let federation = Federation::new()
        .with_source("local", Arc::new(LocalProvider::new(local_db(), catalog())))
        .with_source("remote", Arc::new(StaticProvider::new(remote_records)));

    let records = federation.query(&QueryRequest::new("Item")).await.unwrap();
    assert_eq!(
        names(&records),
        vec!["local-one", "local-shared", "remote-one", "remote-shared"]
    );
    for record in &records {
        let expected = if record.get("Name").and_then(Value::as_str).unwrap().starts_with("local") {
            "local"
        } else {
            "remote"
        };
        assert_eq!(record.extended.source.as_deref(), Some(expected));
    }
}

#[tokio::test]
async fn test_partial_failure_returns_records() {
    let federation = Federation::new()
        .with_source("down", Arc::new(StaticProvider::new(unavailable)))
        .with_source("remote", Arc::new(StaticProvider::new(remote_records)))
        .with_source("broken", Arc::new(PanickingProvider));

    let records = federation.query(&QueryRequest::new("Item")).await.unwrap();
    assert_eq!(records.len(), 2);

    let outcomes = federation.run(&QueryRequest::new("Item")).await;
    let tags: Vec<&str> = outcomes.iter().map(|o| o.tag.as_str()).collect();
    assert_eq!(tags, vec!["down", "remote", "broken"]);
    assert!(matches!(outcomes[2].result, Err(Error::Worker(_))));
}

#[tokio::test]
async fn test_user_error_surfaces_despite_records() {
    let federation = Federation::new()
        .with_source("remote", Arc::new(StaticProvider::new(remote_records)))
        .with_source("strict", Arc::new(StaticProvider::new(bad_request)));

    let err = federation.query(&QueryRequest::new("Item")).await.unwrap_err();
    assert!(err.is_user());
}

#[tokio::test]
async fn test_all_failed_surfaces_database_error() {
    let federation = Federation::new()
        .with_source("down", Arc::new(StaticProvider::new(unavailable)))
        .with_source("local", Arc::new(StaticProvider::new(database_down)));

    let err = federation.query(&QueryRequest::new("Item")).await.unwrap_err();
    assert!(err.is_database());
}

#[tokio::test(start_paused = true)]
async fn test_source_timeout() {
    let slow = Arc::new(StaticProvider::new(remote_records).delayed(Duration::from_secs(60)));
    let federation = Federation::new()
        .with_config(FederationConfig::default().with_source_timeout(Duration::from_secs(1)))
        .with_source("slow", slow.clone());

    let err = federation.query(&QueryRequest::new("Item")).await.unwrap_err();
    match err {
        Error::Timeout { source_tag, after } => {
            assert_eq!(source_tag, "slow");
            assert_eq!(after, Duration::from_secs(1));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cache_through_writes_and_serves() {
    let cache_db: Arc<dyn Database> = Arc::new(SqliteDatabase::open_in_memory().unwrap());
    let cache = CacheManager::new(cache_db, catalog());
    cache.create_mirror_table("Item", &[]).unwrap();
    cache
        .insert(
            &[Record::new("Item")
                .with_id("cached-only")
                .with_property("Id", "cached-only")
                .with_property("Name", "from-cache")
                .with_source("remote")
                .with_complete(true)],
            "Item",
            &[],
        )
        .unwrap();

    let provider = CacheThroughProvider::new(
        cache.clone(),
        Arc::new(StaticProvider::new(remote_records)),
        "remote",
    );
    let records = provider.query(&QueryRequest::new("Item")).await.unwrap();
    assert_eq!(names(&records), vec!["from-cache", "remote-one", "remote-shared"]);

    // fetched records are now cached under the provider's tag
    let cached = cache.query(&QueryRequest::new("Item")).unwrap();
    assert_eq!(cached.len(), 3);
    assert!(cached
        .iter()
        .all(|r| r.extended.source.as_deref() == Some("remote")));

    // a failing remote falls back to the cache
    let offline = CacheThroughProvider::new(
        cache.clone(),
        Arc::new(StaticProvider::new(unavailable)),
        "remote",
    );
    let records = offline.query(&QueryRequest::new("Item")).await.unwrap();
    assert_eq!(records.len(), 3);

    // but not for user errors
    let strict = CacheThroughProvider::new(cache, Arc::new(StaticProvider::new(bad_request)), "remote");
    assert!(strict.query(&QueryRequest::new("Item")).await.unwrap_err().is_user());
}

#[tokio::test]
async fn test_cache_through_survives_missing_mirror_table() {
    // no mirror table: every cache read and write fails
    let cache_db: Arc<dyn Database> = Arc::new(SqliteDatabase::open_in_memory().unwrap());
    let cache = CacheManager::new(cache_db, catalog());
    assert!(cache.query(&QueryRequest::new("Item")).unwrap_err().is_database());

    let provider = CacheThroughProvider::new(
        cache,
        Arc::new(StaticProvider::new(remote_records)),
        "remote",
    );
    let records = provider.query(&QueryRequest::new("Item")).await.unwrap();
    assert_eq!(names(&records), vec!["remote-one", "remote-shared"]);
    assert!(records
        .iter()
        .all(|r| r.extended.source.as_deref() == Some("remote")));

    // with nothing cached to fall back on, the remote error surfaces
    let cache_db: Arc<dyn Database> = Arc::new(SqliteDatabase::open_in_memory().unwrap());
    let offline = CacheThroughProvider::new(
        CacheManager::new(cache_db, catalog()),
        Arc::new(StaticProvider::new(unavailable)),
        "remote",
    );
    assert!(matches!(
        offline.query(&QueryRequest::new("Item")).await.unwrap_err(),
        Error::ServiceUnavailable(_)
    ));
}
