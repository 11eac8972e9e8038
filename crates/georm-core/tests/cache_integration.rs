//! Integration tests for the cache manager on SQLite mirror tables.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use georm_core::backend::RowCallback;
use georm_core::cache::MirrorLayout;
use georm_core::catalog::{BBoxColumns, Catalog, ClassDef, ColumnBinding, PropertyDef, SchemaBundle, SpatialColumn};
use georm_core::query::ExtraSelect;
use georm_core::sql::ColumnType;
use georm_core::{
    CacheConfig, CacheManager, Command, Database, Dialect, Error, ExtraColumn, SqliteDatabase,
};
use georm_proto::{
    Criterion, PhaseState, PolygonDescriptor, QueryRequest, Record, Value, ValueKind,
    WhereCriteria,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

/// Wraps a database and records every batch it executes.
struct RecordingDatabase {
    inner: SqliteDatabase,
    batches: Mutex<Vec<Vec<Command>>>,
}

impl RecordingDatabase {
    fn new() -> Self {
        Self {
            inner: SqliteDatabase::open_in_memory().unwrap(),
            batches: Mutex::new(Vec::new()),
        }
    }
}

impl Database for RecordingDatabase {
    fn execute(&self, command: &Command) -> Result<usize, Error> {
        self.inner.execute(command)
    }

    fn query(&self, command: &Command, on_row: &mut RowCallback<'_>) -> Result<(), Error> {
        self.inner.query(command, on_row)
    }

    fn execute_batch(&self, commands: &[Command]) -> Result<usize, Error> {
        self.batches.lock().push(commands.to_vec());
        self.inner.execute_batch(commands)
    }
}

struct TestContext {
    db: Arc<RecordingDatabase>,
    cache: CacheManager,
}

impl TestContext {
    fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    fn with_config(config: CacheConfig) -> Self {
        let db = Arc::new(RecordingDatabase::new());
        let shared: Arc<dyn Database> = db.clone();
        let cache = CacheManager::new(shared, Arc::new(catalog())).with_config(config);
        cache.create_mirror_table("Item", &[]).unwrap();
        cache.create_mirror_table("Scene", &[]).unwrap();
        Self { db, cache }
    }

    fn names(&self, request: &QueryRequest, now: NaiveDateTime) -> Vec<String> {
        let mut names: Vec<String> = self
            .cache
            .query_at(request, now)
            .unwrap()
            .iter()
            .filter_map(|r| r.get("Name").and_then(Value::as_str).map(str::to_string))
            .collect();
        names.sort();
        names
    }
}

fn catalog() -> Catalog {
    let column = |name: &str| ColumnBinding::new(name);
    Catalog::new(
        SchemaBundle::new()
            .with_class(
                ClassDef::new("Item")
                    .with_table("items", "Id")
                    .with_cache_table("cached_items", "Id")
                    .with_id_property("Id")
                    .with_stream_column("Payload")
                    .with_property(PropertyDef::new("Id", ValueKind::String).mirrored(column("Id")))
                    .with_property(
                        PropertyDef::new("Name", ValueKind::String).mirrored(column("Name")),
                    )
                    .with_property(
                        PropertyDef::new("Cloud", ValueKind::Double).mirrored(column("Cloud")),
                    )
                    .with_property(
                        PropertyDef::new("Acquired", ValueKind::DateTime)
                            .mirrored(column("Acquired")),
                    )
                    .with_property(PropertyDef::new("Footprint", ValueKind::Polygon).mirrored(
                        column("Footprint").with_spatial(
                            SpatialColumn::default().with_bbox(BBoxColumns::prefixed("Fp")),
                        ),
                    ))
                    .queryable(),
            )
            .with_class(
                ClassDef::new("Scene")
                    .with_table("scenes", "Id")
                    .with_cache_table("cached_scenes", "Id")
                    .with_id_property("Id")
                    .two_phase()
                    .with_property(PropertyDef::new("Id", ValueKind::String).mirrored(column("Id")))
                    .with_property(
                        PropertyDef::new("Title", ValueKind::String).mirrored(column("Title")),
                    )
                    .queryable(),
            ),
    )
    .unwrap()
}

fn day(n: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        + Duration::days(n)
}

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

fn item(id: &str, name: &str) -> Record {
    Record::new("Item")
        .with_id(id)
        .with_property("Id", id)
        .with_property("Name", name)
        .with_complete(true)
}

#[test]
fn test_ttl_boundaries() {
    let ctx = TestContext::with_config(CacheConfig::default().ttl_days(30));
    ctx.cache
        .insert_at(&[item("a", "alpha")], "Item", &[], day(0))
        .unwrap();

    let request = QueryRequest::new("Item");
    assert_eq!(ctx.names(&request, day(29)), vec!["alpha"]);
    assert_eq!(ctx.names(&request, day(30)), vec!["alpha"]);
    assert!(ctx.names(&request, day(31)).is_empty());
}

#[test]
fn test_chunking_follows_parameter_ceiling() {
    let layout = MirrorLayout::new(&catalog(), "Item", Dialect::Sqlite, &[]).unwrap();
    let per_row = layout.params_per_row();
    let ctx = TestContext::with_config(CacheConfig::default().parameter_ceiling(3 * per_row + 1));

    let records: Vec<Record> = (0..25)
        .map(|i| item(&format!("item-{:02}", i), &format!("n{}", i)))
        .collect();
    let summary = ctx.cache.insert_at(&records, "Item", &[], day(0)).unwrap();
    assert_eq!(summary.rows_per_chunk, 3);
    assert_eq!(summary.chunks, 9);
    assert_eq!(summary.records, 25);

    let batches = ctx.db.batches.lock();
    assert_eq!(batches.len(), 9);
    for batch in batches.iter() {
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|c| c.parameters.len() <= 3 * per_row + 1));
    }
    let last = Value::from("item-24");
    let inserts_with_last = batches
        .iter()
        .filter(|batch| batch[1].parameters.iter().any(|p| p.value == last))
        .count();
    assert_eq!(inserts_with_last, 1);
    drop(batches);

    let stored = ctx.cache.query_at(&QueryRequest::new("Item"), day(1)).unwrap();
    assert_eq!(stored.len(), 25);
}

#[test]
fn test_complete_record_reads_back() {
    let ctx = TestContext::new();
    let footprint = PolygonDescriptor::rectangle(1.5, 2.0, 3.25, 4.0);
    let acquired = day(-3);
    let record = item("a", "alpha")
        .with_property("Cloud", 0.25)
        .with_property("Acquired", Value::DateTime(acquired))
        .with_property("Footprint", Value::Polygon(footprint))
        .with_stream(vec![7u8, 8, 9])
        .with_source("remote");
    ctx.cache
        .insert_at(std::slice::from_ref(&record), "Item", &[], day(0))
        .unwrap();

    let read = ctx
        .cache
        .query_at(&QueryRequest::new("Item").with_stream(), day(1))
        .unwrap();
    assert_eq!(read.len(), 1);
    let cached = &read[0];
    assert_eq!(cached.id, record.id);
    assert_eq!(cached.properties, record.properties);
    assert_eq!(cached.stream, record.stream);
    assert_eq!(cached.extended.source.as_deref(), Some("remote"));
    assert_eq!(cached.extended.date_created, Some(day(0)));
    assert!(cached.is_complete());
    assert!(cached.extended.extra.is_empty());
}

#[test]
fn test_replacement_rules() {
    let ctx = TestContext::with_config(CacheConfig::default().ttl_days(30));
    let request = QueryRequest::new("Item");

    ctx.cache
        .insert_at(&[item("a", "v1")], "Item", &[], day(0))
        .unwrap();

    // a fresh complete row survives an incomplete write
    ctx.cache
        .insert_at(&[item("a", "v2").with_complete(false)], "Item", &[], day(1))
        .unwrap();
    assert_eq!(ctx.names(&request, day(2)), vec!["v1"]);

    // past the stale cutoff the incomplete write replaces it
    ctx.cache
        .insert_at(&[item("a", "v3").with_complete(false)], "Item", &[], day(20))
        .unwrap();
    assert_eq!(ctx.names(&request, day(21)), vec!["v3"]);

    // incomplete over incomplete always replaces
    ctx.cache
        .insert_at(&[item("a", "v4").with_complete(false)], "Item", &[], day(21))
        .unwrap();
    assert_eq!(ctx.names(&request, day(22)), vec!["v4"]);

    // complete always replaces
    ctx.cache
        .insert_at(&[item("a", "v5")], "Item", &[], day(22))
        .unwrap();
    let read = ctx.cache.query_at(&request, day(23)).unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].get("Name"), Some(&Value::from("v5")));
    assert!(read[0].is_complete());
}

#[test]
fn test_duplicates_keep_first() {
    let ctx = TestContext::new();
    let summary = ctx
        .cache
        .insert_at(&[item("a", "first"), item("a", "second")], "Item", &[], day(0))
        .unwrap();
    assert_eq!(summary.records, 1);
    assert_eq!(ctx.names(&QueryRequest::new("Item"), day(0)), vec!["first"]);
}

#[test]
fn test_sources_are_kept_apart() {
    let ctx = TestContext::new();
    ctx.cache
        .insert_at(
            &[
                item("a", "from-remote").with_source("remote"),
                item("a", "from-archive").with_source("archive"),
            ],
            "Item",
            &[],
            day(0),
        )
        .unwrap();

    let read = ctx.cache.query_at(&QueryRequest::new("Item"), day(0)).unwrap();
    let mut sources: Vec<&str> = read
        .iter()
        .filter_map(|r| r.extended.source.as_deref())
        .collect();
    sources.sort();
    assert_eq!(sources, vec!["archive", "remote"]);
}

#[test]
fn test_polygon_query_uses_exact_geometry() {
    let ctx = TestContext::new();
    let l_shape = PolygonDescriptor::new(vec![
        [0.0, 0.0],
        [10.0, 0.0],
        [10.0, 1.0],
        [1.0, 1.0],
        [1.0, 10.0],
        [0.0, 10.0],
    ]);
    ctx.cache
        .insert(
            &[
                item("l", "l-shape").with_property("Footprint", Value::Polygon(l_shape)),
                item("hit", "hit").with_property(
                    "Footprint",
                    Value::Polygon(PolygonDescriptor::rectangle(4.0, 4.0, 5.5, 5.5)),
                ),
                item("none", "no-footprint"),
            ],
            "Item",
            &[],
        )
        .unwrap();

    let probe = PolygonDescriptor::rectangle(5.0, 5.0, 6.0, 6.0);
    let read = ctx
        .cache
        .query_by_polygon("Item", probe.clone(), WhereCriteria::new())
        .unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].id.as_deref(), Some("hit"));
    assert!(read[0].get("Footprint").is_some());

    let names = ctx.names(
        &QueryRequest::new("Item")
            .with_select(["Name"])
            .with_polygon(probe),
        now(),
    );
    assert_eq!(names, vec!["hit"]);
    let read = ctx
        .cache
        .query_at(
            &QueryRequest::new("Item")
                .with_select(["Name"])
                .with_polygon(PolygonDescriptor::rectangle(-1.0, -1.0, 20.0, 20.0)),
            now(),
        )
        .unwrap();
    assert_eq!(read.len(), 2);
    assert!(read.iter().all(|r| r.get("Footprint").is_none()));
}

#[test]
fn test_query_by_ids() {
    let ctx = TestContext::new();
    ctx.cache
        .insert(
            &[
                item("a", "alpha").with_property("Cloud", 0.1),
                item("b", "beta").with_property("Cloud", 0.2),
                item("c", "gamma").with_property("Cloud", 0.9),
            ],
            "Item",
            &[],
        )
        .unwrap();

    let ids = vec!["a".to_string(), "c".to_string()];
    let read = ctx
        .cache
        .query_by_ids("Item", &ids, WhereCriteria::single(Criterion::lt("Cloud", 0.5)))
        .unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].id.as_deref(), Some("a"));

    let read = ctx.cache.query_by_ids("Item", &ids, WhereCriteria::new()).unwrap();
    assert_eq!(read.len(), 2);
    assert!(ctx.cache.query_by_ids("Item", &[], WhereCriteria::new()).unwrap().is_empty());
}

#[test]
fn test_two_phase_expired_phase_marks_incomplete() {
    let ctx = TestContext::with_config(CacheConfig::default().ttl_days(30));
    let mut scene = Record::new("Scene")
        .with_id("s1")
        .with_property("Id", "s1")
        .with_property("Title", "scene")
        .with_complete(true);
    scene.extended.metadata = Some(PhaseState::new(true, Some(day(0))));
    scene.extended.payload = Some(PhaseState::new(true, Some(day(20))));
    ctx.cache.insert_at(&[scene], "Scene", &[], day(20)).unwrap();

    let read = ctx
        .cache
        .query_at(&QueryRequest::new("Scene"), day(25))
        .unwrap();
    assert_eq!(read.len(), 1);
    assert!(read[0].is_complete());

    let read = ctx
        .cache
        .query_at(&QueryRequest::new("Scene"), day(35))
        .unwrap();
    assert_eq!(read.len(), 1);
    let extended = &read[0].extended;
    assert_eq!(extended.metadata, Some(PhaseState::new(false, Some(day(0)))));
    assert_eq!(extended.payload, Some(PhaseState::new(true, Some(day(20)))));
    assert!(!read[0].is_complete());
}

#[test]
fn test_two_phase_expired_payload_marks_incomplete() {
    let ctx = TestContext::with_config(CacheConfig::default().ttl_days(30));
    let mut scene = Record::new("Scene")
        .with_id("s2")
        .with_property("Id", "s2")
        .with_property("Title", "payload first")
        .with_complete(true);
    scene.extended.metadata = Some(PhaseState::new(true, Some(day(20))));
    scene.extended.payload = Some(PhaseState::new(true, Some(day(0))));
    ctx.cache.insert_at(&[scene], "Scene", &[], day(20)).unwrap();

    // only the payload phase is past the TTL; the record itself is not
    let read = ctx
        .cache
        .query_at(&QueryRequest::new("Scene"), day(35))
        .unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].id.as_deref(), Some("s2"));
    let extended = &read[0].extended;
    assert_eq!(extended.metadata, Some(PhaseState::new(true, Some(day(20)))));
    assert_eq!(extended.payload, Some(PhaseState::new(false, Some(day(0)))));
    assert!(!read[0].is_complete());

    // once the record's own DateCreated expires it is dropped
    let read = ctx
        .cache
        .query_at(&QueryRequest::new("Scene"), day(51))
        .unwrap();
    assert!(read.is_empty());
}

#[test]
fn test_extra_columns() {
    let db: Arc<dyn Database> = Arc::new(SqliteDatabase::open_in_memory().unwrap());
    let cache = CacheManager::new(db, Arc::new(catalog()))
        .with_read_extra(ExtraSelect::column("Region", ColumnType::String));
    let extras = [ExtraColumn::constant("Region", Value::from("eu"), ColumnType::String)];

    let ddl = cache.mirror_table_sql("Item", &extras).unwrap();
    assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"cached_items\""));
    assert!(ddl.contains("\"Region\" TEXT"));
    assert!(ddl.ends_with("PRIMARY KEY (\"Id\", \"Source\"))"));

    cache.create_mirror_table("Item", &extras).unwrap();
    cache.insert(&[item("a", "alpha")], "Item", &extras).unwrap();
    let read = cache.query(&QueryRequest::new("Item")).unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].extended.extra.get("Region"), Some(&Value::from("eu")));
}
