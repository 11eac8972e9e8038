//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use georm_core::catalog::BindingSource;
use georm_core::{
    CacheManager, Catalog, CompileOptions, Database, QueryCompiler, QueryExecutor, SchemaBundle,
    SqliteDatabase,
};
use georm_federation::{
    CacheThroughProvider, Federation, HttpFetcher, HttpProvider, JsonRecordSource, LocalProvider,
    QueryProvider,
};
use georm_proto::QueryRequest;
use tracing::info;

use crate::config::{CompileArgs, InitCacheArgs, QueryArgs};
use crate::error::CliError;
use crate::formatter::create_formatter;

/// Source tag of the local database in federated queries.
const LOCAL_SOURCE: &str = "local";

fn load_catalog(path: &Path) -> Result<Catalog, CliError> {
    Ok(Catalog::new(SchemaBundle::load(path)?)?)
}

fn load_request(path: &Path) -> Result<QueryRequest, CliError> {
    let json = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// `georm compile`
pub fn compile(args: &CompileArgs) -> Result<String, CliError> {
    let catalog = load_catalog(&args.schema.schema)?;
    let request = load_request(&args.request)?;
    let options = if args.cache {
        CompileOptions::cache()
    } else {
        CompileOptions::default()
    };
    let compiled = QueryCompiler::new(&catalog, args.compiler_config()).compile_with(&request, &options)?;
    Ok(create_formatter(args.schema.format).format_compiled(&compiled))
}

/// `georm query`
pub async fn query(args: &QueryArgs) -> Result<String, CliError> {
    let catalog = Arc::new(load_catalog(&args.schema.schema)?);
    let request = load_request(&args.request)?;
    let formatter = create_formatter(args.schema.format);

    if args.cache {
        let db: Arc<dyn Database> = Arc::new(SqliteDatabase::open(&args.db)?);
        let cache = CacheManager::new(db, catalog).with_config(args.cache_config());
        let records = cache.query(&request)?;
        return Ok(formatter.format_records(&records, None));
    }

    if args.remote.is_empty() {
        let db = SqliteDatabase::open(&args.db)?;
        let result = QueryExecutor::new(&db, &catalog).execute(&request)?;
        return Ok(formatter.format_records(&result.records, result.total_count));
    }

    let mut federation = Federation::new()
        .with_config(args.federation_config())
        .with_source(
            LOCAL_SOURCE,
            Arc::new(LocalProvider::sqlite(args.db.clone(), catalog.clone())),
        );
    for endpoint in &args.remote {
        let fetcher = HttpFetcher::new(&args.http_config(endpoint))?;
        let remote: Arc<dyn QueryProvider> = Arc::new(HttpProvider::new(
            fetcher,
            Arc::new(JsonRecordSource::new(endpoint)?),
        ));
        let provider: Arc<dyn QueryProvider> = if args.through_cache {
            let db: Arc<dyn Database> = Arc::new(SqliteDatabase::open(&args.db)?);
            let cache = CacheManager::new(db, catalog.clone()).with_config(args.cache_config());
            Arc::new(CacheThroughProvider::new(cache, remote, endpoint.clone()))
        } else {
            remote
        };
        federation = federation.with_source(endpoint.clone(), provider);
    }

    let records = federation.query(&request).await?;
    Ok(formatter.format_records(&records, None))
}

/// `georm init-cache`
pub fn init_cache(args: &InitCacheArgs) -> Result<String, CliError> {
    let catalog = Arc::new(load_catalog(&args.schema.schema)?);
    let classes: Vec<String> = if args.class.is_empty() {
        catalog
            .class_names()
            .filter(|name| {
                catalog
                    .get_class(name)
                    .is_some_and(|c| c.own_table(BindingSource::Cache).is_some())
            })
            .map(str::to_string)
            .collect()
    } else {
        args.class.clone()
    };

    let db: Arc<dyn Database> = Arc::new(SqliteDatabase::open(&args.db)?);
    let cache = CacheManager::new(db, catalog.clone());
    let mut tables = Vec::with_capacity(classes.len());
    for class in &classes {
        cache.create_mirror_table(class, &[])?;
        let table = catalog.table_binding(class, BindingSource::Cache)?.name.clone();
        info!(class = %class, table = %table, "mirror table ready");
        tables.push(format!("{} -> {}", class, table));
    }

    let formatter = create_formatter(args.schema.format);
    if tables.is_empty() {
        return Ok(formatter.format_message("No classes with a mirror table"));
    }
    Ok(formatter.format_message(&format!(
        "Created {} mirror table(s): {}",
        tables.len(),
        tables.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheArgs, DialectArg, SchemaArgs};
    use crate::formatter::OutputFormat;
    use georm_core::catalog::{ClassDef, ColumnBinding, PropertyDef};
    use georm_proto::{Criterion, Record, ValueKind};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let bundle = SchemaBundle::new().with_class(
                ClassDef::new("Item")
                    .with_table("items", "id")
                    .with_cache_table("cached_items", "Id")
                    .with_id_property("Id")
                    .with_property(
                        PropertyDef::new("Id", ValueKind::String)
                            .with_column(ColumnBinding::new("id"))
                            .with_cache_column(ColumnBinding::new("Id")),
                    )
                    .with_property(
                        PropertyDef::new("Name", ValueKind::String)
                            .with_column(ColumnBinding::new("name"))
                            .with_cache_column(ColumnBinding::new("Name")),
                    )
                    .queryable(),
            );
            std::fs::write(dir.path().join("schema.json"), bundle.to_json().unwrap()).unwrap();

            let request = QueryRequest::new("Item")
                .filter(Criterion::like("Name", "a%"))
                .with_count();
            std::fs::write(
                dir.path().join("request.json"),
                serde_json::to_string(&request).unwrap(),
            )
            .unwrap();

            let db = SqliteDatabase::open(dir.path().join("local.db")).unwrap();
            db.execute_script(
                "CREATE TABLE items (id TEXT PRIMARY KEY, name TEXT);
                 INSERT INTO items VALUES ('1', 'alpha'), ('2', 'beta'), ('3', 'alder');",
            )
            .unwrap();
            Self { dir }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn schema_args(&self, format: OutputFormat) -> SchemaArgs {
            SchemaArgs {
                schema: self.path("schema.json"),
                format,
            }
        }

        fn query_args(&self, format: OutputFormat) -> QueryArgs {
            QueryArgs {
                schema: self.schema_args(format),
                db: self.path("local.db"),
                request: self.path("request.json"),
                cache: false,
                remote: Vec::new(),
                through_cache: false,
                source_timeout_ms: None,
                request_timeout_ms: 1_000,
                cache_args: CacheArgs {
                    ttl_days: 30,
                    parameter_ceiling: 1800,
                    stale_fraction: 0.5,
                },
            }
        }
    }

    #[test]
    fn test_compile_command() {
        let fixture = Fixture::new();
        let output = compile(&CompileArgs {
            schema: fixture.schema_args(OutputFormat::Json),
            request: fixture.path("request.json"),
            dialect: DialectArg::Sqlite,
            cache: false,
        })
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert!(parsed["sql"].as_str().unwrap().contains("LIKE @p0"));
        assert!(parsed["count_sql"].as_str().unwrap().starts_with("SELECT COUNT(*)"));
        assert_eq!(parsed["parameters"][0]["value"], "a%");

        let output = compile(&CompileArgs {
            schema: fixture.schema_args(OutputFormat::Table),
            request: fixture.path("request.json"),
            dialect: DialectArg::Sqlserver,
            cache: true,
        })
        .unwrap();
        assert!(output.contains("[cached_items]"));
    }

    #[tokio::test]
    async fn test_query_command() {
        let fixture = Fixture::new();
        let output = query(&fixture.query_args(OutputFormat::Json)).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["total_count"], 2);
        assert_eq!(parsed["records"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_init_cache_then_query_cache() {
        let fixture = Fixture::new();
        let output = init_cache(&InitCacheArgs {
            schema: fixture.schema_args(OutputFormat::Table),
            db: fixture.path("local.db"),
            class: Vec::new(),
        })
        .unwrap();
        assert_eq!(output, "Created 1 mirror table(s): Item -> cached_items");

        let db: Arc<dyn Database> = Arc::new(SqliteDatabase::open(fixture.path("local.db")).unwrap());
        let catalog = Arc::new(load_catalog(&fixture.path("schema.json")).unwrap());
        CacheManager::new(db, catalog)
            .insert(
                &[Record::new("Item")
                    .with_id("9")
                    .with_property("Id", "9")
                    .with_property("Name", "aurora")
                    .with_complete(true)],
                "Item",
                &[],
            )
            .unwrap();

        let mut args = fixture.query_args(OutputFormat::Json);
        args.cache = true;
        let output = query(&args).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["id"], "9");
        assert_eq!(parsed[0]["complete"], true);
    }

    #[test]
    fn test_missing_request_file() {
        let fixture = Fixture::new();
        let err = compile(&CompileArgs {
            schema: fixture.schema_args(OutputFormat::Table),
            request: fixture.path("absent.json"),
            dialect: DialectArg::Sqlite,
            cache: false,
        })
        .unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }
}
