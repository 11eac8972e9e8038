//! Command-line arguments and their mapping onto library configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use georm_core::config::{DEFAULT_PARAMETER_CEILING, DEFAULT_STALE_INCOMPLETE_FRACTION, DEFAULT_TTL_DAYS};
use georm_core::{CacheConfig, CompilerConfig, Dialect};
use georm_federation::{FederationConfig, HttpSourceConfig};

use crate::formatter::OutputFormat;

/// georm command-line interface
#[derive(Parser, Debug)]
#[command(name = "georm")]
#[command(version, about = "Compile and run schema-driven object queries")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the SQL, count SQL and parameters of a query request
    Compile(CompileArgs),
    /// Run a query request against a SQLite database and optional remote sources
    Query(QueryArgs),
    /// Create cache mirror tables
    InitCache(InitCacheArgs),
}

/// SQL dialect selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DialectArg {
    Sqlite,
    Sqlserver,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Sqlite => Dialect::Sqlite,
            DialectArg::Sqlserver => Dialect::SqlServer,
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SchemaArgs {
    /// Schema bundle (JSON)
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CacheArgs {
    /// Cached records older than this many days are ignored
    #[arg(long, default_value_t = DEFAULT_TTL_DAYS)]
    pub ttl_days: u32,

    /// Maximum parameters per cache write statement
    #[arg(long, default_value_t = DEFAULT_PARAMETER_CEILING)]
    pub parameter_ceiling: usize,

    /// Fraction of the TTL after which an incomplete cached row is replaced
    #[arg(long, default_value_t = DEFAULT_STALE_INCOMPLETE_FRACTION)]
    pub stale_fraction: f64,
}

impl CacheArgs {
    pub fn into_config(self, dialect: Dialect) -> CacheConfig {
        CacheConfig::default()
            .ttl_days(self.ttl_days)
            .parameter_ceiling(self.parameter_ceiling)
            .stale_incomplete_fraction(self.stale_fraction)
            .dialect(dialect)
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CompileArgs {
    #[command(flatten)]
    pub schema: SchemaArgs,

    /// Query request (JSON)
    #[arg(short, long)]
    pub request: PathBuf,

    /// Target SQL dialect
    #[arg(long, default_value = "sqlite", value_enum)]
    pub dialect: DialectArg,

    /// Compile against the cache mirror tables
    #[arg(long)]
    pub cache: bool,
}

impl CompileArgs {
    pub fn compiler_config(&self) -> CompilerConfig {
        CompilerConfig::new(self.dialect.into())
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct QueryArgs {
    #[command(flatten)]
    pub schema: SchemaArgs,

    /// SQLite database file
    #[arg(short, long)]
    pub db: PathBuf,

    /// Query request (JSON)
    #[arg(short, long)]
    pub request: PathBuf,

    /// Read the cache mirror tables instead of the primary tables
    #[arg(long, conflicts_with = "remote")]
    pub cache: bool,

    /// Remote georm endpoint queried alongside the local database (repeatable)
    #[arg(long)]
    pub remote: Vec<String>,

    /// Write remote results into the cache and serve cached records
    #[arg(long, requires = "remote")]
    pub through_cache: bool,

    /// Per-source timeout in milliseconds
    #[arg(long)]
    pub source_timeout_ms: Option<u64>,

    /// Remote request timeout in milliseconds
    #[arg(long, default_value_t = georm_federation::config::DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,

    #[command(flatten)]
    pub cache_args: CacheArgs,
}

impl QueryArgs {
    pub fn federation_config(&self) -> FederationConfig {
        let mut config = FederationConfig::default();
        if let Some(ms) = self.source_timeout_ms {
            config = config.with_source_timeout(Duration::from_millis(ms));
        }
        config
    }

    pub fn http_config(&self, endpoint: &str) -> HttpSourceConfig {
        HttpSourceConfig::new(endpoint)
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
    }

    pub fn cache_config(&self) -> CacheConfig {
        self.cache_args.clone().into_config(Dialect::Sqlite)
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct InitCacheArgs {
    #[command(flatten)]
    pub schema: SchemaArgs,

    /// SQLite database file
    #[arg(short, long)]
    pub db: PathBuf,

    /// Classes whose mirror tables to create; all classes with a mirror table when omitted
    #[arg(short, long)]
    pub class: Vec<String>,
}
