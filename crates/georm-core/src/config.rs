//! Compiler and cache configuration.

use bytes::Bytes;

use crate::sql::Dialect;

/// Default cache time-to-live in days.
pub const DEFAULT_TTL_DAYS: u32 = 30;

/// Default upper bound on parameters in one upsert command.
pub const DEFAULT_PARAMETER_CEILING: usize = 1800;

/// Default fraction of the TTL after which an incomplete cached row may be
/// replaced by another incomplete row.
pub const DEFAULT_STALE_INCOMPLETE_FRACTION: f64 = 0.5;

/// Configuration for the query compiler.
#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    /// Target SQL dialect.
    pub dialect: Dialect,
    /// Payload substituted for a null stream column.
    pub default_stream: Option<Bytes>,
}

impl CompilerConfig {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            default_stream: None,
        }
    }

    /// Set the payload substituted for null stream columns.
    pub fn with_default_stream(mut self, payload: impl Into<Bytes>) -> Self {
        self.default_stream = Some(payload.into());
        self
    }
}

/// Configuration for the cache manager.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Records older than this many days are treated as absent.
    pub ttl_days: u32,
    /// Maximum parameters per upsert command.
    pub parameter_ceiling: usize,
    /// Fraction of `ttl_days` after which an incomplete row may be replaced by
    /// another incomplete row.
    pub stale_incomplete_fraction: f64,
    /// Compiler settings for mirror-table queries.
    pub compiler: CompilerConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_days: DEFAULT_TTL_DAYS,
            parameter_ceiling: DEFAULT_PARAMETER_CEILING,
            stale_incomplete_fraction: DEFAULT_STALE_INCOMPLETE_FRACTION,
            compiler: CompilerConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Set the TTL in days.
    pub fn ttl_days(mut self, days: u32) -> Self {
        self.ttl_days = days;
        self
    }

    /// Set the parameter ceiling.
    pub fn parameter_ceiling(mut self, ceiling: usize) -> Self {
        self.parameter_ceiling = ceiling;
        self
    }

    /// Set the stale-incomplete fraction, clamped to `[0, 1]`.
    pub fn stale_incomplete_fraction(mut self, fraction: f64) -> Self {
        self.stale_incomplete_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Set the dialect of the mirror tables.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.compiler.dialect = dialect;
        self
    }

    /// Set the payload substituted for null stream columns.
    pub fn default_stream(mut self, payload: impl Into<Bytes>) -> Self {
        self.compiler.default_stream = Some(payload.into());
        self
    }

    /// TTL as a duration.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.ttl_days as i64)
    }

    /// Age after which an incomplete row no longer blocks replacement.
    pub fn stale_incomplete_age(&self) -> chrono::Duration {
        let seconds = self.ttl().num_seconds() as f64 * self.stale_incomplete_fraction;
        chrono::Duration::seconds(seconds as i64)
    }
}
