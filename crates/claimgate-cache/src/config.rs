//! Configuration for the token cache.

use std::time::Duration;

/// Default maximum number of cached tokens.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default upper bound on how long any entry may live (30 minutes).
pub const DEFAULT_MAX_TTL: Duration = Duration::from_secs(30 * 60);

/// Configuration for the token cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction.
    pub max_entries: usize,

    /// Upper bound on an entry's lifetime, regardless of the token's own expiry.
    pub max_ttl: Duration,

    /// Whether to run periodic cleanup of expired entries.
    /// If false, expired entries are only removed on access.
    pub enable_cleanup_task: bool,

    /// Interval for the cleanup task (if enabled).
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_ttl: DEFAULT_MAX_TTL,
            enable_cleanup_task: true,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the maximum TTL for any entry.
    pub fn with_max_ttl(mut self, ttl: Duration) -> Self {
        self.max_ttl = ttl;
        self
    }

    /// Enable or disable the background cleanup task.
    pub fn with_cleanup_task(mut self, enabled: bool) -> Self {
        self.enable_cleanup_task = enabled;
        self
    }

    /// Set the cleanup interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Maximum TTL in whole seconds.
    pub(crate) fn max_ttl_secs(&self) -> i64 {
        i64::try_from(self.max_ttl.as_secs()).unwrap_or(i64::MAX)
    }
}
