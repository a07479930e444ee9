//! Token cache with LRU eviction and per-entry expiry.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;

/// Hash a raw token into its cache key (lowercase hex SHA-256).
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Entry stored in the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Cached value.
    pub value: V,

    /// Unix time (seconds) at which this entry stops being served.
    pub expires_at: i64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Cache keyed by token hash.
///
/// Values are never mutated in place: a new token produces a new hash and a
/// new entry, and a repeated store for the same hash simply replaces it.
pub struct TokenCache<V> {
    inner: Arc<RwLock<LruCache<String, CacheEntry<V>>>>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl<V: Clone + Send + Sync + 'static> TokenCache<V> {
    /// Create a cache backed by the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit time source.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let cap = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(RwLock::new(LruCache::new(cap))),
            clock,
            config,
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up the value cached for a raw token.
    ///
    /// An expired entry is evicted and reported as a miss.
    pub async fn lookup(&self, token: &str) -> Option<V> {
        let key = hash_token(token);
        let now = self.clock.now();

        let hit = {
            let inner = self.inner.read().await;
            match inner.peek(&key) {
                Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
                Some(_) => None,
                None => {
                    trace!(token_hash = %key, "Token cache miss");
                    return None;
                }
            }
        };

        if let Some(value) = hit {
            trace!(token_hash = %key, "Token cache hit");
            // Recency is best-effort: skip it rather than wait behind a writer.
            if let Ok(mut inner) = self.inner.try_write() {
                inner.promote(&key);
            }
            return Some(value);
        }

        // A concurrent store may have replaced the entry since the read.
        let mut inner = self.inner.write().await;
        if inner.peek(&key).is_some_and(|entry| entry.is_expired(now)) {
            debug!(token_hash = %key, "Cached token expired, evicting");
            inner.pop(&key);
        }
        None
    }

    /// Store a value for `expiry_seconds` from now, capped at the configured
    /// maximum TTL. Does nothing when `expiry_seconds` is not positive.
    pub async fn store(&self, token: &str, value: V, expiry_seconds: i64) {
        if expiry_seconds <= 0 {
            debug!(expiry_seconds, "Token already expired, not caching");
            return;
        }

        let ttl = expiry_seconds.min(self.config.max_ttl_secs());
        let key = hash_token(token);
        let expires_at = self.clock.now().saturating_add(ttl);

        let mut inner = self.inner.write().await;
        if let Some((evicted, _)) = inner.push(key.clone(), CacheEntry { value, expires_at })
            && evicted != key
        {
            debug!(token_hash = %evicted, "Evicting LRU token to make room");
        }

        debug!(
            token_hash = %key,
            ttl_secs = ttl,
            cache_size = inner.len(),
            "Token claims cached"
        );
    }

    /// Store a value until the token's own expiry, given in Unix seconds.
    pub async fn store_until(&self, token: &str, value: V, expires_at_epoch: i64) {
        let expiry_seconds = expires_at_epoch.saturating_sub(self.clock.now());
        self.store(token, value, expiry_seconds).await;
    }

    /// Drop an entry regardless of its expiry.
    pub async fn invalidate(&self, token: &str) -> bool {
        let key = hash_token(token);
        self.inner.write().await.pop(&key).is_some()
    }

    /// Remove every expired entry, returning how many were removed.
    ///
    /// Called periodically by [`spawn_cleanup_task`](Self::spawn_cleanup_task)
    /// when enabled, but can also be called manually.
    pub async fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;

        let expired: Vec<String> = inner
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.pop(key);
        }

        if !expired.is_empty() {
            debug!(count = expired.len(), "Cleaned up expired tokens");
        }

        expired.len()
    }

    /// Start the periodic sweep, if enabled in the configuration.
    ///
    /// Returns `None` when the sweep is disabled or the interval is zero.
    pub fn spawn_cleanup_task(&self) -> Option<JoinHandle<()>> {
        if !self.config.enable_cleanup_task {
            return None;
        }
        if self.config.cleanup_interval.is_zero() {
            warn!("Cleanup interval is zero, expired tokens are only evicted on lookup");
            return None;
        }

        let cache = self.clone();
        let period = self.config.cleanup_interval;
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                cache.cleanup_expired().await;
            }
        }))
    }

    /// Get the current number of entries, including any not yet swept.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let inner = self.inner.read().await;
        CacheStats {
            size: inner.len(),
            capacity: self.config.max_entries,
            expired: inner.iter().filter(|(_, e)| e.is_expired(now)).count(),
        }
    }
}

impl<V> Clone for TokenCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Current number of entries.
    pub size: usize,

    /// Maximum capacity.
    pub capacity: usize,

    /// Entries past their expiry that have not been swept yet.
    pub expired: usize,
}
