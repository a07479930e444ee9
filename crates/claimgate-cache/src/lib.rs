//! Token-keyed cache with TTL expiry and LRU eviction.
//!
//! Entries are keyed by the SHA-256 of the raw token, so the token itself is
//! never retained. Each entry carries its own absolute expiry, capped by the
//! configured maximum TTL, and `lookup` re-checks that expiry on every read.
//!
//! # Example
//!
//! ```rust,ignore
//! use claimgate_cache::{CacheConfig, TokenCache};
//!
//! let config = CacheConfig::default()
//!     .with_max_entries(1000)
//!     .with_max_ttl(Duration::from_secs(1800));
//!
//! let cache: TokenCache<Arc<Claims>> = TokenCache::new(config);
//! cache.store_until(token, claims, exp).await;
//! ```

mod cache;
mod clock;
mod config;

pub use cache::{CacheEntry, CacheStats, TokenCache, hash_token};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
