pub mod keys;

pub use keys::CacheKey;

use crate::config::Config;
use moka::future::Cache;
use std::time::Duration;

/// Maps stable natural keys to database ids.
pub type IdCache = Cache<CacheKey, i64>;

pub fn init_cache(config: &Config) -> IdCache {
    build_cache(config.cache_max_capacity, config.cache_ttl)
}

pub fn build_cache(capacity: u64, ttl: Duration) -> IdCache {
    Cache::builder()
        .time_to_live(ttl)
        .max_capacity(capacity)
        .build()
}
