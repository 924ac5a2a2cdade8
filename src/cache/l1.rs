//! L1 Cache - In-Process Hot Cache
//!
//! Bounded by total serialized bytes, spread over power-of-two LRU shards.
//!
//! # Design
//!
//! - Per-shard mutex; no lock spans the whole cache
//! - Size-aware LRU: eviction removes the entry with the oldest access
//! - Entries past the TTL are dropped on lookup and count as misses

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::entry::{CacheEntry, CacheKey};
use super::shard::{InsertOutcome, Lookup, LruShard};
use super::{DEFAULT_L1_CAPACITY, DEFAULT_L1_SHARDS};
use crate::domain::BlockId;

/// L1 Cache configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct L1Config {
    /// Maximum capacity in bytes
    pub capacity: u64,
    /// Number of shards (rounded up to a power of two)
    pub shards: usize,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_L1_CAPACITY,
            shards: DEFAULT_L1_SHARDS,
        }
    }
}

/// L1 Cache - in-process bounded cache
pub struct L1Cache {
    shards: Box<[LruShard]>,
}

impl L1Cache {
    /// Create a new L1 cache with default configuration
    pub fn new() -> Self {
        Self::with_config(L1Config::default())
    }

    /// Create a new L1 cache with custom configuration
    pub fn with_config(config: L1Config) -> Self {
        let count = config.shards.max(1).next_power_of_two();
        let budget = (config.capacity / count as u64).max(1);
        let shards = (0..count).map(|_| LruShard::new(budget)).collect();
        Self { shards }
    }

    #[inline]
    fn shard(&self, key: &CacheKey) -> &LruShard {
        &self.shards[key.shard_index(self.shards.len())]
    }

    /// Look up an entry, recording the access
    pub fn get(&self, key: &CacheKey, ttl: Duration) -> Lookup {
        let lookup = self.shard(key).get(key, ttl);
        if let Lookup::Hit(entry) = &lookup {
            entry.record_hit();
        }
        lookup
    }

    /// Whether a live entry exists, without touching recency or counters
    pub fn contains_live(&self, key: &CacheKey, ttl: Duration) -> bool {
        self.shard(key).contains_live(key, ttl)
    }

    /// Insert an entry
    pub fn put(&self, key: CacheKey, entry: Arc<CacheEntry>) -> InsertOutcome {
        self.shard(&key).insert(key, entry)
    }

    /// Remove every entry whose key embeds `block`
    pub fn invalidate_block(&self, block: &BlockId) -> usize {
        self.shards.iter().map(|s| s.remove_block(block)).sum()
    }

    /// Clear the cache
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.clear();
        }
    }

    /// Current size in bytes
    pub fn size(&self) -> u64 {
        self.shards.iter().map(|s| s.size_bytes()).sum()
    }

    /// Number of shards in use
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.is_empty())
    }

}

impl Default for L1Cache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
