//! Cache Entry Types
//!
//! Keys, payloads, and the freshness state machine shared by both tiers.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::domain::{BlockId, PaginatedResult, WindowResult};

/// Cache key produced by the predicate compiler.
///
/// Construction is crate-private: a key built any other way could collide
/// with a logically different query.
#[derive(Clone, Debug, Eq)]
pub struct CacheKey {
    /// Block the key belongs to (used for scoped invalidation)
    block_id: BlockId,
    /// Full canonical key string
    key: String,
    /// Precomputed hash of `key`
    hash: u64,
}

impl CacheKey {
    pub(crate) fn from_parts(block_id: BlockId, key: String) -> Self {
        let hash = Self::fx_hash(key.as_bytes());
        Self {
            block_id,
            key,
            hash,
        }
    }

    /// Fast non-cryptographic hash (FxHash algorithm)
    #[inline]
    fn fx_hash(bytes: &[u8]) -> u64 {
        const SEED: u64 = 0x517cc1b727220a95;
        let mut hash = SEED;
        for &byte in bytes {
            hash = hash.rotate_left(5) ^ (byte as u64);
            hash = hash.wrapping_mul(SEED);
        }
        hash
    }

    /// Shard index for this key (`shard_count` must be a power of two)
    #[inline]
    pub fn shard_index(&self, shard_count: usize) -> usize {
        (self.hash as usize) & (shard_count - 1)
    }

    /// Block this key is scoped to
    #[inline]
    pub fn block_id(&self) -> &BlockId {
        &self.block_id
    }

    /// Canonical key string (also used verbatim as the L2 key)
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.key == other.key
    }
}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

/// Value stored under a cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachePayload {
    Page(PaginatedResult),
    Window(WindowResult),
}

impl CachePayload {
    /// Serialize for size accounting and shared-tier storage.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Freshness of a present entry relative to the configured TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Younger than TTL/2
    Fresh,
    /// Between TTL/2 and TTL; served while a refresh runs
    Stale,
    /// TTL or older; treated as absent
    Expired,
}

impl Freshness {
    /// Classify an entry of the given age.
    pub fn classify(age: Duration, ttl: Duration) -> Self {
        if age >= ttl {
            Freshness::Expired
        } else if age >= ttl / 2 {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}

/// Cached payload plus bookkeeping
#[derive(Debug)]
pub struct CacheEntry {
    payload: Arc<CachePayload>,
    inserted_at: Instant,
    size_bytes: u64,
    hits: AtomicU64,
}

impl CacheEntry {
    /// Create an entry inserted now
    pub fn new(payload: Arc<CachePayload>, size_bytes: u64) -> Self {
        Self::with_inserted_at(payload, size_bytes, Instant::now())
    }

    /// Create an entry that is already `age` old (tier transfers keep age)
    pub fn with_age(payload: Arc<CachePayload>, size_bytes: u64, age: Duration) -> Self {
        let now = Instant::now();
        let inserted_at = now.checked_sub(age).unwrap_or(now);
        Self::with_inserted_at(payload, size_bytes, inserted_at)
    }

    fn with_inserted_at(payload: Arc<CachePayload>, size_bytes: u64, inserted_at: Instant) -> Self {
        Self {
            payload,
            inserted_at,
            size_bytes,
            hits: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn payload(&self) -> &Arc<CachePayload> {
        &self.payload
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size_bytes
    }

    #[inline]
    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }

    /// Time since insertion
    #[inline]
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.inserted_at)
    }

    #[inline]
    pub fn freshness(&self, ttl: Duration) -> Freshness {
        Freshness::classify(self.age(), ttl)
    }

    /// Record a hit and return the new count
    #[inline]
    pub fn record_hit(&self) -> u64 {
        self.hits.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================
