//! Tiered Cache - L1 + Shared L2
//!
//! Orchestrates the in-process L1 and the optional shared tier:
//!
//! - `get` checks L1, then L2; an L2 hit is written through to L1 with its
//!   age preserved
//! - `set` serializes once, stores synchronously in L1 and hands the same
//!   bytes to a background L2 write
//! - L2 failures are logged and counted, never raised

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::compression::CompressionConfig;
use super::entry::{CacheEntry, CacheKey, CachePayload};
use super::l1::{L1Cache, L1Config};
use super::l2::SharedTier;
use super::metrics::{CacheMetrics, Stats};
use super::shard::Lookup;
use super::{DEFAULT_KEY_NAMESPACE, DEFAULT_TTL_SECS};
use crate::domain::{BlockId, SharedCache};
use crate::error::Result;
use crate::query::block_prefix;

/// Which tier answered a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// In-process memory
    Memory,
    /// Shared backend
    Shared,
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::Memory => write!(f, "memory"),
            CacheTier::Shared => write!(f, "shared"),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// L1 configuration
    pub l1: L1Config,
    /// Entry time-to-live in seconds, shared by both tiers
    pub ttl_secs: u64,
    /// Millisecond time-to-live; overrides `ttl_secs` when set
    pub ttl_ms: Option<u64>,
    /// Prefix of every key; bump it to orphan all existing entries
    pub key_namespace: String,
    /// Shared-tier payload compression
    pub compression: CompressionConfig,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        match self.ttl_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(self.ttl_secs),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1: L1Config::default(),
            ttl_secs: DEFAULT_TTL_SECS,
            ttl_ms: None,
            key_namespace: DEFAULT_KEY_NAMESPACE.to_string(),
            compression: CompressionConfig::default(),
        }
    }
}

/// Cache lookup result
#[derive(Debug, Clone)]
pub struct CacheHit {
    /// The cached entry
    pub entry: Arc<CacheEntry>,
    /// Which tier the entry was found in
    pub tier: CacheTier,
}

/// Unified two-tier cache
pub struct TieredCache {
    /// In-process tier
    l1: L1Cache,
    /// Shared tier, if configured
    l2: Option<Arc<SharedTier>>,
    /// Configuration
    config: CacheConfig,
    /// Metrics collector
    metrics: Arc<CacheMetrics>,
    /// Background shared-tier writes
    tasks: TaskTracker,
}

impl TieredCache {
    /// Create an L1-only cache
    pub fn new(config: CacheConfig, tasks: TaskTracker) -> Self {
        Self {
            l1: L1Cache::with_config(config.l1.clone()),
            l2: None,
            config,
            metrics: Arc::new(CacheMetrics::new()),
            tasks,
        }
    }

    /// Create a cache backed by a shared tier
    pub fn with_shared(config: CacheConfig, shared: Arc<dyn SharedCache>, tasks: TaskTracker) -> Self {
        let l2 = Arc::new(SharedTier::new(shared, config.compression.clone()));
        Self {
            l2: Some(l2),
            ..Self::new(config, tasks)
        }
    }

    /// Entry time-to-live
    pub fn ttl(&self) -> Duration {
        self.config.ttl()
    }

    /// Key namespace
    pub fn namespace(&self) -> &str {
        &self.config.key_namespace
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// Whether a shared tier is attached
    pub fn has_shared_tier(&self) -> bool {
        self.l2.is_some()
    }

    /// Get an entry from the cache (searches both tiers)
    pub async fn get(&self, key: &CacheKey) -> Option<CacheHit> {
        let ttl = self.ttl();

        // Try L1 first
        match self.l1.get(key, ttl) {
            Lookup::Hit(entry) => {
                self.metrics.record_memory_hit();
                return Some(CacheHit {
                    entry,
                    tier: CacheTier::Memory,
                });
            }
            Lookup::Expired => {
                self.metrics.record_expiration();
                self.metrics.record_memory_miss();
            }
            Lookup::Miss => self.metrics.record_memory_miss(),
        }

        // Try L2
        let l2 = self.l2.as_ref()?;
        match l2.get(key.as_str(), ttl).await {
            Ok(Some(hit)) => {
                self.metrics.record_shared_hit();
                let entry = Arc::new(CacheEntry::with_age(
                    Arc::new(hit.payload),
                    hit.size_bytes,
                    hit.age,
                ));
                let outcome = self.l1.put(key.clone(), entry.clone());
                self.metrics.record_evictions(outcome.evicted);
                debug!("Promoted {} from shared tier (age {:?})", key, hit.age);
                Some(CacheHit {
                    entry,
                    tier: CacheTier::Shared,
                })
            }
            Ok(None) => {
                self.metrics.record_shared_miss();
                None
            }
            Err(e) => {
                warn!("cache: shared get failed for {}: {}", key, e);
                self.metrics.record_shared_miss();
                None
            }
        }
    }

    /// Whether L1 holds a live entry. Does not touch recency or counters.
    pub fn contains_live(&self, key: &CacheKey) -> bool {
        self.l1.contains_live(key, self.ttl())
    }

    /// Put an entry into the cache
    ///
    /// The L1 write completes before this returns; the L2 write runs in the
    /// background.
    pub fn set(&self, key: CacheKey, payload: Arc<CachePayload>) -> Result<()> {
        let json = payload.to_json()?;
        let entry = Arc::new(CacheEntry::new(payload, json.len() as u64));

        let outcome = self.l1.put(key.clone(), entry);
        self.metrics.record_evictions(outcome.evicted);
        if !outcome.stored {
            debug!("Entry {} ({} bytes) exceeds L1 shard budget", key, json.len());
        }

        if let Some(l2) = &self.l2 {
            let frame = match l2.encode(&json, Utc::now()) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("cache: failed to encode {}: {}", key, e);
                    self.metrics.record_shared_write_failure();
                    return Ok(());
                }
            };
            let l2 = Arc::clone(l2);
            let metrics = Arc::clone(&self.metrics);
            let ttl = self.ttl();
            self.tasks.spawn(async move {
                if let Err(e) = l2.put(key.as_str(), frame, ttl).await {
                    warn!("cache: failed to set {}: {}", key, e);
                    metrics.record_shared_write_failure();
                }
            });
        }
        Ok(())
    }

    /// Drop every entry of a block from both tiers
    ///
    /// Returns the number of L1 entries removed. The L2 delete is best
    /// effort; a write racing with it survives at most one TTL.
    pub async fn invalidate_block(&self, block: &BlockId) -> usize {
        let removed = self.l1.invalidate_block(block);
        if let Some(l2) = &self.l2 {
            let prefix = block_prefix(self.namespace(), block);
            match l2.invalidate_prefix(&prefix).await {
                Ok(n) => debug!("Deleted {} shared entries under {}", n, prefix),
                Err(e) => warn!("cache: failed to delete {}*: {}", prefix, e),
            }
        }
        removed
    }

    /// Clear both tiers, then reset counters
    pub async fn clear_all(&self) {
        self.l1.clear();
        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.clear().await {
                warn!("cache: failed to clear shared tier: {}", e);
            }
        }
        self.metrics.reset();
    }

    /// Snapshot of counters and L1 occupancy
    pub fn stats(&self) -> Stats {
        self.metrics.snapshot(self.l1.size(), self.l1.len() as u64)
    }
}

// =============================================================================
// Tests
// =============================================================================
