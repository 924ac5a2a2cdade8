//! Cache Metrics Collection
//!
//! Counters for both tiers and the pagination paths that feed them.
//! Counters only grow; they are reset as a whole by `reset`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // L1 metrics
    memory_hits: AtomicU64,
    memory_misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,

    // L2 metrics
    shared_hits: AtomicU64,
    shared_misses: AtomicU64,
    shared_write_failures: AtomicU64,

    // Refresh and fetch paths
    revalidations: AtomicU64,
    revalidation_failures: AtomicU64,
    coalesced: AtomicU64,
    store_fetches: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    // L1 metrics
    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_memory_miss(&self) {
        self.memory_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        if count > 0 {
            self.evictions.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    // L2 metrics
    pub fn record_shared_hit(&self) {
        self.shared_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shared_miss(&self) {
        self.shared_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shared_write_failure(&self) {
        self.shared_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Refresh and fetch paths
    pub fn record_revalidation(&self) {
        self.revalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_revalidation_failure(&self) {
        self.revalidation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_fetch(&self) {
        self.store_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn memory_hits(&self) -> u64 {
        self.memory_hits.load(Ordering::Relaxed)
    }

    pub fn memory_misses(&self) -> u64 {
        self.memory_misses.load(Ordering::Relaxed)
    }

    pub fn shared_hits(&self) -> u64 {
        self.shared_hits.load(Ordering::Relaxed)
    }

    /// Fraction of lookups answered by either tier
    pub fn hit_rate(&self) -> f64 {
        let hits = (self.memory_hits() + self.shared_hits()) as f64;
        let lookups = (self.memory_hits() + self.memory_misses()) as f64;
        if lookups == 0.0 {
            0.0
        } else {
            hits / lookups
        }
    }

    /// Snapshot the counters together with current L1 occupancy
    pub fn snapshot(&self, memory_bytes: u64, memory_entries: u64) -> Stats {
        Stats {
            memory_hits: self.memory_hits(),
            memory_misses: self.memory_misses(),
            shared_hits: self.shared_hits(),
            shared_misses: self.shared_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            revalidations: self.revalidations.load(Ordering::Relaxed),
            revalidation_failures: self.revalidation_failures.load(Ordering::Relaxed),
            shared_write_failures: self.shared_write_failures.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            store_fetches: self.store_fetches.load(Ordering::Relaxed),
            memory_bytes,
            memory_entries,
            hit_rate: self.hit_rate(),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.memory_hits,
            &self.memory_misses,
            &self.evictions,
            &self.expirations,
            &self.shared_hits,
            &self.shared_misses,
            &self.shared_write_failures,
            &self.revalidations,
            &self.revalidation_failures,
            &self.coalesced,
            &self.store_fetches,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    // L1
    pub memory_hits: u64,
    pub memory_misses: u64,
    pub evictions: u64,
    pub expirations: u64,

    // L2
    pub shared_hits: u64,
    pub shared_misses: u64,
    pub shared_write_failures: u64,

    // Refresh and fetch paths
    pub revalidations: u64,
    pub revalidation_failures: u64,
    pub coalesced: u64,
    pub store_fetches: u64,

    // Occupancy
    pub memory_bytes: u64,
    pub memory_entries: u64,

    pub hit_rate: f64,
}

// =============================================================================
// Tests
// =============================================================================
