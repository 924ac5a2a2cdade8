//! Prometheus Stats Exporter
//!
//! Mirrors a [`Stats`] snapshot into gauges in a private registry. Counters
//! in the cache reset on `clear_all`, so everything is exported as a gauge.

use prometheus::{Encoder, Gauge, IntGauge, Registry, TextEncoder};

use crate::cache::Stats;
use crate::error::{Error, Result};

const PREFIX: &str = "gridcache";

/// Exposes engine statistics in the Prometheus text format
pub struct StatsExporter {
    registry: Registry,
    memory_hits: IntGauge,
    memory_misses: IntGauge,
    evictions: IntGauge,
    expirations: IntGauge,
    shared_hits: IntGauge,
    shared_misses: IntGauge,
    shared_write_failures: IntGauge,
    revalidations: IntGauge,
    revalidation_failures: IntGauge,
    coalesced: IntGauge,
    store_fetches: IntGauge,
    memory_bytes: IntGauge,
    memory_entries: IntGauge,
    hit_rate: Gauge,
}

impl StatsExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let int_gauge = |name: &str, help: &str| -> Result<IntGauge> {
            let gauge = IntGauge::new(format!("{}_{}", PREFIX, name), help)?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        let memory_hits = int_gauge("memory_hits", "Lookups served by the in-process tier")?;
        let memory_misses = int_gauge("memory_misses", "Lookups not served by the in-process tier")?;
        let evictions = int_gauge("evictions", "Entries evicted for capacity")?;
        let expirations = int_gauge("expirations", "Entries dropped after their TTL")?;
        let shared_hits = int_gauge("shared_hits", "Lookups served by the shared tier")?;
        let shared_misses = int_gauge("shared_misses", "Shared-tier lookups that found nothing")?;
        let shared_write_failures =
            int_gauge("shared_write_failures", "Failed background shared-tier writes")?;
        let revalidations = int_gauge("revalidations", "Background refreshes started")?;
        let revalidation_failures =
            int_gauge("revalidation_failures", "Background refreshes that failed")?;
        let coalesced = int_gauge("coalesced", "Misses that joined an in-flight fetch")?;
        let store_fetches = int_gauge("store_fetches", "Fetches issued to the backing store")?;
        let memory_bytes = int_gauge("memory_bytes", "Serialized bytes held in memory")?;
        let memory_entries = int_gauge("memory_entries", "Entries held in memory")?;

        let hit_rate = Gauge::new(
            format!("{}_hit_rate", PREFIX),
            "Share of lookups served from either tier",
        )?;
        registry.register(Box::new(hit_rate.clone()))?;

        Ok(Self {
            registry,
            memory_hits,
            memory_misses,
            evictions,
            expirations,
            shared_hits,
            shared_misses,
            shared_write_failures,
            revalidations,
            revalidation_failures,
            coalesced,
            store_fetches,
            memory_bytes,
            memory_entries,
            hit_rate,
        })
    }

    /// Refresh every gauge from a snapshot
    pub fn update(&self, stats: &Stats) {
        let set = |gauge: &IntGauge, value: u64| gauge.set(i64::try_from(value).unwrap_or(i64::MAX));

        set(&self.memory_hits, stats.memory_hits);
        set(&self.memory_misses, stats.memory_misses);
        set(&self.evictions, stats.evictions);
        set(&self.expirations, stats.expirations);
        set(&self.shared_hits, stats.shared_hits);
        set(&self.shared_misses, stats.shared_misses);
        set(&self.shared_write_failures, stats.shared_write_failures);
        set(&self.revalidations, stats.revalidations);
        set(&self.revalidation_failures, stats.revalidation_failures);
        set(&self.coalesced, stats.coalesced);
        set(&self.store_fetches, stats.store_fetches);
        set(&self.memory_bytes, stats.memory_bytes);
        set(&self.memory_entries, stats.memory_entries);
        self.hit_rate.set(stats.hit_rate);
    }

    /// Encode the registry in the text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Metrics(e.to_string()))
    }

    /// Content type of [`encode`](Self::encode) output
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_reflects_snapshot() {
        let exporter = StatsExporter::new().unwrap();
        let stats = Stats {
            memory_hits: 7,
            memory_misses: 3,
            store_fetches: 3,
            memory_bytes: 4096,
            memory_entries: 2,
            hit_rate: 0.7,
            ..Stats::default()
        };
        exporter.update(&stats);

        let text = exporter.encode().unwrap();
        assert!(text.contains("gridcache_memory_hits 7"));
        assert!(text.contains("gridcache_store_fetches 3"));
        assert!(text.contains("gridcache_memory_bytes 4096"));
        assert!(text.contains("gridcache_hit_rate 0.7"));
        assert!(text.contains("# HELP gridcache_coalesced"));
    }

    #[test]
    fn test_exporters_do_not_collide() {
        let a = StatsExporter::new().unwrap();
        let b = StatsExporter::new().unwrap();
        a.update(&Stats {
            evictions: 5,
            ..Stats::default()
        });
        assert!(a.encode().unwrap().contains("gridcache_evictions 5"));
        assert!(b.encode().unwrap().contains("gridcache_evictions 0"));
    }
}
