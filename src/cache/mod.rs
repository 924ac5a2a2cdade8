//! Tiered Page Cache
//!
//! Two-tier cache for compiled page and window results:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TieredCache                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  L1: In-process memory                                           │
//! │  ├── Sharded size-aware LRU, bounded by serialized bytes         │
//! │  ├── Per-shard mutex, no global lock                             │
//! │  └── Fresh < TTL/2 ≤ Stale < TTL ≤ Expired                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  L2: Shared backend (SharedCache port)                           │
//! │  ├── JSON envelope with write time, LZ4 framed                   │
//! │  ├── Fire-and-forget writes, soft failures                       │
//! │  └── Glob-prefix invalidation per block                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lookups go L1 then L2; L2 hits are written through to L1 keeping their
//! age. Every entry can be rebuilt from the backing store.

pub mod compression;
pub mod entry;
pub mod l1;
pub mod l2;
pub mod manager;
pub mod metrics;
pub mod shard;

pub use compression::{CompressionAlgorithm, CompressionConfig, CompressionManager};
pub use entry::{CacheEntry, CacheKey, CachePayload, Freshness};
pub use l1::{L1Cache, L1Config};
pub use l2::{SharedHit, SharedTier};
pub use manager::{CacheConfig, CacheHit, CacheTier, TieredCache};
pub use metrics::{CacheMetrics, Stats};
pub use shard::{InsertOutcome, Lookup, LruShard};

/// Default L1 capacity (64 MiB of serialized payloads)
pub const DEFAULT_L1_CAPACITY: u64 = 64 * 1024 * 1024;

/// Default number of L1 shards
pub const DEFAULT_L1_SHARDS: usize = 16;

/// Default entry time-to-live in seconds
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Default key namespace
pub const DEFAULT_KEY_NAMESPACE: &str = "grid:v1";
