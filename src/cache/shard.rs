//! LRU Shard Implementation
//!
//! One slice of the L1 cache: a hashmap plus a recency index, guarded by a
//! single mutex and bounded by a byte budget.
//!
//! # Design
//!
//! - Each shard has its own lock, so concurrent requests on different keys
//!   rarely contend
//! - Recency is a monotonically increasing access tick; the smallest tick is
//!   the least-recently-used entry
//! - Entry and byte counters are mirrored in atomics for lock-free reads

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::entry::{CacheEntry, CacheKey, Freshness};
use crate::domain::BlockId;

/// Result of a shard lookup
#[derive(Debug)]
pub enum Lookup {
    /// Present and younger than the TTL
    Hit(Arc<CacheEntry>),
    /// Present but expired; removed as part of the lookup
    Expired,
    /// Not present
    Miss,
}

/// Result of a shard insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Whether the entry was stored
    pub stored: bool,
    /// Entries evicted to make room
    pub evicted: u64,
}

struct Slot {
    entry: Arc<CacheEntry>,
    tick: u64,
}

#[derive(Default)]
struct ShardState {
    slots: HashMap<CacheKey, Slot>,
    recency: BTreeMap<u64, CacheKey>,
    tick: u64,
    used_bytes: u64,
}

impl ShardState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Slot> {
        let slot = self.slots.remove(key)?;
        self.recency.remove(&slot.tick);
        self.used_bytes -= slot.entry.size();
        Some(slot)
    }

    fn touch(&mut self, key: &CacheKey) {
        let tick = self.next_tick();
        if let Some(slot) = self.slots.get_mut(key) {
            self.recency.remove(&slot.tick);
            slot.tick = tick;
            self.recency.insert(tick, key.clone());
        }
    }

    fn pop_lru(&mut self) -> Option<Slot> {
        let (_, key) = self.recency.pop_first()?;
        let slot = self.slots.remove(&key)?;
        self.used_bytes -= slot.entry.size();
        Some(slot)
    }
}

/// Single LRU shard with a byte budget
pub struct LruShard {
    state: Mutex<ShardState>,
    budget: u64,
    /// Number of entries
    count: AtomicU64,
    /// Total size of entries (in bytes)
    size_bytes: AtomicU64,
}

impl LruShard {
    /// Create an empty shard holding at most `budget` bytes
    pub fn new(budget: u64) -> Self {
        Self {
            state: Mutex::new(ShardState::default()),
            budget,
            count: AtomicU64::new(0),
            size_bytes: AtomicU64::new(0),
        }
    }

    /// Byte budget
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed) as usize
    }

    /// Check if the shard is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently held
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }

    fn sync_counters(&self, state: &ShardState) {
        self.count.store(state.slots.len() as u64, Ordering::Relaxed);
        self.size_bytes.store(state.used_bytes, Ordering::Relaxed);
    }

    /// Look up an entry, refreshing its recency on a hit
    pub fn get(&self, key: &CacheKey, ttl: Duration) -> Lookup {
        let mut state = self.state.lock();
        let freshness = match state.slots.get(key) {
            Some(slot) => slot.entry.freshness(ttl),
            None => return Lookup::Miss,
        };

        if freshness == Freshness::Expired {
            state.remove(key);
            self.sync_counters(&state);
            return Lookup::Expired;
        }

        state.touch(key);
        match state.slots.get(key) {
            Some(slot) => Lookup::Hit(slot.entry.clone()),
            None => Lookup::Miss,
        }
    }

    /// Whether a non-expired entry is present. Does not touch recency.
    pub fn contains_live(&self, key: &CacheKey, ttl: Duration) -> bool {
        let state = self.state.lock();
        state
            .slots
            .get(key)
            .is_some_and(|slot| slot.entry.freshness(ttl) != Freshness::Expired)
    }

    /// Insert an entry, evicting least-recently-used entries until it fits
    pub fn insert(&self, key: CacheKey, entry: Arc<CacheEntry>) -> InsertOutcome {
        let size = entry.size();
        let mut state = self.state.lock();
        state.remove(&key);

        if size > self.budget {
            self.sync_counters(&state);
            return InsertOutcome::default();
        }

        let mut evicted = 0;
        while state.used_bytes + size > self.budget {
            if state.pop_lru().is_none() {
                break;
            }
            evicted += 1;
        }

        let tick = state.next_tick();
        state.recency.insert(tick, key.clone());
        state.slots.insert(key, Slot { entry, tick });
        state.used_bytes += size;
        self.sync_counters(&state);

        InsertOutcome {
            stored: true,
            evicted,
        }
    }

    /// Remove every entry scoped to `block`
    pub fn remove_block(&self, block: &BlockId) -> usize {
        let mut state = self.state.lock();
        let doomed: Vec<CacheKey> = state
            .slots
            .keys()
            .filter(|k| k.block_id() == block)
            .cloned()
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        self.sync_counters(&state);
        doomed.len()
    }

    /// Clear all entries
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.slots.clear();
        state.recency.clear();
        state.used_bytes = 0;
        self.sync_counters(&state);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::CachePayload;
    use crate::domain::PaginatedResult;

    const TTL: Duration = Duration::from_secs(60);

    fn key(block: &str, raw: &str) -> CacheKey {
        CacheKey::from_parts(BlockId::new(block), raw.to_string())
    }

    fn entry(size: u64) -> Arc<CacheEntry> {
        let payload = Arc::new(CachePayload::Page(PaginatedResult::new(vec![], 0, 1, 1)));
        Arc::new(CacheEntry::new(payload, size))
    }

    #[test]
    fn test_shard_insert_get() {
        let shard = LruShard::new(1000);
        let k = key("b", "k1");
        assert!(shard.insert(k.clone(), entry(100)).stored);
        assert_eq!(shard.len(), 1);
        assert_eq!(shard.size_bytes(), 100);
        assert!(matches!(shard.get(&k, TTL), Lookup::Hit(_)));
        assert!(matches!(shard.get(&key("b", "nope"), TTL), Lookup::Miss));
    }

    #[test]
    fn test_shard_replace_updates_size() {
        let shard = LruShard::new(1000);
        let k = key("b", "k1");
        shard.insert(k.clone(), entry(100));
        shard.insert(k.clone(), entry(250));
        assert_eq!(shard.len(), 1);
        assert_eq!(shard.size_bytes(), 250);
    }

    #[test]
    fn test_shard_evicts_least_recently_accessed() {
        let shard = LruShard::new(300);
        let (a, b, c) = (key("x", "a"), key("x", "b"), key("x", "c"));
        shard.insert(a.clone(), entry(100));
        shard.insert(b.clone(), entry(100));
        shard.insert(c.clone(), entry(100));

        // `a` was inserted first but is accessed last, so `b` is the LRU.
        assert!(matches!(shard.get(&a, TTL), Lookup::Hit(_)));

        let outcome = shard.insert(key("x", "d"), entry(100));
        assert_eq!(outcome.evicted, 1);
        assert!(shard.contains_live(&a, TTL));
        assert!(!shard.contains_live(&b, TTL));
        assert!(shard.contains_live(&c, TTL));
    }

    #[test]
    fn test_shard_evicts_several_for_large_entry() {
        let shard = LruShard::new(300);
        for i in 0..3 {
            shard.insert(key("x", &format!("k{}", i)), entry(100));
        }
        let outcome = shard.insert(key("x", "big"), entry(250));
        assert_eq!(outcome.evicted, 3);
        assert_eq!(shard.len(), 1);
        assert_eq!(shard.size_bytes(), 250);
    }

    #[test]
    fn test_shard_rejects_oversized_entry() {
        let shard = LruShard::new(100);
        let k = key("x", "k");
        shard.insert(k.clone(), entry(50));
        let outcome = shard.insert(k.clone(), entry(101));
        assert!(!outcome.stored);
        assert!(shard.is_empty());
    }

    #[test]
    fn test_contains_live_does_not_touch_recency() {
        let shard = LruShard::new(200);
        let (a, b) = (key("x", "a"), key("x", "b"));
        shard.insert(a.clone(), entry(100));
        shard.insert(b.clone(), entry(100));
        assert!(shard.contains_live(&a, TTL));

        shard.insert(key("x", "c"), entry(100));
        assert!(!shard.contains_live(&a, TTL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_removed_on_get() {
        let shard = LruShard::new(1000);
        let k = key("x", "k");
        shard.insert(k.clone(), entry(10));

        tokio::time::advance(TTL).await;
        assert!(!shard.contains_live(&k, TTL));
        assert!(matches!(shard.get(&k, TTL), Lookup::Expired));
        assert!(shard.is_empty());
    }

    #[test]
    fn test_remove_block_is_scoped() {
        let shard = LruShard::new(1000);
        shard.insert(key("orders", "o1"), entry(10));
        shard.insert(key("orders", "o2"), entry(10));
        shard.insert(key("users", "u1"), entry(10));

        assert_eq!(shard.remove_block(&BlockId::new("orders")), 2);
        assert_eq!(shard.len(), 1);
        assert!(shard.contains_live(&key("users", "u1"), TTL));
    }

    #[test]
    fn test_clear() {
        let shard = LruShard::new(1000);
        shard.insert(key("x", "a"), entry(10));
        shard.clear();
        assert!(shard.is_empty());
        assert_eq!(shard.size_bytes(), 0);
    }
}
