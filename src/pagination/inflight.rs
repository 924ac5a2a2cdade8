//! In-Flight Fetch Coalescing
//!
//! Concurrent misses for one cache key share a single store fetch. The map
//! holds only weak handles: when every waiter has gone away the fetch future
//! is dropped, which abandons the store query.
//!
//! ```text
//!  caller A ──┐                     ┌── Shared<fetch> ──► store
//!  caller B ──┼── join_or_start ────┤
//!  caller C ──┘                     └── (weak handle in map until done)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};

use crate::cache::{CacheKey, CachePayload};
use crate::domain::BlockId;
use crate::error::Result;

/// Output of a store fetch
pub type FetchOutput = Result<Arc<CachePayload>>;

/// Fetch future shared by every waiter on one key
pub type SharedFetch = Shared<BoxFuture<'static, FetchOutput>>;

type WeakFetch = WeakShared<BoxFuture<'static, FetchOutput>>;
type FetchMap = DashMap<CacheKey, (u64, WeakFetch)>;

/// Role of a caller in a coalesced fetch
pub enum Join {
    /// Started the fetch
    Leader(SharedFetch),
    /// Attached to a fetch already running
    Follower(SharedFetch),
}

impl Join {
    pub fn into_future(self) -> SharedFetch {
        match self {
            Join::Leader(fetch) | Join::Follower(fetch) => fetch,
        }
    }
}

/// Removes the map slot once its fetch finishes or is dropped.
///
/// Matches on the generation id so a newer fetch for the same key survives.
struct Completion {
    map: Arc<FetchMap>,
    key: CacheKey,
    id: u64,
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.map.remove_if(&self.key, |_, (id, _)| *id == self.id);
    }
}

/// Single-flight registry keyed by cache key
#[derive(Default)]
pub struct InFlight {
    map: Arc<FetchMap>,
    next_id: AtomicU64,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the running fetch for `key`, or start one with `start`.
    pub fn join_or_start<F>(&self, key: &CacheKey, start: F) -> Join
    where
        F: FnOnce() -> BoxFuture<'static, FetchOutput>,
    {
        match self.map.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                if let Some(running) = slot.get().1.upgrade() {
                    return Join::Follower(running);
                }
                let (id, fetch, weak) = self.launch(key, start);
                if let Some(weak) = weak {
                    slot.insert((id, weak));
                }
                Join::Leader(fetch)
            }
            Entry::Vacant(slot) => {
                let (id, fetch, weak) = self.launch(key, start);
                if let Some(weak) = weak {
                    slot.insert((id, weak));
                }
                Join::Leader(fetch)
            }
        }
    }

    fn launch<F>(&self, key: &CacheKey, start: F) -> (u64, SharedFetch, Option<WeakFetch>)
    where
        F: FnOnce() -> BoxFuture<'static, FetchOutput>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let completion = Completion {
            map: Arc::clone(&self.map),
            key: key.clone(),
            id,
        };
        let work = start();
        let fetch = async move {
            let _completion = completion;
            work.await
        }
        .boxed()
        .shared();
        let weak = fetch.downgrade();
        (id, fetch, weak)
    }

    /// Whether a live fetch is registered for `key`
    pub fn contains(&self, key: &CacheKey) -> bool {
        let running = self.map.get(key).and_then(|slot| slot.1.upgrade());
        running.is_some()
    }

    /// Detach every fetch of `block` so later callers start fresh ones.
    ///
    /// Detached fetches still run to completion for their current waiters.
    pub fn forget_block(&self, block: &BlockId) {
        self.map.retain(|key, _| key.block_id() != block);
    }

    /// Number of registered fetches
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
