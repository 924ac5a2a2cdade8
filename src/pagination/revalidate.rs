//! Stale-While-Revalidate
//!
//! A cached entry is served as long as it is younger than the TTL. Once it
//! passes half the TTL it is still returned immediately, but a background
//! refresh is started through the regular miss path:
//!
//! ```text
//!  age:  0 ──────── TTL/2 ──────── TTL ────────►
//!        │  fresh    │   stale      │  expired
//!        │  serve    │   serve +    │  miss
//!        │           │   refresh    │
//! ```
//!
//! Refresh failures are counted and logged; the stale entry stays in place.

use std::sync::Arc;

use tracing::{debug, warn};

use super::engine::{EngineInner, FetchRequest};
use crate::cache::{CacheHit, CachePayload, Freshness};

impl EngineInner {
    /// Decide what a cache hit yields.
    ///
    /// Returns `None` when the entry has expired and must be reloaded.
    pub(super) fn serve_cached(
        self: &Arc<Self>,
        request: &FetchRequest,
        hit: &CacheHit,
    ) -> Option<Arc<CachePayload>> {
        match hit.entry.freshness(self.cache.ttl()) {
            Freshness::Fresh => Some(Arc::clone(hit.entry.payload())),
            Freshness::Stale => {
                self.revalidate(request.clone());
                Some(Arc::clone(hit.entry.payload()))
            }
            Freshness::Expired => None,
        }
    }

    /// Refresh an entry in the background
    pub(super) fn revalidate(self: &Arc<Self>, request: FetchRequest) {
        if self.inflight.contains(&request.key) {
            debug!("Refresh of {} already running", request.key);
            return;
        }

        self.cache.metrics().record_revalidation();
        let inner = Arc::clone(self);
        self.tasks.spawn(async move {
            let key = request.key.clone();
            match inner.load(request).await {
                Ok(_) => debug!("Revalidated {}", key),
                Err(e) => {
                    inner.cache.metrics().record_revalidation_failure();
                    warn!("Revalidation of {} failed, keeping stale entry: {}", key, e);
                }
            }
        });
    }
}
