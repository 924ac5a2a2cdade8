//! Prefetcher & Cache Warmer
//!
//! - `prefetch_*` maps a row range onto the pages covering it and fetches
//!   only the pages that are neither cached nor already loading
//! - `warm_cache*` loads the first N pages at cold start
//!
//! Background fetches share one semaphore, so a burst of scroll events
//! cannot flood the store.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use super::engine::{EngineInner, FetchRequest, FetchTarget, PaginationEngine};
use crate::domain::BlockId;
use crate::error::{Error, Result};
use crate::query::QueryParams;

/// 1-based pages of `page_size` rows covering 0-based rows `start..=end`.
/// Saturates at `u64::MAX` for rows at the very top of the index space.
pub fn covering_pages(start: u64, end: u64, page_size: u64) -> std::ops::RangeInclusive<u64> {
    let page_size = page_size.max(1);
    (start / page_size).saturating_add(1)..=(end / page_size).saturating_add(1)
}

impl PaginationEngine {
    /// Prefetch the unfiltered pages covering rows `start..=end`
    pub fn prefetch_batch(
        &self,
        block: &BlockId,
        start: u64,
        end: u64,
        page_size: u64,
    ) -> Result<usize> {
        self.prefetch_range(block, start, end, page_size, &QueryParams::default())
    }

    /// Prefetch the pages covering rows `start..=end` under `params`.
    ///
    /// Returns the number of page fetches scheduled.
    #[instrument(skip(self, block, params), fields(block = %block))]
    pub fn prefetch_range(
        &self,
        block: &BlockId,
        start: u64,
        end: u64,
        page_size: u64,
        params: &QueryParams,
    ) -> Result<usize> {
        if end < start {
            return Err(Error::InvalidWindow { start, end });
        }
        let config = &self.inner.config.pagination;
        let page_size = config.clamp_page_size(page_size);
        let end = end.min(start.saturating_add(config.max_window_rows.max(1) - 1));

        let mut scheduled = 0;
        for page in covering_pages(start, end, page_size) {
            let request = self
                .inner
                .request(block, params, FetchTarget::Page { page, page_size })?;
            if self.inner.cache.contains_live(&request.key)
                || self.inner.inflight.contains(&request.key)
            {
                continue;
            }
            self.inner.spawn_prefetch(request);
            scheduled += 1;
        }

        debug!("Scheduled {} prefetches for rows {}..={}", scheduled, start, end);
        Ok(scheduled)
    }

    /// Load pages `1..=preload_pages` with the default page size
    pub async fn warm_cache(&self, block: &BlockId, preload_pages: u64) -> usize {
        self.warm_cache_for(block, preload_pages, &QueryParams::default())
            .await
    }

    /// Load pages `1..=preload_pages` under `params`, in parallel.
    ///
    /// Returns the number of pages now cached; failures are logged.
    #[instrument(skip(self, block, params), fields(block = %block))]
    pub async fn warm_cache_for(
        &self,
        block: &BlockId,
        preload_pages: u64,
        params: &QueryParams,
    ) -> usize {
        let config = &self.inner.config.pagination;
        let page_size = config.clamp_page_size(config.default_page_size);
        let concurrency = config.prefetch_concurrency.max(1);

        let results: Vec<(u64, Result<_>)> = stream::iter(1..=preload_pages)
            .map(|page| async move { (page, self.get_page(block, page, page_size, params).await) })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut warmed = 0;
        for (page, result) in results {
            match result {
                Ok(_) => warmed += 1,
                Err(e) => warn!("Failed to warm page {} of {}: {}", page, block, e),
            }
        }
        info!("Warmed {}/{} pages of {}", warmed, preload_pages, block);
        warmed
    }
}

impl EngineInner {
    fn spawn_prefetch(self: &Arc<Self>, request: FetchRequest) {
        let inner = Arc::clone(self);
        let permits = Arc::clone(&self.prefetch_permits);
        self.tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            // Filled by a foreground request while queued
            if inner.cache.contains_live(&request.key) {
                return;
            }
            let key = request.key.clone();
            if let Err(e) = inner.load(request).await {
                debug!("Prefetch of {} failed: {}", key, e);
            }
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
