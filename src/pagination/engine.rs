//! Pagination Engine
//!
//! Serves page, window, and stream requests on top of the tiered cache.
//!
//! # Request Flow
//!
//! ```text
//! get_page / get_virtual_window
//!        │
//!        ▼
//!  PredicateCompiler ──► (QuerySpec, CacheKey)
//!        │
//!        ▼
//!  TieredCache::get ──hit──► fresh: return
//!        │                   stale: return + background refresh
//!       miss
//!        │
//!        ▼
//!  InFlight::join_or_start ──► store (count ∥ rows) ──► TieredCache::set
//! ```
//!
//! Store failures propagate as `Error::StoreUnavailable` and are never
//! cached. Nothing is retried internally.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::FutureExt;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use super::context::RequestContext;
use super::inflight::{InFlight, Join};
use super::stream::{cursor_stream_with, RowStream};
use crate::cache::{CacheKey, CachePayload, Stats, TieredCache};
use crate::config::EngineConfig;
use crate::domain::{
    BackingStore, BlockId, DatasetBlock, PaginatedResult, RowUpdate, SharedCache, WindowResult,
};
use crate::error::{Error, Result};
use crate::query::{ColumnHints, CompiledQuery, KeyScope, PredicateCompiler, QueryParams, QuerySpec};

/// Default number of rows per page
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Largest page a caller may request
pub const MAX_PAGE_SIZE: u64 = 1000;

// =============================================================================
// Configuration
// =============================================================================

/// Pagination configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Upper bound for `page_size`; larger requests are clamped
    pub max_page_size: u64,
    /// Page size used by cache warming
    pub default_page_size: u64,
    /// Widest window served in one request
    pub max_window_rows: u64,
    /// Largest stream batch
    pub max_stream_batch: u64,
    /// Background prefetch fetches allowed at once
    pub prefetch_concurrency: usize,
    /// Share one store fetch between concurrent misses on a key
    pub coalesce_misses: bool,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_page_size: MAX_PAGE_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_window_rows: 5_000,
            max_stream_batch: 10_000,
            prefetch_concurrency: 4,
            coalesce_misses: true,
        }
    }
}

impl PaginationConfig {
    /// Clamp a requested page size into `[1, max_page_size]`
    pub fn clamp_page_size(&self, page_size: u64) -> u64 {
        page_size.clamp(1, self.max_page_size.max(1))
    }
}

// =============================================================================
// Fetch Requests
// =============================================================================

/// What a miss must load from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FetchTarget {
    /// 1-based page
    Page { page: u64, page_size: u64 },
    /// 0-based inclusive row indices
    Window { start: u64, end: u64 },
}

impl FetchTarget {
    fn scope(&self) -> KeyScope {
        match *self {
            FetchTarget::Page { page, page_size } => KeyScope::Page { page, page_size },
            FetchTarget::Window { start, end } => KeyScope::Window { start, end },
        }
    }
}

/// A compiled request: everything a miss needs, independent of the caller
#[derive(Debug, Clone)]
pub(super) struct FetchRequest {
    pub(super) block: BlockId,
    pub(super) spec: Arc<QuerySpec>,
    pub(super) key: CacheKey,
    pub(super) target: FetchTarget,
}

// =============================================================================
// Engine
// =============================================================================

pub(super) struct EngineInner {
    pub(super) store: Arc<dyn BackingStore>,
    pub(super) cache: TieredCache,
    pub(super) config: EngineConfig,
    pub(super) hints: DashMap<BlockId, Arc<ColumnHints>>,
    pub(super) inflight: InFlight,
    pub(super) tasks: TaskTracker,
    pub(super) prefetch_permits: Arc<Semaphore>,
}

/// Windowed pagination engine over a backing store and a tiered cache.
///
/// Cheap to clone; clones share the cache, counters, and background tasks.
#[derive(Clone)]
pub struct PaginationEngine {
    pub(super) inner: Arc<EngineInner>,
}

impl PaginationEngine {
    /// Create an engine with an in-process cache only
    pub fn new(store: Arc<dyn BackingStore>, config: EngineConfig) -> Self {
        let tasks = TaskTracker::new();
        let cache = TieredCache::new(config.cache.clone(), tasks.clone());
        Self::assemble(store, cache, config, tasks)
    }

    /// Create an engine whose cache is backed by a shared tier
    pub fn with_shared(
        store: Arc<dyn BackingStore>,
        shared: Arc<dyn SharedCache>,
        config: EngineConfig,
    ) -> Self {
        let tasks = TaskTracker::new();
        let cache = TieredCache::with_shared(config.cache.clone(), shared, tasks.clone());
        Self::assemble(store, cache, config, tasks)
    }

    fn assemble(
        store: Arc<dyn BackingStore>,
        cache: TieredCache,
        config: EngineConfig,
        tasks: TaskTracker,
    ) -> Self {
        let permits = config.pagination.prefetch_concurrency.max(1);
        info!(
            "Pagination engine ready (ttl={:?}, l1={} bytes, shared tier={})",
            cache.ttl(),
            config.cache.l1.capacity,
            cache.has_shared_tier()
        );
        Self {
            inner: Arc::new(EngineInner {
                store,
                cache,
                config,
                hints: DashMap::new(),
                inflight: InFlight::new(),
                tasks,
                prefetch_permits: Arc::new(Semaphore::new(permits)),
            }),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Register a block's schema; its column types become sort/filter hints.
    pub fn register_block(&self, block: &DatasetBlock) {
        let hints: ColumnHints = block
            .columns
            .iter()
            .map(|c| (c.id.clone(), c.column_type))
            .collect();
        debug!("Registered block {} with {} columns", block.id, hints.len());
        self.inner.hints.insert(block.id.clone(), Arc::new(hints));
    }

    /// Whether a page is live in the in-process tier. Touches no counters.
    pub fn is_page_cached(
        &self,
        block: &BlockId,
        page: u64,
        page_size: u64,
        params: &QueryParams,
    ) -> Result<bool> {
        let page_size = self.inner.config.pagination.clamp_page_size(page_size);
        let target = FetchTarget::Page {
            page: page.max(1),
            page_size,
        };
        let request = self.inner.request(block, params, target)?;
        Ok(self.inner.cache.contains_live(&request.key))
    }

    // =========================================================================
    // Pages
    // =========================================================================

    /// Get one 1-based page
    pub async fn get_page(
        &self,
        block: &BlockId,
        page: u64,
        page_size: u64,
        params: &QueryParams,
    ) -> Result<PaginatedResult> {
        self.get_page_with(block, page, page_size, params, &RequestContext::default())
            .await
    }

    /// [`get_page`](Self::get_page) under a cancellation token and deadline
    #[instrument(skip(self, block, params, ctx), fields(block = %block))]
    pub async fn get_page_with(
        &self,
        block: &BlockId,
        page: u64,
        page_size: u64,
        params: &QueryParams,
        ctx: &RequestContext,
    ) -> Result<PaginatedResult> {
        let page_size = self.inner.config.pagination.clamp_page_size(page_size);
        let target = FetchTarget::Page {
            page: page.max(1),
            page_size,
        };
        let request = self.inner.request(block, params, target)?;
        let payload = ctx.guard(self.inner.resolve(request)).await?;

        match payload.as_ref() {
            CachePayload::Page(result) => Ok(result.clone()),
            CachePayload::Window(_) => Err(Error::Serialization(
                "window payload stored under a page key".into(),
            )),
        }
    }

    // =========================================================================
    // Windows
    // =========================================================================

    /// Get rows `start..=end` (0-based) in the requested order
    pub async fn get_virtual_window(
        &self,
        block: &BlockId,
        start: u64,
        end: u64,
        params: &QueryParams,
    ) -> Result<WindowResult> {
        self.get_virtual_window_with(block, start, end, params, &RequestContext::default())
            .await
    }

    /// [`get_virtual_window`](Self::get_virtual_window) under a cancellation
    /// token and deadline
    #[instrument(skip(self, block, params, ctx), fields(block = %block))]
    pub async fn get_virtual_window_with(
        &self,
        block: &BlockId,
        start: u64,
        end: u64,
        params: &QueryParams,
        ctx: &RequestContext,
    ) -> Result<WindowResult> {
        if end < start {
            return Err(Error::InvalidWindow { start, end });
        }
        let max_rows = self.inner.config.pagination.max_window_rows.max(1);
        let end = end.min(start.saturating_add(max_rows - 1));

        let request = self
            .inner
            .request(block, params, FetchTarget::Window { start, end })?;
        let payload = ctx.guard(self.inner.resolve(request)).await?;

        match payload.as_ref() {
            CachePayload::Window(result) => Ok(result.clone()),
            CachePayload::Page(_) => Err(Error::Serialization(
                "page payload stored under a window key".into(),
            )),
        }
    }

    // =========================================================================
    // Streams
    // =========================================================================

    /// Stream every matching row in id order, `batch_size` rows at a time.
    ///
    /// Bypasses the cache. The stream ends after the first short batch and
    /// never yields an empty one.
    pub fn stream_rows(
        &self,
        block: &BlockId,
        batch_size: u64,
        params: &QueryParams,
    ) -> Result<RowStream> {
        self.stream_rows_with(block, batch_size, params, &RequestContext::new())
    }

    /// [`stream_rows`](Self::stream_rows) under a context. A batch in flight
    /// when the context fires is abandoned; the stream then yields
    /// `Cancelled` or `DeadlineExceeded` once and ends.
    pub fn stream_rows_with(
        &self,
        block: &BlockId,
        batch_size: u64,
        params: &QueryParams,
        ctx: &RequestContext,
    ) -> Result<RowStream> {
        let spec = self.inner.compile(block, params, KeyScope::Stream)?.spec;
        let batch_size = batch_size.clamp(1, self.inner.config.pagination.max_stream_batch.max(1));
        debug!("Streaming block {} in batches of {}", block, batch_size);
        Ok(cursor_stream_with(
            Arc::clone(&self.inner.store),
            block.clone(),
            spec,
            batch_size,
            ctx.clone(),
        ))
    }

    // =========================================================================
    // Writes & Invalidation
    // =========================================================================

    /// Apply a batch of cell changes, then invalidate the block
    #[instrument(skip(self, block, updates), fields(block = %block, rows = updates.len()))]
    pub async fn update_cells(&self, block: &BlockId, updates: Vec<RowUpdate>) -> Result<()> {
        self.inner
            .store
            .batch_update(block, updates)
            .await
            .map_err(|e| Error::store(block.as_str(), e))?;
        self.invalidate_block(block).await;
        Ok(())
    }

    /// Drop every cached entry of one block from both tiers
    ///
    /// Returns the number of in-process entries removed.
    pub async fn invalidate_block(&self, block: &BlockId) -> usize {
        self.inner.inflight.forget_block(block);
        let removed = self.inner.cache.invalidate_block(block).await;
        info!("Invalidated block {} ({} entries)", block, removed);
        removed
    }

    // =========================================================================
    // Stats & Lifecycle
    // =========================================================================

    /// Point-in-time statistics. No side effects.
    pub fn stats(&self) -> Stats {
        self.inner.cache.stats()
    }

    /// Wait for background work, clear both tiers, then reset counters
    pub async fn clear_all(&self) {
        self.drain().await;
        self.inner.cache.clear_all().await;
        info!("Cleared all cache tiers");
    }

    /// Wait for background refreshes, prefetches, and shared-tier writes
    pub async fn drain(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    /// Background tasks still running
    pub fn pending_tasks(&self) -> usize {
        self.inner.tasks.len()
    }
}

// =============================================================================
// Miss Path
// =============================================================================

impl EngineInner {
    pub(super) fn compile(
        &self,
        block: &BlockId,
        params: &QueryParams,
        scope: KeyScope,
    ) -> Result<CompiledQuery> {
        let hints = self.hints.get(block).map(|h| Arc::clone(h.value()));
        let compiler = PredicateCompiler::new(self.cache.namespace());
        match hints.as_deref() {
            Some(hints) => compiler.with_hints(hints).compile(block, params, scope),
            None => compiler.compile(block, params, scope),
        }
    }

    pub(super) fn request(
        &self,
        block: &BlockId,
        params: &QueryParams,
        target: FetchTarget,
    ) -> Result<FetchRequest> {
        let compiled = self.compile(block, params, target.scope())?;
        Ok(FetchRequest {
            block: block.clone(),
            spec: Arc::new(compiled.spec),
            key: compiled.key,
            target,
        })
    }

    /// Serve from cache when possible, otherwise load from the store
    pub(super) async fn resolve(self: &Arc<Self>, request: FetchRequest) -> Result<Arc<CachePayload>> {
        if let Some(hit) = self.cache.get(&request.key).await {
            if let Some(payload) = self.serve_cached(&request, &hit) {
                return Ok(payload);
            }
        }
        self.load(request).await
    }

    /// Fetch from the store, sharing the fetch with concurrent misses
    pub(super) async fn load(self: &Arc<Self>, request: FetchRequest) -> Result<Arc<CachePayload>> {
        if !self.config.pagination.coalesce_misses {
            return self.fetch_from_store(&request).await;
        }

        let key = request.key.clone();
        let inner = Arc::clone(self);
        let join = self.inflight.join_or_start(&key, move || {
            async move { inner.fetch_from_store(&request).await }.boxed()
        });
        if let Join::Follower(_) = &join {
            self.cache.metrics().record_coalesced();
            debug!("Joined in-flight fetch for {}", key);
        }
        join.into_future().await
    }

    /// Query the store and write the result through the cache.
    ///
    /// The write happens only after both store calls return cleanly, so a
    /// dropped or failed fetch leaves the cache untouched.
    async fn fetch_from_store(&self, request: &FetchRequest) -> Result<Arc<CachePayload>> {
        let block = &request.block;
        let spec = request.spec.as_ref();
        self.cache.metrics().record_store_fetch();

        let payload = match request.target {
            FetchTarget::Page { page, page_size } => {
                let offset = (page - 1).saturating_mul(page_size);
                let (total, rows) = tokio::try_join!(
                    self.store.count(block, spec),
                    self.store.fetch_page(block, spec, offset, page_size),
                )
                .map_err(|e| Error::store(block.as_str(), e))?;
                CachePayload::Page(PaginatedResult::new(rows, total, page, page_size))
            }
            FetchTarget::Window { start, end } => {
                let (total, rows) = tokio::try_join!(
                    self.store.count(block, spec),
                    self.store.ranked_window(
                        block,
                        spec,
                        start.saturating_add(1),
                        end.saturating_add(1)
                    ),
                )
                .map_err(|e| Error::store(block.as_str(), e))?;
                CachePayload::Window(WindowResult {
                    rows,
                    total,
                    start_index: start,
                    end_index: end,
                })
            }
        };

        let payload = Arc::new(payload);
        if let Err(e) = self.cache.set(request.key.clone(), Arc::clone(&payload)) {
            warn!("cache: failed to store {}: {}", request.key, e);
        }
        debug!("Loaded {} from store", request.key);
        Ok(payload)
    }
}
