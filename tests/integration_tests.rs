//! gridcache Integration Tests
//!
//! End-to-end scenarios through the public engine API:
//! - Paging, windows, and streams over an in-memory store
//! - Freshness, revalidation, and expiry
//! - Coalescing, cancellation, and deadlines
//! - Shared tier promotion and soft failures
//! - Invalidation, prefetch, and warming

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::{StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use gridcache::adapters::{sample_rows, InMemorySharedCache, InMemoryStore};
use gridcache::{
    BlockId, Column, ColumnId, ColumnType, DatasetBlock, EngineConfig, Error, Filter,
    PaginationEngine, QueryParams, RequestContext, Row, RowUpdate, Sort, Stats, StoreError, Value,
};

const ORDERS: usize = 2500;

fn orders() -> BlockId {
    BlockId::new("orders")
}

fn store() -> Arc<InMemoryStore> {
    Arc::new(
        InMemoryStore::new()
            .with_block("orders", sample_rows(ORDERS))
            .with_block("customers", sample_rows(300)),
    )
}

fn engine(store: &Arc<InMemoryStore>) -> PaginationEngine {
    PaginationEngine::new(store.clone(), EngineConfig::default())
}

fn engine_with(store: &Arc<InMemoryStore>, yaml: &str) -> PaginationEngine {
    PaginationEngine::new(store.clone(), EngineConfig::from_yaml_str(yaml).unwrap())
}

fn all() -> QueryParams {
    QueryParams::default()
}

fn positions(rows: &[Row]) -> Vec<i64> {
    rows.iter().map(|r| r.position).collect()
}

// =============================================================================
// Pages & Windows
// =============================================================================

mod paging_tests {
    use super::*;

    #[tokio::test]
    async fn test_page_then_memory_hit() {
        let store = store();
        let engine = engine(&store);

        let page = engine.get_page(&orders(), 3, 100, &all()).await.unwrap();
        assert_eq!(page.rows.len(), 100);
        assert_eq!(page.total, 2500);
        assert_eq!(page.total_pages, 25);
        assert!(page.has_more);
        assert_eq!(page.rows[0].position, 201);

        let calls = store.calls();
        let again = engine.get_page(&orders(), 3, 100, &all()).await.unwrap();
        assert_eq!(again, page);
        assert_eq!(store.calls().reads(), calls.reads());

        let stats = engine.stats();
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.memory_misses, 1);
        assert_eq!(stats.store_fetches, 1);
        assert_eq!(stats.memory_entries, 1);
        assert!(stats.memory_bytes > 0);
    }

    #[tokio::test]
    async fn test_last_and_out_of_range_pages() {
        let store = store();
        let engine = engine(&store);

        let last = engine.get_page(&orders(), 25, 100, &all()).await.unwrap();
        assert_eq!(last.rows.len(), 100);
        assert!(!last.has_more);

        let beyond = engine.get_page(&orders(), 40, 100, &all()).await.unwrap();
        assert!(beyond.rows.is_empty());
        assert_eq!(beyond.total, 2500);
        assert!(!beyond.has_more);
    }

    #[tokio::test]
    async fn test_page_size_and_page_number_are_clamped() {
        let store = store();
        let engine = engine(&store);

        let big = engine.get_page(&orders(), 1, 50_000, &all()).await.unwrap();
        assert_eq!(big.page_size, 1000);
        assert_eq!(big.rows.len(), 1000);
        assert_eq!(big.total_pages, 3);

        let zero = engine.get_page(&orders(), 0, 10, &all()).await.unwrap();
        assert_eq!(zero.page, 1);
        assert_eq!(positions(&zero.rows), (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_window_maps_to_ranks() {
        let store = store();
        let engine = engine(&store);

        let window = engine
            .get_virtual_window(&orders(), 10, 19, &all())
            .await
            .unwrap();
        assert_eq!(window.start_index, 10);
        assert_eq!(window.end_index, 19);
        assert_eq!(window.total, 2500);
        assert_eq!(positions(&window.rows), (11..=20).collect::<Vec<_>>());
        assert_eq!(store.calls().ranked_window, 1);

        engine
            .get_virtual_window(&orders(), 10, 19, &all())
            .await
            .unwrap();
        assert_eq!(store.calls().ranked_window, 1);
    }

    #[tokio::test]
    async fn test_window_validation_and_clamp() {
        let store = store();
        let engine = engine_with(&store, "pagination:\n  max_window_rows: 100\n");

        assert_matches!(
            engine.get_virtual_window(&orders(), 20, 10, &all()).await,
            Err(Error::InvalidWindow { start: 20, end: 10 })
        );

        let single = engine.get_virtual_window(&orders(), 5, 5, &all()).await.unwrap();
        assert_eq!(positions(&single.rows), vec![6]);

        let wide = engine.get_virtual_window(&orders(), 0, 999, &all()).await.unwrap();
        assert_eq!(wide.end_index, 99);
        assert_eq!(wide.rows.len(), 100);
    }

    #[tokio::test]
    async fn test_filters_get_their_own_keys() {
        let store = store();
        let engine = engine(&store);
        let paid = QueryParams::new().filter(Filter::equals("status", "paid"));

        let unfiltered = engine.get_page(&orders(), 1, 100, &all()).await.unwrap();
        let filtered = engine.get_page(&orders(), 1, 100, &paid).await.unwrap();
        assert_eq!(unfiltered.total, 2500);
        assert_eq!(filtered.total, 834);
        assert!(filtered
            .rows
            .iter()
            .all(|r| r.cell(&ColumnId::new("status")) == &Value::text("paid")));
        assert_eq!(engine.stats().store_fetches, 2);

        engine.get_page(&orders(), 1, 100, &paid).await.unwrap();
        assert_eq!(engine.stats().store_fetches, 2);
    }

    #[tokio::test]
    async fn test_invalid_filter_never_reaches_store() {
        let store = store();
        let engine = engine(&store);
        let bad = QueryParams::new().filter(Filter::new(
            "amount",
            gridcache::FilterOperator::Contains,
            10i64,
        ));

        assert_matches!(
            engine.get_page(&orders(), 1, 10, &bad).await,
            Err(Error::InvalidFilter(_))
        );
        assert_eq!(store.calls().reads(), 0);
    }

    #[tokio::test]
    async fn test_registered_schema_sorts_numerically() {
        let store = store();
        let engine = engine(&store);
        engine.register_block(&DatasetBlock::new(
            "orders",
            vec![
                Column::new("customer", "Customer", ColumnType::Text),
                Column::new("amount", "Amount", ColumnType::Number),
            ],
        ));

        let by_amount = QueryParams::new().sort(Sort::asc("amount"));
        let page = engine.get_page(&orders(), 1, 200, &by_amount).await.unwrap();
        let amounts: Vec<f64> = page
            .rows
            .iter()
            .map(|r| match r.cell(&ColumnId::new("amount")) {
                Value::Number(n) => *n,
                other => panic!("unexpected amount {:?}", other),
            })
            .collect();
        assert!(amounts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(amounts[0], 0.0);
    }

    #[tokio::test]
    async fn test_registering_schema_after_caching_keeps_pages_consistent() {
        let names = ["alpha", "Zed", "beta", "Yak"];
        let rows = names
            .iter()
            .enumerate()
            .map(|(i, name)| Row::new(format!("row-{}", i + 1), i as i64 + 1).with_cell("name", *name))
            .collect();
        let store = Arc::new(InMemoryStore::new().with_block("people", rows));
        let engine = engine(&store);
        let people = BlockId::new("people");
        let by_name = QueryParams::new().sort(Sort::asc("name"));
        let name_of = |row: &Row| row.cell(&ColumnId::new("name")).display_text();

        let before = engine.get_page(&people, 1, 2, &by_name).await.unwrap();
        assert_eq!(before.rows.iter().map(name_of).collect::<Vec<_>>(), vec!["Yak", "Zed"]);

        engine.register_block(&DatasetBlock::new(
            "people",
            vec![Column::new("name", "Name", ColumnType::Text)],
        ));

        let first = engine.get_page(&people, 1, 2, &by_name).await.unwrap();
        let second = engine.get_page(&people, 2, 2, &by_name).await.unwrap();
        let mut seen: Vec<String> = first.rows.iter().chain(&second.rows).map(name_of).collect();
        assert_eq!(seen, vec!["alpha", "beta", "Yak", "Zed"]);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 4);
    }
}

// =============================================================================
// Freshness
// =============================================================================

mod freshness_tests {
    use super::*;

    const TTL_10S: &str = "cache:\n  ttl_secs: 10\n";

    #[tokio::test(start_paused = true)]
    async fn test_stale_hit_is_served_and_refreshed() {
        let store = store();
        let engine = engine_with(&store, TTL_10S);

        engine.get_page(&orders(), 1, 50, &all()).await.unwrap();
        assert_eq!(store.calls().fetch_page, 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        let stale = engine.get_page(&orders(), 1, 50, &all()).await.unwrap();
        assert_eq!(stale.rows.len(), 50);

        engine.drain().await;
        assert_eq!(store.calls().fetch_page, 2);
        assert_eq!(engine.stats().revalidations, 1);

        // The refreshed entry is fresh again
        engine.get_page(&orders(), 1, 50, &all()).await.unwrap();
        engine.drain().await;
        assert_eq!(store.calls().fetch_page, 2);
        assert_eq!(engine.stats().revalidations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_second_ttl_drives_revalidation() {
        let store = store();
        let engine = engine_with(&store, "cache:\n  ttl_ms: 400\n");

        engine.get_page(&orders(), 1, 50, &all()).await.unwrap();
        tokio::time::advance(Duration::from_millis(100)).await;
        engine.get_page(&orders(), 1, 50, &all()).await.unwrap();
        engine.drain().await;
        assert_eq!(store.calls().fetch_page, 1);

        tokio::time::advance(Duration::from_millis(150)).await;
        engine.get_page(&orders(), 1, 50, &all()).await.unwrap();
        engine.drain().await;
        assert_eq!(store.calls().fetch_page, 2);
        assert_eq!(engine.stats().revalidations, 1);

        tokio::time::advance(Duration::from_millis(500)).await;
        engine.get_page(&orders(), 1, 50, &all()).await.unwrap();
        assert_eq!(store.calls().fetch_page, 3);
        assert_eq!(engine.stats().revalidations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_reloaded_inline() {
        let store = store();
        let engine = engine_with(&store, TTL_10S);

        engine.get_page(&orders(), 1, 50, &all()).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        engine.get_page(&orders(), 1, 50, &all()).await.unwrap();
        assert_eq!(store.calls().fetch_page, 2);
        let stats = engine.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.revalidations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_stale_entry() {
        let store = store();
        let engine = engine_with(&store, TTL_10S);

        let fresh = engine.get_page(&orders(), 1, 50, &all()).await.unwrap();
        tokio::time::advance(Duration::from_secs(7)).await;
        store.set_failure(Some(StoreError::Unavailable("down".into())));

        let stale = engine.get_page(&orders(), 1, 50, &all()).await.unwrap();
        assert_eq!(stale, fresh);
        engine.drain().await;

        let stats = engine.stats();
        assert_eq!(stats.revalidations, 1);
        assert_eq!(stats.revalidation_failures, 1);
        assert!(engine.is_page_cached(&orders(), 1, 50, &all()).unwrap());
    }

    #[tokio::test]
    async fn test_store_errors_are_not_cached() {
        let store = store();
        let engine = engine(&store);

        store.set_failure(Some(StoreError::Timeout));
        let err = engine.get_page(&orders(), 1, 100, &all()).await.unwrap_err();
        assert_matches!(
            err,
            Error::StoreUnavailable { ref block_id, source: StoreError::Timeout } if block_id == "orders"
        );
        assert!(err.is_retryable());
        assert!(!engine.is_page_cached(&orders(), 1, 100, &all()).unwrap());

        store.set_failure(None);
        engine.get_page(&orders(), 1, 100, &all()).await.unwrap();
        assert_eq!(engine.stats().store_fetches, 2);
    }

    #[tokio::test]
    async fn test_unknown_block_is_an_error() {
        let store = store();
        let engine = engine(&store);
        assert_matches!(
            engine.get_page(&BlockId::new("missing"), 1, 10, &all()).await,
            Err(Error::StoreUnavailable { source: StoreError::Rejected(_), .. })
        );
    }
}

// =============================================================================
// Concurrency
// =============================================================================

mod concurrency_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_fetch() {
        let store = store();
        store.set_latency(Duration::from_millis(50));
        let engine = engine(&store);

        let block = orders();
        let params = all();
        let requests = (0..5).map(|_| engine.get_page(&block, 2, 100, &params));
        let results = futures::future::join_all(requests).await;

        assert!(results.iter().all(|r| r.is_ok()));
        let stats = engine.stats();
        assert_eq!(stats.store_fetches, 1);
        assert_eq!(stats.coalesced, 4);
        assert_eq!(store.calls().fetch_page, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalescing_can_be_disabled() {
        let store = store();
        store.set_latency(Duration::from_millis(50));
        let engine = engine_with(&store, "pagination:\n  coalesce_misses: false\n");

        let block = orders();
        let params = all();
        let (a, b) = tokio::join!(
            engine.get_page(&block, 2, 100, &params),
            engine.get_page(&block, 2, 100, &params)
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(engine.stats().store_fetches, 2);
        assert_eq!(engine.stats().coalesced, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_writes_nothing() {
        let store = store();
        store.set_latency(Duration::from_millis(100));
        let engine = engine(&store);

        let token = CancellationToken::new();
        let ctx = RequestContext::new().with_cancel(token.clone());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = engine.get_page_with(&orders(), 1, 100, &all(), &ctx).await;
        assert_matches!(result, Err(Error::Cancelled));

        tokio::time::sleep(Duration::from_millis(500)).await;
        engine.drain().await;
        assert!(!engine.is_page_cached(&orders(), 1, 100, &all()).unwrap());
        assert_eq!(engine.stats().memory_entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded_writes_nothing() {
        let store = store();
        store.set_latency(Duration::from_millis(100));
        let engine = engine(&store);

        let ctx = RequestContext::new().with_timeout(Duration::from_millis(20));
        let result = engine
            .get_virtual_window_with(&orders(), 0, 49, &all(), &ctx)
            .await;
        assert_matches!(result, Err(Error::DeadlineExceeded));

        tokio::time::sleep(Duration::from_millis(500)).await;
        engine.drain().await;
        assert_eq!(engine.stats().memory_entries, 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_context_skips_work() {
        let store = store();
        let engine = engine(&store);
        let ctx = RequestContext::new();
        ctx.cancel.cancel();

        assert_matches!(
            engine.get_page_with(&orders(), 1, 10, &all(), &ctx).await,
            Err(Error::Cancelled)
        );
        assert_eq!(store.calls().reads(), 0);
    }
}

// =============================================================================
// Shared Tier
// =============================================================================

mod shared_tier_tests {
    use super::*;

    #[tokio::test]
    async fn test_second_engine_is_served_from_shared_tier() {
        let store = store();
        let shared = Arc::new(InMemorySharedCache::new());
        let a = PaginationEngine::with_shared(store.clone(), shared.clone(), EngineConfig::default());
        let b = PaginationEngine::with_shared(store.clone(), shared.clone(), EngineConfig::default());

        let from_store = a.get_page(&orders(), 4, 100, &all()).await.unwrap();
        a.drain().await;
        assert_eq!(shared.len(), 1);

        let from_shared = b.get_page(&orders(), 4, 100, &all()).await.unwrap();
        assert_eq!(from_shared, from_store);
        assert_eq!(store.calls().fetch_page, 1);

        let stats = b.stats();
        assert_eq!(stats.shared_hits, 1);
        assert_eq!(stats.memory_misses, 1);
        assert_eq!(stats.store_fetches, 0);

        // Promoted into b's memory tier
        b.get_page(&orders(), 4, 100, &all()).await.unwrap();
        assert_eq!(b.stats().memory_hits, 1);
    }

    #[tokio::test]
    async fn test_shared_failures_are_soft() {
        let store = store();
        let shared = Arc::new(InMemorySharedCache::new());
        shared.set_failing(true);
        let engine =
            PaginationEngine::with_shared(store.clone(), shared.clone(), EngineConfig::default());

        let page = engine.get_page(&orders(), 1, 100, &all()).await.unwrap();
        assert_eq!(page.rows.len(), 100);
        engine.drain().await;

        let stats = engine.stats();
        assert_eq!(stats.shared_misses, 1);
        assert_eq!(stats.shared_write_failures, 1);
        assert!(engine.is_page_cached(&orders(), 1, 100, &all()).unwrap());
    }

    #[tokio::test]
    async fn test_invalidation_reaches_shared_tier() {
        let store = store();
        let shared = Arc::new(InMemorySharedCache::new());
        let engine =
            PaginationEngine::with_shared(store.clone(), shared.clone(), EngineConfig::default());

        engine.get_page(&orders(), 1, 100, &all()).await.unwrap();
        engine.get_page(&BlockId::new("customers"), 1, 100, &all()).await.unwrap();
        engine.drain().await;
        assert_eq!(shared.len(), 2);

        engine.invalidate_block(&orders()).await;
        assert_eq!(shared.len(), 1);
        assert!(shared.keys().iter().all(|k| k.contains("customers")));
    }
}

// =============================================================================
// Writes & Invalidation
// =============================================================================

mod invalidation_tests {
    use super::*;

    #[tokio::test]
    async fn test_invalidation_is_scoped_to_block() {
        let store = store();
        let engine = engine(&store);
        let customers = BlockId::new("customers");

        engine.get_page(&orders(), 1, 100, &all()).await.unwrap();
        engine.get_page(&orders(), 2, 100, &all()).await.unwrap();
        engine.get_page(&customers, 1, 100, &all()).await.unwrap();

        assert_eq!(engine.invalidate_block(&orders()).await, 2);
        assert!(!engine.is_page_cached(&orders(), 1, 100, &all()).unwrap());
        assert!(engine.is_page_cached(&customers, 1, 100, &all()).unwrap());

        engine.get_page(&customers, 1, 100, &all()).await.unwrap();
        assert_eq!(engine.stats().store_fetches, 3);
        engine.get_page(&orders(), 1, 100, &all()).await.unwrap();
        assert_eq!(engine.stats().store_fetches, 4);
    }

    #[tokio::test]
    async fn test_update_cells_invalidates_block() {
        let store = store();
        let engine = engine(&store);

        let before = engine.get_page(&orders(), 1, 10, &all()).await.unwrap();
        assert_ne!(
            before.rows[0].cell(&ColumnId::new("amount")),
            &Value::Number(99_999.0)
        );

        engine
            .update_cells(
                &orders(),
                vec![RowUpdate::new("row-00000001").set("amount", 99_999i64)],
            )
            .await
            .unwrap();
        assert!(!engine.is_page_cached(&orders(), 1, 10, &all()).unwrap());

        let after = engine.get_page(&orders(), 1, 10, &all()).await.unwrap();
        assert_eq!(
            after.rows[0].cell(&ColumnId::new("amount")),
            &Value::Number(99_999.0)
        );
    }

    #[tokio::test]
    async fn test_rejected_update_keeps_cache() {
        let store = store();
        let engine = engine(&store);
        engine.get_page(&orders(), 1, 10, &all()).await.unwrap();

        let result = engine
            .update_cells(
                &orders(),
                vec![
                    RowUpdate::new("row-00000001").set("amount", 1i64),
                    RowUpdate::new("row-99999999").set("amount", 2i64),
                ],
            )
            .await;
        assert_matches!(
            result,
            Err(Error::StoreUnavailable { source: StoreError::Rejected(_), .. })
        );
        assert!(engine.is_page_cached(&orders(), 1, 10, &all()).unwrap());
    }

    #[tokio::test]
    async fn test_clear_all_resets_everything() {
        let store = store();
        let engine = engine(&store);
        for page in 1..=3 {
            engine.get_page(&orders(), page, 100, &all()).await.unwrap();
        }
        engine.get_page(&orders(), 1, 100, &all()).await.unwrap();
        assert_ne!(engine.stats(), Stats::default());

        engine.clear_all().await;
        assert_eq!(engine.stats(), Stats::default());
        assert!(!engine.is_page_cached(&orders(), 1, 100, &all()).unwrap());
    }
}

// =============================================================================
// Prefetch & Warming
// =============================================================================

mod prefetch_tests {
    use super::*;

    #[tokio::test]
    async fn test_prefetch_fills_only_gaps() {
        let store = store();
        let engine = engine(&store);

        engine.get_page(&orders(), 2, 100, &all()).await.unwrap();
        let scheduled = engine.prefetch_batch(&orders(), 0, 299, 100).unwrap();
        assert_eq!(scheduled, 2);
        engine.drain().await;

        for page in 1..=3 {
            assert!(engine.is_page_cached(&orders(), page, 100, &all()).unwrap());
        }
        assert_eq!(engine.prefetch_batch(&orders(), 0, 299, 100).unwrap(), 0);
        assert_eq!(engine.stats().store_fetches, 3);
    }

    #[tokio::test]
    async fn test_prefetch_rejects_inverted_range() {
        let store = store();
        let engine = engine(&store);
        assert_matches!(
            engine.prefetch_batch(&orders(), 300, 0, 100),
            Err(Error::InvalidWindow { .. })
        );
    }

    #[tokio::test]
    async fn test_prefetch_at_end_of_row_space() {
        let store = store();
        let engine = engine(&store);

        let scheduled = engine.prefetch_batch(&orders(), u64::MAX - 1, u64::MAX, 1).unwrap();
        assert_eq!(scheduled, 1);
        engine.drain().await;
        assert!(engine.is_page_cached(&orders(), u64::MAX, 1, &all()).unwrap());

        let page = engine.get_page(&orders(), u64::MAX, 1, &all()).await.unwrap();
        assert!(page.rows.is_empty());
        assert_eq!(page.total, 2500);
        assert!(!page.has_more);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_request_joins_prefetch() {
        let store = store();
        store.set_latency(Duration::from_millis(50));
        let engine = engine(&store);

        assert_eq!(engine.prefetch_batch(&orders(), 0, 99, 100).unwrap(), 1);
        engine.get_page(&orders(), 1, 100, &all()).await.unwrap();
        engine.drain().await;

        assert_eq!(engine.stats().store_fetches, 1);
        assert_eq!(store.calls().fetch_page, 1);
    }

    #[tokio::test]
    async fn test_warm_cache_loads_first_pages() {
        let store = store();
        let engine = engine(&store);

        assert_eq!(engine.warm_cache(&orders(), 4).await, 4);
        for page in 1..=4 {
            assert!(engine.is_page_cached(&orders(), page, 50, &all()).unwrap());
        }
        assert!(!engine.is_page_cached(&orders(), 5, 50, &all()).unwrap());
    }

    #[tokio::test]
    async fn test_warm_cache_failures_are_logged_not_raised() {
        let store = store();
        store.set_failure(Some(StoreError::Unavailable("down".into())));
        let engine = engine(&store);
        assert_eq!(engine.warm_cache(&orders(), 3).await, 0);
    }
}

// =============================================================================
// Streaming
// =============================================================================

mod stream_tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_batches_and_terminates() {
        let store = store();
        let engine = engine(&store);

        let batches: Vec<Vec<Row>> = engine
            .stream_rows(&orders(), 1000, &all())
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);

        // Streams bypass the cache
        let stats = engine.stats();
        assert_eq!(stats.store_fetches, 0);
        assert_eq!(stats.memory_entries, 0);
    }

    #[tokio::test]
    async fn test_filtered_stream() {
        let store = store();
        let engine = engine(&store);
        let paid = QueryParams::new().filter(Filter::equals("status", "paid"));

        let total: usize = engine
            .stream_rows(&orders(), 100, &paid)
            .unwrap()
            .try_fold(0, |n, batch| async move { Ok(n + batch.len()) })
            .await
            .unwrap();
        assert_eq!(total, 834);
    }

    #[tokio::test]
    async fn test_cancelled_stream_stops() {
        let store = store();
        let engine = engine(&store);
        let ctx = RequestContext::new();
        ctx.cancel.cancel();

        let mut stream = engine.stream_rows_with(&orders(), 100, &all(), &ctx).unwrap();
        assert_matches!(stream.next().await, Some(Err(Error::Cancelled)));
        assert!(stream.next().await.is_none());
        assert_eq!(store.calls().stream_cursor, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_deadline_interrupts_in_flight_batch() {
        let store = store();
        store.set_latency(Duration::from_millis(100));
        let engine = engine(&store);
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(250));

        let mut stream = engine.stream_rows_with(&orders(), 100, &all(), &ctx).unwrap();
        let mut ok_rows = 0;
        let mut errors = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(batch) => ok_rows += batch.len(),
                Err(e) => errors.push(e),
            }
        }

        assert_eq!(ok_rows, 200);
        assert_eq!(errors.len(), 1);
        assert_matches!(errors[0], Error::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_reports_error() {
        let store = store();
        let engine = engine(&store);
        let token = CancellationToken::new();
        let ctx = RequestContext::new().with_cancel(token.clone());

        let mut stream = engine.stream_rows_with(&orders(), 100, &all(), &ctx).unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().len(), 100);
        token.cancel();
        assert_matches!(stream.next().await, Some(Err(Error::Cancelled)));
        assert!(stream.next().await.is_none());
        assert_eq!(store.calls().stream_cursor, 1);
    }
}
