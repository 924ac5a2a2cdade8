//! gridcache - Tiered Cache & Windowed Pagination for Virtualized Grids
//!
//! Serves pages, arbitrary row windows, and cursor streams of large tabular
//! datasets ("blocks") on top of a slow backing store, with a two-tier
//! cache in front of it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       PaginationEngine                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  Predicate   │───▶│ TieredCache  │───▶│ BackingStore │       │
//! │  │  Compiler    │    │  (L1 ─ L2)   │    │   (port)     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! │         ▲                   ▲                                    │
//! │   filters/sorts      SWR refresh, prefetch, coalescing           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - In-memory store and shared-cache implementations of the ports
//! - [`cache`] - Sharded L1, shared L2 tier, compression, counters
//! - [`config`] - YAML-loadable engine configuration
//! - [`domain`] - Blocks, rows, typed values, and the port traits
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus exposition of engine statistics
//! - [`pagination`] - Pages, windows, streams, revalidation, prefetch
//! - [`query`] - Filter/sort compilation and cache key derivation

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod pagination;
pub mod query;

// Re-export commonly used types
pub use cache::{CacheConfig, Stats};
pub use config::EngineConfig;
pub use domain::{
    BackingStore, BlockId, Column, ColumnId, ColumnType, DatasetBlock, Filter, FilterOperator,
    PaginatedResult, Row, RowId, RowUpdate, SharedCache, Sort, SortDirection, Value, WindowResult,
};
pub use error::{Error, Result, StoreError};
pub use metrics::StatsExporter;
pub use pagination::{PaginationConfig, PaginationEngine, RequestContext, RowStream};
pub use query::QueryParams;
