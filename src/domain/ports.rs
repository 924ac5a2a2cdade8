//! Domain Ports (Port/Adapter Pattern)
//!
//! Abstractions the cache and pagination engine depend on. Infrastructure
//! adapters implement these traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Engine Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │          BackingStore       │      SharedCache       │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │   InMemoryStore │ SQL store │ InMemorySharedCache   │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::model::{BlockId, Row, RowId, RowUpdate};
use crate::error::StoreError;
use crate::query::QuerySpec;

/// Result type for store adapter calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// =============================================================================
// Backing Store Port
// =============================================================================

/// Port for the relational store that owns rows.
///
/// Every method is a suspension point. Adapters own timeouts and retries;
/// dropping a returned future must abandon the underlying query.
///
/// # Example
///
/// ```ignore
/// struct PostgresStore { pool: PgPool }
///
/// #[async_trait]
/// impl BackingStore for PostgresStore {
///     async fn count(&self, block: &BlockId, spec: &QuerySpec) -> StoreResult<u64> {
///         // SELECT count(*) ... with spec bound as parameters
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Number of rows matching the spec.
    async fn count(&self, block: &BlockId, spec: &QuerySpec) -> StoreResult<u64>;

    /// Offset/limit page in the spec's sort order.
    async fn fetch_page(
        &self,
        block: &BlockId,
        spec: &QuerySpec,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<Row>>;

    /// Rows with id strictly greater than `after`, ordered by id, at most
    /// `batch_size` of them.
    async fn stream_cursor(
        &self,
        block: &BlockId,
        spec: &QuerySpec,
        after: Option<&RowId>,
        batch_size: u64,
    ) -> StoreResult<Vec<Row>>;

    /// Rows whose 1-based rank in the spec's sort order lies in
    /// `start_rank..=end_rank`.
    async fn ranked_window(
        &self,
        block: &BlockId,
        spec: &QuerySpec,
        start_rank: u64,
        end_rank: u64,
    ) -> StoreResult<Vec<Row>>;

    /// Apply cell changes atomically across the whole batch.
    async fn batch_update(&self, block: &BlockId, updates: Vec<RowUpdate>) -> StoreResult<()>;
}

// =============================================================================
// Shared Cache Port
// =============================================================================

/// Port for the shared (L2) cache reachable by several processes.
///
/// Values are opaque bytes. Expiry is enforced by the backend.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Fetch a value if present and not expired.
    async fn get(&self, key: &str) -> crate::error::Result<Option<Bytes>>;

    /// Store a value with a time-to-live.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> crate::error::Result<()>;

    /// Delete every key matching a glob pattern (`prefix*`). Returns the
    /// number of keys removed.
    async fn delete_pattern(&self, pattern: &str) -> crate::error::Result<u64>;

    /// Remove every key.
    async fn clear(&self) -> crate::error::Result<()>;
}
