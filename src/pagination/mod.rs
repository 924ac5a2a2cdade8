//! Pagination Layer
//!
//! # Architecture
//!
//! - **Engine** (`engine.rs`) - Page and window requests, miss path, invalidation
//! - **Context** (`context.rs`) - Cancellation token and deadline per request
//! - **In-flight** (`inflight.rs`) - Single-flight coalescing of concurrent misses
//! - **Revalidate** (`revalidate.rs`) - Stale-while-revalidate refresh
//! - **Prefetch** (`prefetch.rs`) - Scroll-ahead prefetch and cold-start warming
//! - **Stream** (`stream.rs`) - Cursor-based full scans

mod context;
mod engine;
mod inflight;
mod prefetch;
mod revalidate;
mod stream;

pub use context::RequestContext;
pub use engine::{PaginationConfig, PaginationEngine, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use inflight::{FetchOutput, InFlight, Join, SharedFetch};
pub use prefetch::covering_pages;
pub use stream::{cursor_stream, cursor_stream_with, RowStream};
