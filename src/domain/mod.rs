//! Domain Layer
//!
//! # Architecture
//!
//! - **Model** (`model.rs`) - Blocks, rows, typed values, filters, sorts, results
//! - **Ports** (`ports.rs`) - Trait abstractions for the backing store and shared cache

pub mod model;
pub mod ports;

mod proptest;

pub use model::{
    total_pages, BlockId, Column, ColumnId, ColumnType, DatasetBlock, Filter, FilterOperator,
    PaginatedResult, Row, RowId, RowUpdate, Sort, SortDirection, Value, WindowResult,
};
pub use ports::{BackingStore, SharedCache, StoreResult};
