//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │           BackingStore        │        SharedCache          │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │        InMemoryStore         │    InMemorySharedCache      │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use gridcache::adapters::{sample_rows, InMemorySharedCache, InMemoryStore};
//! use gridcache::{EngineConfig, PaginationEngine};
//!
//! let store = Arc::new(InMemoryStore::new().with_block("orders", sample_rows(100)));
//! let shared = Arc::new(InMemorySharedCache::new());
//! let engine = PaginationEngine::with_shared(store, shared, EngineConfig::default());
//! # let _ = engine;
//! ```

mod memory_store;
mod shared_memory;

pub use memory_store::{sample_rows, InMemoryStore, StoreCalls};
pub use shared_memory::InMemorySharedCache;
