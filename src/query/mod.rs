//! Query Compilation
//!
//! Filters, sorts, and search terms are compiled into a structured
//! [`QuerySpec`] consumed by store adapters, together with the canonical
//! cache key for the request. Callers must never build cache keys any other
//! way.

mod compiler;
mod proptest;

pub use compiler::{
    block_prefix, ColumnHints, CompiledQuery, KeyScope, OrderBy, Predicate, PredicateCompiler,
    QueryParams, QuerySpec, SortKind,
};
