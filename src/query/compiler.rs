//! Predicate Compiler
//!
//! Turns caller filters, sorts, and a search term into a structured
//! [`QuerySpec`] for the store adapter and a canonical [`CacheKey`].
//!
//! Key layout:
//!
//! ```text
//! {namespace}:{block}:{scope}:f={filters}:s={sorts}:q={search}
//! ```
//!
//! Every user-supplied segment is percent-encoded, so the `:`, `,` and `|`
//! separators can only come from the compiler itself. Sorts render as
//! `column|direction|kind`; a filter carries its kind only when the column
//! has a type hint.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cache::CacheKey;
use crate::domain::{
    BlockId, ColumnId, ColumnType, Filter, FilterOperator, Sort, SortDirection, Value,
};
use crate::error::{Error, Result};

/// Known column types for a block, used as sort/filter type hints.
pub type ColumnHints = HashMap<ColumnId, ColumnType>;

// =============================================================================
// Inputs
// =============================================================================

/// Filters, sorts, and search shared by page, window, and stream requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sorts: Vec<Sort>,
    #[serde(default)]
    pub search: Option<String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sorts.push(sort);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }
}

/// What a key addresses within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    /// 1-based page of a given size
    Page { page: u64, page_size: u64 },
    /// 0-based inclusive row index range
    Window { start: u64, end: u64 },
    /// Full cursor scan (never cached, keyed for logging only)
    Stream,
}

impl KeyScope {
    fn segment(&self) -> String {
        match self {
            KeyScope::Page { page, page_size } => format!("p{}x{}", page, page_size),
            KeyScope::Window { start, end } => format!("w{}-{}", start, end),
            KeyScope::Stream => "stream".to_string(),
        }
    }
}

// =============================================================================
// Outputs
// =============================================================================

/// How the store should order a sort column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKind {
    /// Column type unknown; order by the value variants present
    Natural,
    Lexical,
    Numeric,
    Temporal,
    Boolean,
}

impl SortKind {
    /// Short tag used in cache keys
    pub fn name(&self) -> &'static str {
        match self {
            SortKind::Natural => "nat",
            SortKind::Lexical => "lex",
            SortKind::Numeric => "num",
            SortKind::Temporal => "time",
            SortKind::Boolean => "bool",
        }
    }
}

impl From<ColumnType> for SortKind {
    fn from(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Text => SortKind::Lexical,
            ColumnType::Number => SortKind::Numeric,
            ColumnType::Date => SortKind::Temporal,
            ColumnType::Boolean => SortKind::Boolean,
        }
    }
}

/// A validated filter. Values are bound as parameters, never spliced into text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub column_id: ColumnId,
    pub operator: FilterOperator,
    pub value: Option<Value>,
    pub type_hint: Option<ColumnType>,
}

/// A validated sort term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column_id: ColumnId,
    pub direction: SortDirection,
    pub kind: SortKind,
}

/// Structured, store-agnostic query specification.
///
/// Predicates are in canonical order with exact duplicates removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub filters: Vec<Predicate>,
    pub sorts: Vec<OrderBy>,
    pub search: Option<String>,
}

/// Store spec plus the cache key it maps to.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub spec: QuerySpec,
    pub key: CacheKey,
}

// =============================================================================
// Compiler
// =============================================================================

/// Pure compiler from request parameters to `(QuerySpec, CacheKey)`.
#[derive(Debug, Clone, Copy)]
pub struct PredicateCompiler<'a> {
    namespace: &'a str,
    hints: Option<&'a ColumnHints>,
}

impl<'a> PredicateCompiler<'a> {
    /// Compiler with no column type hints.
    pub fn new(namespace: &'a str) -> Self {
        Self {
            namespace,
            hints: None,
        }
    }

    /// Attach column type hints for sort and filter compilation.
    pub fn with_hints(mut self, hints: &'a ColumnHints) -> Self {
        self.hints = Some(hints);
        self
    }

    /// Compile the store spec and the cache key for `scope`.
    pub fn compile(
        &self,
        block_id: &BlockId,
        params: &QueryParams,
        scope: KeyScope,
    ) -> Result<CompiledQuery> {
        let spec = self.compile_spec(params)?;
        let key = self.cache_key(block_id, &spec, scope);
        Ok(CompiledQuery { spec, key })
    }

    /// Compile only the store spec.
    pub fn compile_spec(&self, params: &QueryParams) -> Result<QuerySpec> {
        let mut filters = params
            .filters
            .iter()
            .map(|f| self.compile_filter(f))
            .collect::<Result<Vec<_>>>()?;
        filters.sort_by_cached_key(canonical_filter);
        filters.dedup_by(|a, b| canonical_filter(a) == canonical_filter(b));

        let sorts = params
            .sorts
            .iter()
            .map(|s| self.compile_sort(s))
            .collect::<Result<Vec<_>>>()?;

        let search = params
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(QuerySpec {
            filters,
            sorts,
            search,
        })
    }

    /// Prefix shared by every key of a block.
    pub fn block_prefix(&self, block_id: &BlockId) -> String {
        block_prefix(self.namespace, block_id)
    }

    fn cache_key(&self, block_id: &BlockId, spec: &QuerySpec, scope: KeyScope) -> CacheKey {
        let filters = spec
            .filters
            .iter()
            .map(canonical_filter)
            .collect::<Vec<_>>()
            .join(",");
        let sorts = spec
            .sorts
            .iter()
            .map(|s| {
                format!(
                    "{}|{}|{}",
                    encode(s.column_id.as_str()),
                    s.direction.name(),
                    s.kind.name()
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        let search = spec.search.as_deref().map(encode).unwrap_or_default();

        let key = format!(
            "{}{}:f={}:s={}:q={}",
            self.block_prefix(block_id),
            scope.segment(),
            filters,
            sorts,
            search
        );
        CacheKey::from_parts(block_id.clone(), key)
    }

    fn type_hint(&self, column_id: &ColumnId) -> Option<ColumnType> {
        self.hints.and_then(|h| h.get(column_id).copied())
    }

    fn compile_filter(&self, filter: &Filter) -> Result<Predicate> {
        let column = filter.column_id.as_str();
        if column.trim().is_empty() {
            return Err(Error::InvalidFilter("filter column id is empty".into()));
        }

        let op = filter.operator;
        let value = if op.takes_value() {
            let value = filter.value.clone().ok_or_else(|| {
                Error::InvalidFilter(format!("operator '{}' on '{}' requires a value", op, column))
            })?;
            validate_operand(column, op, &value)?;
            Some(value)
        } else {
            None
        };

        Ok(Predicate {
            column_id: filter.column_id.clone(),
            operator: op,
            value,
            type_hint: self.type_hint(&filter.column_id),
        })
    }

    fn compile_sort(&self, sort: &Sort) -> Result<OrderBy> {
        if sort.column_id.as_str().trim().is_empty() {
            return Err(Error::InvalidFilter("sort column id is empty".into()));
        }
        let kind = self
            .type_hint(&sort.column_id)
            .map(SortKind::from)
            .unwrap_or(SortKind::Natural);
        Ok(OrderBy {
            column_id: sort.column_id.clone(),
            direction: sort.direction,
            kind,
        })
    }
}

/// Prefix shared by every key of a block under a namespace.
pub fn block_prefix(namespace: &str, block_id: &BlockId) -> String {
    format!("{}:{}:", namespace, encode(block_id.as_str()))
}

fn validate_operand(column: &str, op: FilterOperator, value: &Value) -> Result<()> {
    let ok = match op {
        FilterOperator::Contains | FilterOperator::NotContains => matches!(value, Value::Text(_)),
        FilterOperator::GreaterThan | FilterOperator::LessThan => matches!(
            value,
            Value::Number(_) | Value::Date(_) | Value::Text(_)
        ),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidFilter(format!(
            "operator '{}' on '{}' cannot take value {}",
            op,
            column,
            value.canonical()
        )))
    }
}

fn canonical_filter(p: &Predicate) -> String {
    let value = p
        .value
        .as_ref()
        .map(|v| encode(&v.canonical()))
        .unwrap_or_default();
    let column = encode(p.column_id.as_str());
    match p.type_hint {
        Some(hint) => format!(
            "{}|{}|{}|{}",
            column,
            p.operator.name(),
            value,
            SortKind::from(hint).name()
        ),
        None => format!("{}|{}|{}", column, p.operator.name(), value),
    }
}

fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

// =============================================================================
// Tests
// =============================================================================
