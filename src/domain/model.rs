//! Domain Model
//!
//! Value objects shared by the compiler, the cache, and store adapters.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Identifiers
// =============================================================================

/// Dataset block identifier (value object).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BlockId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Column identifier (value object).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(pub String);

impl ColumnId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ColumnId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Row identifier. Cursor streaming orders rows by this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Schema
// =============================================================================

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Number,
    Boolean,
    Date,
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(id: impl Into<String>, name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            id: ColumnId::new(id),
            name: name.into(),
            column_type,
        }
    }
}

/// A logical dataset the cache paginates over. Owned by the backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetBlock {
    pub id: BlockId,
    pub columns: Vec<Column>,
    pub approx_row_count: u64,
}

impl DatasetBlock {
    pub fn new(id: impl Into<BlockId>, columns: Vec<Column>) -> Self {
        Self {
            id: id.into(),
            columns,
            approx_row_count: 0,
        }
    }

    /// Look up the type of a column.
    pub fn column_type(&self, column_id: &ColumnId) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|c| &c.id == column_id)
            .map(|c| c.column_type)
    }
}

// =============================================================================
// Cell Values
// =============================================================================

/// Typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Null,
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// True for `Null` and for blank text.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Canonical, type-tagged rendering used in cache keys.
    ///
    /// The tag keeps `Text("1")` and `Number(1.0)` apart.
    pub fn canonical(&self) -> String {
        match self {
            Value::Text(s) => format!("t:{}", s),
            Value::Number(n) => format!("n:{}", n),
            Value::Boolean(b) => format!("b:{}", b),
            Value::Date(d) => format!("d:{}", d.to_rfc3339()),
            Value::Null => "null".to_string(),
        }
    }

    /// Text rendering used for free-text search and `contains`.
    pub fn display_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.to_rfc3339(),
            Value::Null => String::new(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

// =============================================================================
// Rows
// =============================================================================

/// A single row. Never mutated inside the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    /// Ordering hint, not guaranteed contiguous
    pub position: i64,
    pub cells: BTreeMap<ColumnId, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Row {
    pub fn new(id: impl Into<RowId>, position: i64) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            position,
            cells: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style cell setter.
    pub fn with_cell(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cells.insert(ColumnId::new(column), value.into());
        self
    }

    /// Cell value, `Null` when absent.
    pub fn cell(&self, column: &ColumnId) -> &Value {
        const NULL: &Value = &Value::Null;
        self.cells.get(column).unwrap_or(NULL)
    }
}

impl From<String> for RowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Cell changes for one row in a batched update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowUpdate {
    pub row_id: RowId,
    pub cell_changes: BTreeMap<ColumnId, Value>,
}

impl RowUpdate {
    pub fn new(row_id: impl Into<RowId>) -> Self {
        Self {
            row_id: row_id.into(),
            cell_changes: BTreeMap::new(),
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.cell_changes.insert(ColumnId::new(column), value.into());
        self
    }
}

// =============================================================================
// Filters and Sorts
// =============================================================================

/// Filter comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    IsEmpty,
    IsNotEmpty,
}

impl FilterOperator {
    /// Wire name of the operator.
    pub fn name(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::Contains => "contains",
            FilterOperator::NotContains => "not_contains",
            FilterOperator::GreaterThan => "greater_than",
            FilterOperator::LessThan => "less_than",
            FilterOperator::IsEmpty => "is_empty",
            FilterOperator::IsNotEmpty => "is_not_empty",
        }
    }

    /// Whether the operator compares against a value.
    pub fn takes_value(&self) -> bool {
        !matches!(self, FilterOperator::IsEmpty | FilterOperator::IsNotEmpty)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterOperator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equals" => Ok(FilterOperator::Equals),
            "not_equals" => Ok(FilterOperator::NotEquals),
            "contains" => Ok(FilterOperator::Contains),
            "not_contains" => Ok(FilterOperator::NotContains),
            "greater_than" => Ok(FilterOperator::GreaterThan),
            "less_than" => Ok(FilterOperator::LessThan),
            "is_empty" => Ok(FilterOperator::IsEmpty),
            "is_not_empty" => Ok(FilterOperator::IsNotEmpty),
            other => Err(Error::InvalidFilter(format!(
                "unsupported operator '{}'",
                other
            ))),
        }
    }
}

/// Column filter. A set of filters is conjunctive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column_id: ColumnId,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Option<Value>,
}

impl Filter {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            column_id: ColumnId::new(column),
            operator,
            value: Some(value.into()),
        }
    }

    /// Filter for value-less operators (`is_empty`, `is_not_empty`).
    pub fn unary(column: impl Into<String>, operator: FilterOperator) -> Self {
        Self {
            column_id: ColumnId::new(column),
            operator,
            value: None,
        }
    }

    pub fn equals(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOperator::Equals, value)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn name(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

/// Sort key. The first sort in a list is the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub column_id: ColumnId,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column_id: ColumnId::new(column),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column_id: ColumnId::new(column),
            direction: SortDirection::Descending,
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// One page of rows plus pagination bookkeeping.
///
/// Invariants: `rows.len() <= page_size` and
/// `total_pages == ceil(total / page_size)`. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResult {
    pub rows: Vec<Row>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub has_more: bool,
}

impl PaginatedResult {
    /// Assemble a result, truncating `rows` to `page_size` if the store
    /// returned too many.
    pub fn new(mut rows: Vec<Row>, total: u64, page: u64, page_size: u64) -> Self {
        let page_size = page_size.max(1);
        rows.truncate(page_size as usize);
        let total_pages = total_pages(total, page_size);
        Self {
            rows,
            total,
            page,
            page_size,
            total_pages,
            has_more: page < total_pages,
        }
    }
}

/// `ceil(total / page_size)`; zero page size counts as one.
pub fn total_pages(total: u64, page_size: u64) -> u64 {
    total.div_ceil(page_size.max(1))
}

/// Arbitrary rank range for virtualized scrolling.
///
/// `start_index` and `end_index` are 0-based and inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub rows: Vec<Row>,
    pub total: u64,
    pub start_index: u64,
    pub end_index: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_round_trip_names() {
        for op in [
            FilterOperator::Equals,
            FilterOperator::NotEquals,
            FilterOperator::Contains,
            FilterOperator::NotContains,
            FilterOperator::GreaterThan,
            FilterOperator::LessThan,
            FilterOperator::IsEmpty,
            FilterOperator::IsNotEmpty,
        ] {
            assert_eq!(op.name().parse::<FilterOperator>().unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = "starts_with".parse::<FilterOperator>().unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
    }

    #[test]
    fn test_paginated_result_math() {
        let result = PaginatedResult::new(vec![], 2500, 3, 100);
        assert_eq!(result.total_pages, 25);
        assert!(result.has_more);

        let last = PaginatedResult::new(vec![], 2500, 25, 100);
        assert!(!last.has_more);

        let empty = PaginatedResult::new(vec![], 0, 1, 100);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_more);

        let partial = PaginatedResult::new(vec![], 101, 1, 100);
        assert_eq!(partial.total_pages, 2);
    }

    #[test]
    fn test_paginated_result_truncates_rows() {
        let rows = (0..5).map(|i| Row::new(format!("r{}", i), i)).collect();
        let result = PaginatedResult::new(rows, 5, 1, 3);
        assert_eq!(result.rows.len(), 3);
    }

    #[test]
    fn test_value_canonical_is_type_tagged() {
        assert_ne!(Value::text("1").canonical(), Value::Number(1.0).canonical());
        assert_eq!(Value::Boolean(true).canonical(), "b:true");
        assert_eq!(Value::Null.canonical(), "null");
    }

    #[test]
    fn test_value_serde_shape() {
        let json = serde_json::to_string(&Value::text("paid")).unwrap();
        assert_eq!(json, r#"{"type":"text","value":"paid"}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::text("paid"));
    }

    #[test]
    fn test_row_cell_defaults_to_null() {
        let row = Row::new("r1", 0).with_cell("status", "paid");
        assert_eq!(row.cell(&ColumnId::new("status")), &Value::text("paid"));
        assert_eq!(row.cell(&ColumnId::new("missing")), &Value::Null);
    }

    #[test]
    fn test_block_column_type_lookup() {
        let block = DatasetBlock::new(
            "orders",
            vec![
                Column::new("amount", "Amount", ColumnType::Number),
                Column::new("placed", "Placed", ColumnType::Date),
            ],
        );
        assert_eq!(
            block.column_type(&ColumnId::new("amount")),
            Some(ColumnType::Number)
        );
        assert_eq!(block.column_type(&ColumnId::new("nope")), None);
    }
}
