//! In-Memory Backing Store
//!
//! Reference implementation of the `BackingStore` port. Blocks are plain
//! row vectors; every query filters, sorts, and slices a snapshot.
//!
//! Intended for tests and the demo binary. Besides the port it offers call
//! counters, artificial latency, and failure injection.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};

use crate::domain::ports::{BackingStore, StoreResult};
use crate::domain::{BlockId, FilterOperator, Row, RowId, RowUpdate, SortDirection, Value};
use crate::error::StoreError;
use crate::query::{OrderBy, Predicate, QuerySpec, SortKind};

/// Snapshot of adapter call counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub count: u64,
    pub fetch_page: u64,
    pub stream_cursor: u64,
    pub ranked_window: u64,
    pub batch_update: u64,
}

impl StoreCalls {
    /// Calls that read rows or counts
    pub fn reads(&self) -> u64 {
        self.count + self.fetch_page + self.stream_cursor + self.ranked_window
    }
}

#[derive(Debug, Default)]
struct CallCounters {
    count: AtomicU64,
    fetch_page: AtomicU64,
    stream_cursor: AtomicU64,
    ranked_window: AtomicU64,
    batch_update: AtomicU64,
}

impl CallCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn snapshot(&self) -> StoreCalls {
        StoreCalls {
            count: self.count.load(AtomicOrdering::Relaxed),
            fetch_page: self.fetch_page.load(AtomicOrdering::Relaxed),
            stream_cursor: self.stream_cursor.load(AtomicOrdering::Relaxed),
            ranked_window: self.ranked_window.load(AtomicOrdering::Relaxed),
            batch_update: self.batch_update.load(AtomicOrdering::Relaxed),
        }
    }
}

/// In-memory backing store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    blocks: RwLock<HashMap<BlockId, Vec<Row>>>,
    latency: Mutex<Duration>,
    failure: Mutex<Option<StoreError>>,
    calls: CallCounters,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rows of a block
    pub fn insert_block(&self, block: impl Into<BlockId>, rows: Vec<Row>) {
        self.blocks.write().insert(block.into(), rows);
    }

    /// Builder-style [`insert_block`](Self::insert_block)
    pub fn with_block(self, block: impl Into<BlockId>, rows: Vec<Row>) -> Self {
        self.insert_block(block, rows);
        self
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Make every call fail with `error` until cleared with `None`
    pub fn set_failure(&self, error: Option<StoreError>) {
        *self.failure.lock() = error;
    }

    /// Call counts so far
    pub fn calls(&self) -> StoreCalls {
        self.calls.snapshot()
    }

    /// Row by id, if present
    pub fn row(&self, block: &BlockId, id: &RowId) -> Option<Row> {
        self.blocks
            .read()
            .get(block)
            .and_then(|rows| rows.iter().find(|r| &r.id == id).cloned())
    }

    async fn enter(&self, counter: &AtomicU64) -> StoreResult<()> {
        CallCounters::bump(counter);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.failure.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Matching rows in the spec's sort order
    fn query(&self, block: &BlockId, spec: &QuerySpec) -> StoreResult<Vec<Row>> {
        let blocks = self.blocks.read();
        let rows = blocks
            .get(block)
            .ok_or_else(|| StoreError::Rejected(format!("unknown block '{}'", block)))?;

        let search = spec.search.as_ref().map(|s| s.to_lowercase());
        let mut matched: Vec<Row> = rows
            .iter()
            .filter(|row| spec.filters.iter().all(|p| matches_predicate(row, p)))
            .filter(|row| search.as_deref().map_or(true, |s| matches_search(row, s)))
            .cloned()
            .collect();

        matched.sort_by(|a, b| compare_rows(a, b, &spec.sorts));
        Ok(matched)
    }
}

#[async_trait]
impl BackingStore for InMemoryStore {
    async fn count(&self, block: &BlockId, spec: &QuerySpec) -> StoreResult<u64> {
        self.enter(&self.calls.count).await?;
        Ok(self.query(block, spec)?.len() as u64)
    }

    async fn fetch_page(
        &self,
        block: &BlockId,
        spec: &QuerySpec,
        offset: u64,
        limit: u64,
    ) -> StoreResult<Vec<Row>> {
        self.enter(&self.calls.fetch_page).await?;
        Ok(self
            .query(block, spec)?
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn stream_cursor(
        &self,
        block: &BlockId,
        spec: &QuerySpec,
        after: Option<&RowId>,
        batch_size: u64,
    ) -> StoreResult<Vec<Row>> {
        self.enter(&self.calls.stream_cursor).await?;
        let mut rows = self.query(block, spec)?;
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows
            .into_iter()
            .filter(|r| after.map_or(true, |after| &r.id > after))
            .take(batch_size as usize)
            .collect())
    }

    async fn ranked_window(
        &self,
        block: &BlockId,
        spec: &QuerySpec,
        start_rank: u64,
        end_rank: u64,
    ) -> StoreResult<Vec<Row>> {
        self.enter(&self.calls.ranked_window).await?;
        if start_rank == 0 || end_rank < start_rank {
            return Ok(Vec::new());
        }
        Ok(self
            .query(block, spec)?
            .into_iter()
            .skip((start_rank - 1) as usize)
            .take((end_rank - start_rank).saturating_add(1) as usize)
            .collect())
    }

    async fn batch_update(&self, block: &BlockId, updates: Vec<RowUpdate>) -> StoreResult<()> {
        self.enter(&self.calls.batch_update).await?;
        let mut blocks = self.blocks.write();
        let rows = blocks
            .get_mut(block)
            .ok_or_else(|| StoreError::Rejected(format!("unknown block '{}'", block)))?;

        let index: HashMap<RowId, usize> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        // Validate the whole batch before touching any row
        let targets = updates
            .iter()
            .map(|u| {
                index
                    .get(&u.row_id)
                    .copied()
                    .ok_or_else(|| StoreError::Rejected(format!("unknown row '{}'", u.row_id)))
            })
            .collect::<StoreResult<Vec<usize>>>()?;

        let now = Utc::now();
        for (update, i) in updates.into_iter().zip(targets) {
            let row = &mut rows[i];
            row.cells.extend(update.cell_changes);
            row.updated_at = now;
        }
        Ok(())
    }
}

// =============================================================================
// Evaluation
// =============================================================================

fn matches_search(row: &Row, needle: &str) -> bool {
    row.cells
        .values()
        .any(|v| v.display_text().to_lowercase().contains(needle))
}

fn matches_predicate(row: &Row, predicate: &Predicate) -> bool {
    let cell = row.cell(&predicate.column_id);
    let operand = predicate.value.as_ref().unwrap_or(&Value::Null);
    match predicate.operator {
        FilterOperator::Equals => values_equal(cell, operand),
        FilterOperator::NotEquals => !values_equal(cell, operand),
        FilterOperator::Contains => contains_text(cell, operand),
        FilterOperator::NotContains => !contains_text(cell, operand),
        FilterOperator::GreaterThan => compare_operand(cell, operand) == Some(Ordering::Greater),
        FilterOperator::LessThan => compare_operand(cell, operand) == Some(Ordering::Less),
        FilterOperator::IsEmpty => cell.is_empty(),
        FilterOperator::IsNotEmpty => !cell.is_empty(),
    }
}

fn values_equal(cell: &Value, operand: &Value) -> bool {
    match (cell, operand) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Text(a), Value::Text(b)) => a.eq_ignore_ascii_case(b),
        _ => cell == operand,
    }
}

fn contains_text(cell: &Value, operand: &Value) -> bool {
    let needle = operand.display_text().to_lowercase();
    cell.display_text().to_lowercase().contains(&needle)
}

/// Ordering of a cell against a filter operand; `None` when incomparable
fn compare_operand(cell: &Value, operand: &Value) -> Option<Ordering> {
    match (cell, operand) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Text(a), Value::Number(b)) => a.trim().parse::<f64>().ok()?.partial_cmp(b),
        _ => None,
    }
}

fn compare_rows(a: &Row, b: &Row, sorts: &[OrderBy]) -> Ordering {
    sorts
        .iter()
        .map(|s| {
            let ord = compare_values(a.cell(&s.column_id), b.cell(&s.column_id), s.kind);
            match s.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        })
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)))
}

/// Missing or unconvertible values sort after present ones
fn none_last<T>(a: Option<T>, b: Option<T>, cmp: impl FnOnce(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp(&a, &b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_values(a: &Value, b: &Value, kind: SortKind) -> Ordering {
    match kind {
        SortKind::Numeric => none_last(as_number(a), as_number(b), |x, y| x.total_cmp(y)),
        SortKind::Temporal => none_last(as_date(a), as_date(b), Ord::cmp),
        SortKind::Boolean => none_last(as_bool(a), as_bool(b), Ord::cmp),
        SortKind::Lexical => none_last(as_text(a), as_text(b), |x, y| {
            x.to_lowercase().cmp(&y.to_lowercase()).then_with(|| x.cmp(y))
        }),
        SortKind::Natural => variant_rank(a).cmp(&variant_rank(b)).then_with(|| match (a, b) {
            (Value::Number(x), Value::Number(y)) => x.total_cmp(y),
            (Value::Date(x), Value::Date(y)) => x.cmp(y),
            (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
            (Value::Text(x), Value::Text(y)) => x.cmp(y),
            _ => Ordering::Equal,
        }),
    }
}

fn variant_rank(v: &Value) -> u8 {
    match v {
        Value::Boolean(_) => 0,
        Value::Number(_) => 1,
        Value::Date(_) => 2,
        Value::Text(_) => 3,
        Value::Null => 4,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => Some(*n),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_date(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Date(d) => Some(*d),
        Value::Text(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        _ => None,
    }
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Boolean(b) => Some(*b),
        _ => None,
    }
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        other => Some(other.display_text()),
    }
}

// =============================================================================
// Sample Data
// =============================================================================

const CUSTOMERS: [&str; 7] = ["Acme", "Globex", "Initech", "Umbrella", "Hooli", "Stark", "Wayne"];
const STATUSES: [&str; 3] = ["paid", "pending", "refunded"];

/// Deterministic order rows with ids `row-00000001..`
///
/// Columns: `customer` (text), `amount` (number), `status` (text),
/// `priority` (boolean), `ordered_at` (date).
pub fn sample_rows(count: usize) -> Vec<Row> {
    let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
    (0..count)
        .map(|i| {
            let n = i + 1;
            Row::new(format!("row-{:08}", n), n as i64)
                .with_cell("customer", CUSTOMERS[i % CUSTOMERS.len()])
                .with_cell("amount", ((i * 37) % 1000) as i64)
                .with_cell("status", STATUSES[i % STATUSES.len()])
                .with_cell("priority", i % 5 == 0)
                .with_cell("ordered_at", epoch + chrono::Duration::hours(i as i64))
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
