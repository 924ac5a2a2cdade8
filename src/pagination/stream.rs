//! Cursor Streaming
//!
//! Full scans bypass the cache and walk the block by row id:
//! each batch asks the store for rows with `id > last_seen`. The stream is
//! lazy (nothing runs until polled), forward-only, and finite.
//!
//! Under a [`RequestContext`] every batch fetch is raced against the
//! token and deadline; the stream yields `Cancelled` or `DeadlineExceeded`
//! once and ends.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use crate::domain::{BackingStore, BlockId, Row, RowId};
use crate::error::{Error, Result};
use crate::query::QuerySpec;

use super::context::RequestContext;

/// Stream of row batches
pub type RowStream = BoxStream<'static, Result<Vec<Row>>>;

struct Cursor {
    store: Arc<dyn BackingStore>,
    block: BlockId,
    spec: QuerySpec,
    batch_size: u64,
    after: Option<RowId>,
    exhausted: bool,
    ctx: RequestContext,
}

/// Build a cursor stream. Ends after a short batch or an empty response;
/// an error is yielded once and ends the stream.
pub fn cursor_stream(
    store: Arc<dyn BackingStore>,
    block: BlockId,
    spec: QuerySpec,
    batch_size: u64,
) -> RowStream {
    cursor_stream_with(store, block, spec, batch_size, RequestContext::new())
}

/// [`cursor_stream`] whose batch fetches stop when `ctx` fires
pub fn cursor_stream_with(
    store: Arc<dyn BackingStore>,
    block: BlockId,
    spec: QuerySpec,
    batch_size: u64,
    ctx: RequestContext,
) -> RowStream {
    let cursor = Cursor {
        store,
        block,
        spec,
        batch_size: batch_size.max(1),
        after: None,
        exhausted: false,
        ctx,
    };

    stream::try_unfold(cursor, |mut cursor| async move {
        if cursor.exhausted {
            return Ok::<_, Error>(None);
        }

        let fetch = async {
            cursor
                .store
                .stream_cursor(
                    &cursor.block,
                    &cursor.spec,
                    cursor.after.as_ref(),
                    cursor.batch_size,
                )
                .await
                .map_err(|e| Error::store(cursor.block.as_str(), e))
        };
        let rows = cursor.ctx.guard(fetch).await?;

        if rows.is_empty() {
            return Ok(None);
        }

        cursor.exhausted = (rows.len() as u64) < cursor.batch_size;
        cursor.after = rows.last().map(|row| row.id.clone());
        debug!(
            "Streamed {} rows from {} (exhausted={})",
            rows.len(),
            cursor.block,
            cursor.exhausted
        );
        Ok(Some((rows, cursor)))
    })
    .boxed()
}

// =============================================================================
// Tests
// =============================================================================
