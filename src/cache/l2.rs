//! L2 Cache - Shared Tier
//!
//! Wraps a [`SharedCache`] backend reachable by several processes. Payloads
//! travel inside a JSON envelope stamped with the write time, then framed by
//! the compression manager:
//!
//! ```text
//! ┌─────┬──────────────────────────────────────────────┐
//! │ tag │ lz4( {"cached_at": .., "payload": {..}} )    │
//! └─────┴──────────────────────────────────────────────┘
//! ```
//!
//! The envelope lets a reader recover the entry's age, so a page promoted
//! from L2 into L1 does not look younger than it is.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use super::compression::{CompressionConfig, CompressionManager};
use super::entry::{CachePayload, Freshness};
use crate::domain::SharedCache;
use crate::error::Result;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    cached_at: DateTime<Utc>,
    payload: &'a RawValue,
}

#[derive(Deserialize)]
struct Envelope<'a> {
    cached_at: DateTime<Utc>,
    #[serde(borrow)]
    payload: &'a RawValue,
}

/// Entry read back from the shared tier
#[derive(Debug)]
pub struct SharedHit {
    pub payload: CachePayload,
    /// Serialized payload length, matching the size L1 accounts for
    pub size_bytes: u64,
    /// Time since the original write
    pub age: Duration,
}

/// Shared tier over a pluggable backend
pub struct SharedTier {
    backend: Arc<dyn SharedCache>,
    compression: CompressionManager,
}

impl SharedTier {
    pub fn new(backend: Arc<dyn SharedCache>, compression: CompressionConfig) -> Self {
        Self {
            backend,
            compression: CompressionManager::with_config(compression),
        }
    }

    /// Wrap already-serialized payload JSON into a stored frame.
    pub fn encode(&self, payload_json: &str, cached_at: DateTime<Utc>) -> Result<Bytes> {
        let payload: &RawValue = serde_json::from_str(payload_json)?;
        let envelope = serde_json::to_vec(&EnvelopeRef { cached_at, payload })?;
        Ok(self.compression.encode_frame(&envelope))
    }

    /// Decode a stored frame, measuring age against `now`.
    pub fn decode(&self, frame: &[u8], now: DateTime<Utc>) -> Result<SharedHit> {
        let raw = self.compression.decode_frame(frame)?;
        let envelope: Envelope<'_> = serde_json::from_slice(&raw)?;
        let payload: CachePayload = serde_json::from_str(envelope.payload.get())?;
        let age = (now - envelope.cached_at).to_std().unwrap_or(Duration::ZERO);
        Ok(SharedHit {
            payload,
            size_bytes: envelope.payload.get().len() as u64,
            age,
        })
    }

    /// Read a live entry. Entries at or past `ttl` are reported as absent.
    pub async fn get(&self, key: &str, ttl: Duration) -> Result<Option<SharedHit>> {
        let Some(frame) = self.backend.get(key).await? else {
            return Ok(None);
        };
        let hit = self.decode(&frame, Utc::now())?;
        if Freshness::classify(hit.age, ttl) == Freshness::Expired {
            return Ok(None);
        }
        Ok(Some(hit))
    }

    /// Store a frame produced by [`encode`](Self::encode).
    pub async fn put(&self, key: &str, frame: Bytes, ttl: Duration) -> Result<()> {
        self.backend.set(key, frame, ttl).await
    }

    /// Delete every key under `prefix`.
    pub async fn invalidate_prefix(&self, prefix: &str) -> Result<u64> {
        self.backend.delete_pattern(&format!("{}*", prefix)).await
    }

    /// Remove every key.
    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }
}

// =============================================================================
// Tests
// =============================================================================
