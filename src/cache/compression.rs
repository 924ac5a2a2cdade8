//! Shared-Tier Payload Compression
//!
//! LZ4 with automatic fallback to raw bytes. Compressed frames carry a
//! one-byte algorithm tag so readers never need out-of-band metadata.
//!
//! # Example
//!
//! ```
//! use gridcache::cache::compression::CompressionManager;
//!
//! let manager = CompressionManager::new();
//!
//! let data = b"Hello, this is test data that should compress well!";
//! let frame = manager.encode_frame(data);
//!
//! let decoded = manager.decode_frame(&frame).unwrap();
//! assert_eq!(decoded.as_ref(), data);
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::Deserialize;

use crate::error::{Error, Result};

// =============================================================================
// Compression Algorithm
// =============================================================================

/// Supported compression algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionAlgorithm {
    /// No compression
    None,
    /// LZ4 - fast compression
    #[default]
    Lz4,
}

impl CompressionAlgorithm {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::Lz4 => 1,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CompressionAlgorithm::None),
            1 => Some(CompressionAlgorithm::Lz4),
            _ => None,
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Compression Configuration
// =============================================================================

/// Configuration for compression
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Default algorithm to use
    pub algorithm: CompressionAlgorithm,
    /// Minimum size to compress (smaller payloads are stored raw)
    pub min_size_bytes: u64,
    /// LZ4 high-compression level
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Lz4,
            min_size_bytes: 1024,
            level: 4,
        }
    }
}

// =============================================================================
// Compressors
// =============================================================================

/// Trait for compression implementations
pub trait Compressor: Send + Sync {
    /// Get the algorithm identifier
    fn algorithm(&self) -> CompressionAlgorithm;

    /// Compress data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Pass-through compressor
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::None
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// LZ4 compressor
pub struct Lz4Compressor {
    level: i32,
}

impl Lz4Compressor {
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self { level: 4 }
    }
}

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level)),
            true,
        )
        .map_err(|e| Error::CompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::decompress(data, None).map_err(|e| Error::DecompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// Compression Manager
// =============================================================================

/// Frames payloads for the shared tier
pub struct CompressionManager {
    config: CompressionConfig,
    noop: NoopCompressor,
    lz4: Lz4Compressor,
}

impl CompressionManager {
    /// Create a new compression manager with default config
    pub fn new() -> Self {
        Self::with_config(CompressionConfig::default())
    }

    /// Create with custom config
    pub fn with_config(config: CompressionConfig) -> Self {
        Self {
            lz4: Lz4Compressor::with_level(config.level),
            noop: NoopCompressor,
            config,
        }
    }

    fn compressor(&self, algorithm: CompressionAlgorithm) -> &dyn Compressor {
        match algorithm {
            CompressionAlgorithm::None => &self.noop,
            CompressionAlgorithm::Lz4 => &self.lz4,
        }
    }

    /// Encode `data` as `[tag][body]`.
    ///
    /// Falls back to a raw body when the payload is small, compression fails,
    /// or compression does not shrink it.
    pub fn encode_frame(&self, data: &[u8]) -> Bytes {
        let algorithm = if (data.len() as u64) < self.config.min_size_bytes {
            CompressionAlgorithm::None
        } else {
            self.config.algorithm
        };

        let (body, used) = match self.compressor(algorithm).compress(data) {
            Ok(compressed) if algorithm != CompressionAlgorithm::None && compressed.len() < data.len() => {
                (compressed, algorithm)
            }
            Ok(_) => (data.to_vec(), CompressionAlgorithm::None),
            Err(e) => {
                tracing::warn!("Compression with {} failed, storing raw: {}", algorithm, e);
                (data.to_vec(), CompressionAlgorithm::None)
            }
        };

        let mut frame = BytesMut::with_capacity(body.len() + 1);
        frame.put_u8(used.tag());
        frame.put_slice(&body);
        frame.freeze()
    }

    /// Decode a frame produced by [`encode_frame`](Self::encode_frame).
    pub fn decode_frame(&self, frame: &[u8]) -> Result<Bytes> {
        let (&tag, body) = frame.split_first().ok_or_else(|| Error::DecompressionFailed {
            algorithm: "unknown".into(),
            reason: "empty frame".into(),
        })?;
        let algorithm =
            CompressionAlgorithm::from_tag(tag).ok_or_else(|| Error::DecompressionFailed {
                algorithm: "unknown".into(),
                reason: format!("unknown algorithm tag {}", tag),
            })?;
        Ok(Bytes::from(self.compressor(algorithm).decompress(body)?))
    }

    /// Get configuration
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }
}

impl Default for CompressionManager {
    fn default() -> Self {
        Self::new()
    }
}
