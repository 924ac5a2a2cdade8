//! Engine Configuration
//!
//! Loaded from YAML; every field has a default, so an empty document is a
//! valid configuration.
//!
//! ```yaml
//! cache:
//!   ttl_secs: 300        # or ttl_ms: 1500
//!   key_namespace: "grid:v1"
//!   l1:
//!     capacity: 67108864
//!     shards: 16
//!   compression:
//!     algorithm: lz4
//!     min_size_bytes: 1024
//! pagination:
//!   max_page_size: 1000
//!   default_page_size: 50
//!   coalesce_misses: true
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::cache::CacheConfig;
use crate::error::{Error, Result};
use crate::pagination::PaginationConfig;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cache tiers
    pub cache: CacheConfig,
    /// Page, window, and prefetch limits
    pub pagination: PaginationConfig,
}

impl EngineConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_yaml_str(&raw)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        match self.cache.ttl_ms {
            Some(0) => return Err(Error::Config("cache.ttl_ms must be positive".into())),
            None if self.cache.ttl_secs == 0 => {
                return Err(Error::Config("cache.ttl_secs must be positive".into()))
            }
            _ => {}
        }
        if self.cache.key_namespace.is_empty() {
            return Err(Error::Config("cache.key_namespace must not be empty".into()));
        }
        if self.cache.l1.shards == 0 {
            return Err(Error::Config("cache.l1.shards must be positive".into()));
        }
        if self.pagination.max_page_size == 0 {
            return Err(Error::Config("pagination.max_page_size must be positive".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
