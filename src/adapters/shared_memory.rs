//! In-Memory Shared Cache
//!
//! Redis-like key/value backend for the `SharedCache` port: per-key expiry
//! and glob deletes. Several engines holding the same `Arc` behave like
//! processes sharing one cache server.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::domain::SharedCache;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct StoredValue {
    value: Bytes,
    expires_at: Instant,
}

/// DashMap-backed shared cache
#[derive(Debug, Default)]
pub struct InMemorySharedCache {
    entries: DashMap<String, StoredValue>,
    failing: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl InMemorySharedCache {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail until switched off
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Number of stored keys, expired ones included until touched
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored keys
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Get calls so far
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Set calls so far
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            Err(Error::SharedCache("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.check()?;

        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(stored) if stored.expires_at > now => return Ok(Some(stored.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, stored| stored.expires_at <= now);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.check()?;

        let expires_at = Instant::now() + ttl;
        self.entries
            .insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        self.check()?;
        let before = self.entries.len();
        self.entries.retain(|key, _| !glob_match(pattern, key));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }

    async fn clear(&self) -> Result<()> {
        self.check()?;
        self.entries.clear();
        Ok(())
    }
}

/// Glob match supporting `*` (any run) and `?` (any single character)
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_glob_match() {
        assert!(glob_match("grid:v1:orders:*", "grid:v1:orders:p1x50:f=:s=:q="));
        assert!(!glob_match("grid:v1:orders:*", "grid:v1:orders_b:p1x50"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a?c", "abc"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test]
    async fn test_set_get() {
        let cache = InMemorySharedCache::new();
        cache.set("k", Bytes::from_static(b"v"), TTL).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
        assert_eq!(cache.get("missing").await.unwrap(), None);
        assert_eq!(cache.reads(), 2);
        assert_eq!(cache.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let cache = InMemorySharedCache::new();
        cache.set("k", Bytes::from_static(b"v"), TTL).await.unwrap();

        tokio::time::advance(TTL).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = InMemorySharedCache::new();
        for key in ["grid:v1:orders:a", "grid:v1:orders:b", "grid:v1:users:a"] {
            cache.set(key, Bytes::new(), TTL).await.unwrap();
        }
        assert_eq!(cache.delete_pattern("grid:v1:orders:*").await.unwrap(), 2);
        assert_eq!(cache.keys(), vec!["grid:v1:users:a".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_backend() {
        let cache = InMemorySharedCache::new();
        cache.set_failing(true);
        assert_matches!(cache.get("k").await, Err(Error::SharedCache(_)));
        assert_matches!(
            cache.set("k", Bytes::new(), TTL).await,
            Err(Error::SharedCache(_))
        );

        cache.set_failing(false);
        cache.clear().await.unwrap();
    }
}
