//! Key/value cache used for tenant-by-credential lookups.
//!
//! Every backend error is recoverable: callers treat a failing cache as a
//! miss and fall through to the tenant store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use kennel_core::{CredentialHash, KennelError};
use thiserror::Error;
use tokio::time::Instant;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Cache backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CacheError {
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }
}

impl From<CacheError> for KennelError {
    fn from(err: CacheError) -> Self {
        KennelError::unavailable("cache backend unavailable").with_source(err)
    }
}

/// Cache key of a tenant lookup.
pub fn tenant_cache_key(hash: &CredentialHash) -> String {
    format!("tenant:cred:{}", hash)
}

#[async_trait]
pub trait CacheService: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;
}

/// Expiring in-process cache with fault injection and call counters.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
    failing: AtomicBool,
    gets: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with [`CacheError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.1 > Instant::now())
            .unwrap_or(false)
    }

    /// Remaining lifetime of `key`, if present.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.entries
            .get(key)
            .and_then(|entry| entry.1.checked_duration_since(Instant::now()))
    }

    /// Overwrite a raw value (test helper for corrupt entries).
    pub fn put_raw(&self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }

    /// Entries held, including expired ones not yet pruned.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn check(&self) -> CacheResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache is failing".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheService for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;

        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.1 > now => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        // Entries for credentials nobody resolves again are dropped here.
        let now = Instant::now();
        self.entries.retain(|_, (_, expires)| *expires > now);
        self.put_raw(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(feature = "redis")]
pub use self::redis_cache::RedisCache;

#[cfg(feature = "redis")]
mod redis_cache {
    use std::time::Duration;

    use async_trait::async_trait;
    use redis::aio::ConnectionManager;
    use redis::AsyncCommands;

    use super::{CacheError, CacheResult, CacheService};

    /// Redis-backed cache sharing one multiplexed, auto-reconnecting
    /// connection.
    #[derive(Clone)]
    pub struct RedisCache {
        manager: ConnectionManager,
    }

    impl RedisCache {
        pub async fn connect(url: &str) -> CacheResult<Self> {
            let client = redis::Client::open(url).map_err(CacheError::backend)?;
            let manager = ConnectionManager::new(client)
                .await
                .map_err(CacheError::backend)?;
            Ok(Self { manager })
        }
    }

    #[async_trait]
    impl CacheService for RedisCache {
        async fn get(&self, key: &str) -> CacheResult<Option<String>> {
            let mut conn = self.manager.clone();
            conn.get(key).await.map_err(CacheError::backend)
        }

        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
            let mut conn = self.manager.clone();
            conn.set_ex(key, value, ttl.as_secs().max(1))
                .await
                .map_err(CacheError::backend)
        }

        async fn delete(&self, key: &str) -> CacheResult<()> {
            let mut conn = self.manager.clone();
            conn.del(key).await.map_err(CacheError::backend)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.contains("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn writes_prune_expired_entries() {
        let cache = MemoryCache::new();
        cache.set_ex("old", "v", Duration::from_secs(1)).await.unwrap();
        cache.set_ex("kept", "v", Duration::from_secs(600)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.set_ex("new", "v", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("old"));
        assert!(cache.contains("kept"));
    }

    #[tokio::test]
    async fn failing_cache_reports_errors() {
        let cache = MemoryCache::new();
        cache.set_failing(true);
        tokio_test::assert_err!(cache.get("k").await);
        tokio_test::assert_err!(cache.set_ex("k", "v", Duration::from_secs(1)).await);
        assert_eq!(cache.get_count(), 1);
    }

    #[test]
    fn tenant_key_layout() {
        assert_eq!(
            tenant_cache_key(&CredentialHash("abc".into())),
            "tenant:cred:abc"
        );
    }
}
