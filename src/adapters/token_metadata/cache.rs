//! Metadata Cache
//!
//! TTL cache in front of any `MetadataProvider`. Empty results are cached too, so an unknown
//! asset is not looked up again until its entry expires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ports::metadata::{AssetMetadata, MetadataError, MetadataProvider};

#[derive(Debug, Clone)]
struct CacheEntry {
    metadata: AssetMetadata,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_valid(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() < ttl
    }
}

pub struct MetadataCache {
    inner: Arc<dyn MetadataProvider>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl MetadataCache {
    /// Default TTL (10 minutes)
    pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

    pub fn new(inner: Arc<dyn MetadataProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn cached(&self, address: &str) -> Option<AssetMetadata> {
        self.entries
            .read()
            .await
            .get(address)
            .filter(|e| e.is_valid(self.ttl))
            .map(|e| e.metadata.clone())
    }

    /// Remove expired entries
    pub async fn cleanup(&self) {
        let ttl = self.ttl;
        self.entries.write().await.retain(|_, e| e.is_valid(ttl));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl MetadataProvider for MetadataCache {
    async fn lookup(&self, address: &str) -> Result<AssetMetadata, MetadataError> {
        if let Some(hit) = self.cached(address).await {
            return Ok(hit);
        }

        // Errors are not cached; the next lookup retries
        let metadata = self.inner.lookup(address).await?;
        self.entries.write().await.insert(
            address.to_string(),
            CacheEntry {
                metadata: metadata.clone(),
                inserted_at: Instant::now(),
            },
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::metadata::MockMetadataProvider;

    fn named(name: &str) -> AssetMetadata {
        AssetMetadata {
            name: Some(name.to_string()),
            symbol: None,
            icon_uri: None,
        }
    }

    #[tokio::test]
    async fn test_hit_skips_inner_lookup() {
        let mut inner = MockMetadataProvider::new();
        inner
            .expect_lookup()
            .times(1)
            .returning(|_| Ok(named("Popcat")));

        let cache = MetadataCache::new(Arc::new(inner), MetadataCache::DEFAULT_TTL);
        let first = cache.lookup("mintA").await.unwrap();
        let second = cache.lookup("mintA").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.name.as_deref(), Some("Popcat"));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_negative_result_is_cached() {
        let mut inner = MockMetadataProvider::new();
        inner
            .expect_lookup()
            .times(1)
            .returning(|_| Ok(AssetMetadata::default()));

        let cache = MetadataCache::new(Arc::new(inner), MetadataCache::DEFAULT_TTL);
        assert!(cache.lookup("unknown").await.unwrap().is_empty());
        assert!(cache.lookup("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let mut inner = MockMetadataProvider::new();
        let mut seq = mockall::Sequence::new();
        inner
            .expect_lookup()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(MetadataError::RateLimited));
        inner
            .expect_lookup()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(named("Retry")));

        let cache = MetadataCache::new(Arc::new(inner), MetadataCache::DEFAULT_TTL);
        assert!(cache.lookup("mintB").await.is_err());
        assert_eq!(cache.lookup("mintB").await.unwrap().name.as_deref(), Some("Retry"));
    }

    #[tokio::test]
    async fn test_expired_entry_refetches() {
        let mut inner = MockMetadataProvider::new();
        inner.expect_lookup().times(2).returning(|_| Ok(named("Fresh")));

        let cache = MetadataCache::new(Arc::new(inner), Duration::ZERO);
        cache.lookup("mintC").await.unwrap();
        cache.lookup("mintC").await.unwrap();

        cache.cleanup().await;
        assert_eq!(cache.len().await, 0);
    }
}
