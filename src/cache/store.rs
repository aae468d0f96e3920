//! Raw key/value backends for the branch cache.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::error::CacheError;

/// String key/value store with per-entry expiry.
///
/// Values are opaque to the backend; the branch cache owns their encoding.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Overwrites `key` and resets its TTL.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local backend used by tests and single-node deployments.
///
/// Holds at most `memory_max_entries` keys and evicts the least recently used
/// one beyond that. Expired entries at the cold end are reclaimed on write.
pub struct MemoryCacheStore {
    entries: RwLock<LruCache<String, MemoryEntry>>,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.memory_max_entries_non_zero())),
        }
    }

    fn entries(&self, op: &'static str) -> RwLockReadGuard<'_, LruCache<String, MemoryEntry>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!(op, "memory cache lock poisoned, reusing entries");
            poisoned.into_inner()
        })
    }

    fn entries_mut(&self, op: &'static str) -> RwLockWriteGuard<'_, LruCache<String, MemoryEntry>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!(op, "memory cache lock poisoned, reusing entries");
            poisoned.into_inner()
        })
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries("len")
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of live entries, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries("keys")
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

/// Pops expired entries from the least recently used end until a live one
/// is found.
fn reclaim_expired(entries: &mut LruCache<String, MemoryEntry>, now: Instant) -> usize {
    let mut reclaimed = 0;
    while entries
        .peek_lru()
        .is_some_and(|(_, entry)| !entry.is_live(now))
    {
        entries.pop_lru();
        reclaimed += 1;
    }
    reclaimed
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries_mut("get");
        let live = match entries.peek(key) {
            None => return Ok(None),
            Some(entry) => entry.is_live(now),
        };
        if !live {
            entries.pop(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let entry = MemoryEntry {
            value,
            expires_at: now + ttl,
        };

        let mut entries = self.entries_mut("set");
        let reclaimed = reclaim_expired(&mut entries, now);
        if reclaimed > 0 {
            debug!(reclaimed, "expired memory cache entries reclaimed");
        }
        if let Some((evicted, _)) = entries.push(key.to_string(), entry)
            && evicted != key
        {
            debug!(key = %evicted, "memory cache at capacity, evicted");
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries_mut("delete").pop(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryCacheStore::new(&CacheConfig::default());
        assert_eq!(store.get("post:1").await.unwrap(), None);

        store
            .set("post:1", "[]".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("post:1").await.unwrap().as_deref(), Some("[]"));
        assert_eq!(store.keys(), vec!["post:1".to_string()]);

        store.delete("post:1").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryCacheStore::new(&CacheConfig::default());
        store
            .set("comments:1", "x".to_string(), Duration::from_secs(30))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(store.get("comments:1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("comments:1").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rewrite_resets_ttl() {
        let store = MemoryCacheStore::new(&CacheConfig::default());
        let ttl = Duration::from_secs(10);
        store.set("k", "a".to_string(), ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        store.set("k", "b".to_string(), ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }

    fn store_with_capacity(memory_max_entries: usize) -> MemoryCacheStore {
        MemoryCacheStore::new(&CacheConfig {
            memory_max_entries,
            ..CacheConfig::default()
        })
    }

    #[tokio::test]
    async fn evicts_least_recently_used_at_capacity() {
        let store = store_with_capacity(2);
        let ttl = Duration::from_secs(60);
        store.set("post:1", "a".to_string(), ttl).await.unwrap();
        store.set("post:2", "b".to_string(), ttl).await.unwrap();

        // Reading post:1 makes post:2 the eviction candidate.
        assert!(store.get("post:1").await.unwrap().is_some());
        store.set("post:3", "c".to_string(), ttl).await.unwrap();

        assert_eq!(
            store.keys(),
            vec!["post:1".to_string(), "post:3".to_string()]
        );
        assert_eq!(store.get("post:2").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn write_reclaims_expired_entries_never_read_again() {
        let store = MemoryCacheStore::new(&CacheConfig::default());
        for id in 0..1000 {
            store
                .set(&format!("comments:{id}"), "[]".to_string(), Duration::from_secs(1))
                .await
                .unwrap();
        }

        tokio::time::advance(Duration::from_secs(5)).await;
        store
            .set("post:1", "[]".to_string(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.entries("test").len(), 1);
    }

    #[tokio::test]
    async fn store_recovers_from_poisoned_lock() {
        let store = std::sync::Arc::new(store_with_capacity(4));
        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries_mut("test");
            panic!("poison the cache lock");
        })
        .join();

        store
            .set("post:1", "[]".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("post:1").await.unwrap().as_deref(), Some("[]"));
    }
}
