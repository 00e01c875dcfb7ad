//! Per (viewer, other) cache of relationship status lookups.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, CreatePoolError, Pool, Runtime};
use friendship::{KeyedCache, StatusEntry};
use redis::cmd;
use tokio::sync::Mutex;
use uuid::Uuid;

const MEMORY_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("unable to get redis connection: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("malformed cache entry: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait StatusCache: Send + Sync {
    async fn get(&self, viewer: &Uuid, other: &Uuid) -> Result<Option<StatusEntry>, CacheError>;
    async fn set(&self, viewer: &Uuid, other: &Uuid, entry: &StatusEntry) -> Result<(), CacheError>;
    /// Drops the entries of both directions of the pair.
    async fn invalidate_pair(&self, a: &Uuid, b: &Uuid) -> Result<(), CacheError>;
}

fn key(viewer: &Uuid, other: &Uuid) -> String {
    format!("friendship_status:{}:{}", viewer, other)
}

pub struct RedisStatusCache {
    pool: Pool,
    ttl: Duration,
}

impl RedisStatusCache {
    pub fn new(url: &str, ttl: Duration) -> Result<Self, CreatePoolError> {
        Ok(Self {
            pool: Config::from_url(url).create_pool(Some(Runtime::Tokio1))?,
            ttl,
        })
    }

    async fn connection(&self) -> Result<Connection, CacheError> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl StatusCache for RedisStatusCache {
    async fn get(&self, viewer: &Uuid, other: &Uuid) -> Result<Option<StatusEntry>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = cmd("GET")
            .arg(key(viewer, other))
            .query_async(&mut conn)
            .await?;
        match value {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, viewer: &Uuid, other: &Uuid, entry: &StatusEntry) -> Result<(), CacheError> {
        let value = serde_json::to_string(entry)?;
        let mut conn = self.connection().await?;
        cmd("SET")
            .arg(key(viewer, other))
            .arg(value)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn invalidate_pair(&self, a: &Uuid, b: &Uuid) -> Result<(), CacheError> {
        log::debug!("invalidating cached status of {} and {}", a, b);
        let mut conn = self.connection().await?;
        cmd("DEL")
            .arg(key(a, b))
            .arg(key(b, a))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

pub struct MemoryStatusCache {
    entries: Mutex<KeyedCache<(Uuid, Uuid), StatusEntry>>,
}

impl MemoryStatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(KeyedCache::new(ttl, MEMORY_CACHE_CAPACITY)),
        }
    }
}

#[async_trait]
impl StatusCache for MemoryStatusCache {
    async fn get(&self, viewer: &Uuid, other: &Uuid) -> Result<Option<StatusEntry>, CacheError> {
        Ok(self.entries.lock().await.get(&(*viewer, *other)).cloned())
    }

    async fn set(&self, viewer: &Uuid, other: &Uuid, entry: &StatusEntry) -> Result<(), CacheError> {
        self.entries
            .lock()
            .await
            .insert((*viewer, *other), entry.clone());
        Ok(())
    }

    async fn invalidate_pair(&self, a: &Uuid, b: &Uuid) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        entries.invalidate(&(*a, *b));
        entries.invalidate(&(*b, *a));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use friendship::RelationStatus;

    use super::*;

    #[test]
    fn keys_are_directional() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_ne!(key(&a, &b), key(&b, &a));
        assert!(key(&a, &b).starts_with("friendship_status:"));
    }

    #[tokio::test]
    async fn invalidation_covers_both_directions() {
        let cache = MemoryStatusCache::new(Duration::from_secs(60));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let entry = StatusEntry {
            status: RelationStatus::Accepted,
            ..StatusEntry::none()
        };
        cache.set(&a, &b, &entry).await.unwrap();
        cache.set(&b, &a, &entry).await.unwrap();
        assert_eq!(cache.get(&a, &b).await.unwrap(), Some(entry));

        cache.invalidate_pair(&b, &a).await.unwrap();
        assert_eq!(cache.get(&a, &b).await.unwrap(), None);
        assert_eq!(cache.get(&b, &a).await.unwrap(), None);
    }
}
