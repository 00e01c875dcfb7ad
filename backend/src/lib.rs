//! HTTP service owning friendship records: requests, tiers, blocks,
//! suggestions and the per-pair status cache.

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod events;
pub mod postgres;
pub mod routes;
pub mod service;
pub mod session;
pub mod status_cache;
pub mod storage;
pub mod user;

use config::{Config, StorageKind};
use errors::StartupError;
use events::{EventPublisher, LogPublisher, RabbitmqPublisher};
use service::{FriendshipService, ServiceSettings};
use status_cache::{MemoryStatusCache, RedisStatusCache, StatusCache};
use storage::{MemoryStorage, PostgresStorage, Storage};

/// Connects the configured backends and runs pending migrations.
pub async fn build_service(config: &Config) -> Result<FriendshipService, StartupError> {
    let storage: Arc<dyn Storage> = match config.storage {
        StorageKind::Postgres => {
            let pool = postgres::create_pool(&config.postgres)?;
            postgres::migrate_up(&pool).await?;
            Arc::new(PostgresStorage::new(pool))
        }
        StorageKind::Memory => {
            log::warn!("using in-memory storage, data is lost on restart");
            Arc::new(MemoryStorage::new())
        }
    };

    let cache: Arc<dyn StatusCache> = match &config.status_cache_redis_url {
        Some(url) => Arc::new(RedisStatusCache::new(url, config.status_cache_ttl)?),
        None => Arc::new(MemoryStatusCache::new(config.status_cache_ttl)),
    };

    let events: Arc<dyn EventPublisher> = match &config.rabbitmq {
        Some(rabbitmq) => Arc::new(RabbitmqPublisher::connect(rabbitmq).await?),
        None => Arc::new(LogPublisher),
    };

    Ok(FriendshipService::new(
        storage,
        cache,
        events,
        ServiceSettings::from(config),
    ))
}
