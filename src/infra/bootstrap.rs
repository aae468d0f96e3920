//! Composes the store, the cache tier and the application services from
//! resolved settings.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::application::context::RequestContext;
use crate::application::repos::Store;
use crate::application::{CommentService, MutationOrchestrator, PostService};
use crate::cache::{CacheConfig, CacheStore, CommentCache, MemoryCacheStore};
use crate::config::{CacheBackend, Settings, StorageBackend};

use super::cache::RedisCacheStore;
use super::db::PostgresRepositories;
use super::error::InfraError;
use super::memory::MemoryStore;

/// Application services sharing one store and one cache.
#[derive(Clone)]
pub struct Services {
    pub posts: PostService,
    pub comments: CommentService,
    pub mutations: MutationOrchestrator,
    request_timeout: Duration,
    postgres: Option<PostgresRepositories>,
    redis: Option<RedisCacheStore>,
}

impl Services {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Option<CommentCache>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            posts: PostService::new(store.clone()),
            comments: CommentService::new(store.clone(), cache.clone()),
            mutations: MutationOrchestrator::new(store, cache),
            request_timeout,
            postgres: None,
            redis: None,
        }
    }

    /// In-memory store and cache, for tests and demos.
    pub fn in_memory(cache_config: &CacheConfig) -> Self {
        let cache_store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new(cache_config));
        Self::new(
            Arc::new(MemoryStore::new()),
            Some(CommentCache::new(cache_store, cache_config)),
            Duration::from_secs(10),
        )
    }

    /// Fresh context bounded by the configured request timeout.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_timeout(self.request_timeout)
    }

    /// Pings the external backends in use. In-memory backends are always
    /// healthy.
    pub async fn health_check(&self) -> Result<(), InfraError> {
        if let Some(postgres) = &self.postgres {
            postgres
                .health_check()
                .await
                .map_err(|err| InfraError::database(format!("health check failed: {err}")))?;
            let ready = postgres
                .schema_ready()
                .await
                .map_err(|err| InfraError::database(format!("schema check failed: {err}")))?;
            if !ready {
                return Err(InfraError::database(
                    "comment schema missing, run `threadline migrate`",
                ));
            }
        }
        if let Some(redis) = &self.redis {
            redis.ping().await?;
        }
        Ok(())
    }
}

pub async fn build(settings: &Settings) -> Result<Services, InfraError> {
    let postgres = match settings.storage.backend {
        StorageBackend::Postgres => Some(connect_postgres(settings).await?),
        StorageBackend::Memory => None,
    };
    let store: Arc<dyn Store> = match &postgres {
        Some(repositories) => Arc::new(repositories.clone()),
        None => Arc::new(MemoryStore::new()),
    };

    let cache_config = CacheConfig::from(&settings.cache);
    let redis = match settings.cache.backend {
        CacheBackend::Redis => {
            let url = settings
                .cache
                .redis_url
                .as_deref()
                .ok_or_else(|| InfraError::configuration("cache.redis_url is not configured"))?;
            Some(RedisCacheStore::connect(url).await?)
        }
        CacheBackend::Memory | CacheBackend::Disabled => None,
    };
    let cache_store: Option<Arc<dyn CacheStore>> = match (settings.cache.backend, &redis) {
        (CacheBackend::Redis, Some(redis)) => Some(Arc::new(redis.clone())),
        (CacheBackend::Memory, _) => Some(Arc::new(MemoryCacheStore::new(&cache_config))),
        _ => None,
    };
    let cache = cache_store.map(|store| CommentCache::new(store, &cache_config));

    info!(
        storage = ?settings.storage.backend,
        cache = ?settings.cache.backend,
        ttl_seconds = cache_config.ttl_seconds,
        "services composed"
    );

    let mut services = Services::new(store, cache, settings.requests.timeout);
    services.postgres = postgres;
    services.redis = redis;
    Ok(services)
}

pub async fn connect_postgres(settings: &Settings) -> Result<PostgresRepositories, InfraError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(
        database_url,
        settings.database.max_connections.get(),
        settings.requests.timeout,
    )
    .await
    .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(PostgresRepositories::new(pool))
}
