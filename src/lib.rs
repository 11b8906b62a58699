pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use anyhow::Result;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::infra::cache::{MemoryCache, RedisCache, SharedCache};
use crate::infra::db::Db;
use crate::infra::storage::ObjectStorage;
use crate::infra::store::memory::MemoryStore;
use crate::infra::store::postgres::PgStore;
use crate::infra::store::SharedStore;

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub cache: SharedCache,
    pub storage: ObjectStorage,
    pub paseto_access_key: [u8; 32],
    pub page_size: usize,
    pub index_cache_ttl_seconds: u64,
    pub login_url: String,
    pub upload_max_bytes: usize,
}

impl AppState {
    /// Connects the configured backends. Without `DATABASE_URL` or
    /// `REDIS_URL` the in-process store and cache are used instead.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store: SharedStore = match config.database_url.as_deref() {
            Some(database_url) => {
                let db = Db::connect(config, database_url).await?;
                db.migrate().await?;
                tracing::info!("using postgres store");
                Arc::new(PgStore::new(db))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let cache: SharedCache = match config.redis_url.as_deref() {
            Some(redis_url) => Arc::new(RedisCache::connect(redis_url).await?),
            None => {
                tracing::warn!("REDIS_URL not set, using in-process page cache");
                Arc::new(MemoryCache::new())
            }
        };

        let storage = ObjectStorage::new(config).await?;

        Ok(Self::with_backends(config, store, cache, storage))
    }

    pub fn with_backends(
        config: &AppConfig,
        store: SharedStore,
        cache: SharedCache,
        storage: ObjectStorage,
    ) -> Self {
        Self {
            store,
            cache,
            storage,
            paseto_access_key: config.paseto_access_key,
            page_size: config.page_size,
            index_cache_ttl_seconds: config.index_cache_ttl_seconds,
            login_url: config.login_url.clone(),
            upload_max_bytes: config.upload_max_bytes,
        }
    }
}
