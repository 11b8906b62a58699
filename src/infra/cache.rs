//! Whole-page response cache.
//!
//! Values are stored with an expiry and are never invalidated by writes;
//! readers see a page at most `ttl` old.

use anyhow::Result;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

const KEY_PREFIX: &str = "page:";
const CLEAR_BATCH: usize = 500;

pub type SharedCache = Arc<dyn PageCache>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPage {
    pub content_type: String,
    pub body: String,
}

/// Cache key for a route signature (`/path?query`).
pub fn page_key(route: &str) -> String {
    format!("{}{}", KEY_PREFIX, route)
}

#[axum::async_trait]
pub trait PageCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedPage>>;
    async fn set(&self, key: &str, page: &CachedPage, ttl: Duration) -> Result<()>;
    /// Drops every cached page.
    async fn clear(&self) -> Result<()>;
    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(Self { client })
    }
}

#[axum::async_trait]
impl PageCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<CachedPage>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(key).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, page: &CachedPage, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_string(page)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(key, payload, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut keys: Vec<String> = Vec::new();
        {
            // SCAN, unlike KEYS, does not block the server on large keyspaces
            let mut iter = conn
                .scan_match::<_, String>(format!("{}*", KEY_PREFIX))
                .await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        for batch in keys.chunks(CLEAR_BATCH) {
            conn.del::<_, ()>(batch).await?;
        }
        tracing::debug!(keys = keys.len(), "cleared page cache");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

/// Process-local cache. Expiry follows the tokio clock, so paused-time tests
/// can advance past it.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, (CachedPage, Instant)>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[axum::async_trait]
impl PageCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CachedPage>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((page, expires_at)) if *expires_at > now => return Ok(Some(page.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // expired: drop it so the map does not grow with dead routes
        let mut entries = self.entries.write().await;
        if matches!(entries.get(key), Some((_, expires_at)) if *expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, page: &CachedPage, ttl: Duration) -> Result<()> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (page.clone(), expires_at));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
