// db/cache.rs
use std::{collections::HashMap, sync::Arc};

use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::gigmodel::Gig;

/// Cache TTL constants (in seconds)
pub const GIG_STATUS_CACHE_TTL: usize = 900; // 15 minutes

pub fn gig_status_key(gig_id: Uuid) -> String {
    format!("completion_status:{}", gig_id)
}

pub async fn connect_redis(redis_url: &str) -> Option<Arc<ConnectionManager>> {
    match redis::Client::open(redis_url) {
        Ok(client) => match ConnectionManager::new(client).await {
            Ok(conn) => {
                tracing::info!("✅ Redis connection established successfully");
                Some(Arc::new(conn))
            }
            Err(e) => {
                tracing::warn!("⚠️ Failed to connect to Redis: {}. Continuing without it.", e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("⚠️ Failed to create Redis client: {}. Continuing without it.", e);
            None
        }
    }
}

pub struct CacheHelper;

impl CacheHelper {
    pub async fn get<T: DeserializeOwned>(
        redis: &Arc<ConnectionManager>,
        key: &str,
    ) -> Result<Option<T>, redis::RedisError> {
        let mut conn = ConnectionManager::clone(redis);
        let cached: Option<String> = conn.get(key).await?;

        match cached {
            Some(data) => match serde_json::from_str::<T>(&data) {
                Ok(value) => {
                    tracing::debug!("Cache HIT: {}", key);
                    Ok(Some(value))
                }
                Err(_) => {
                    tracing::warn!("Cache deserialization failed for: {}", key);
                    Ok(None)
                }
            },
            None => {
                tracing::debug!("Cache MISS: {}", key);
                Ok(None)
            }
        }
    }

    pub async fn set<T: Serialize>(
        redis: &Arc<ConnectionManager>,
        key: &str,
        value: &T,
        ttl_seconds: usize,
    ) -> Result<(), redis::RedisError> {
        if let Ok(json) = serde_json::to_string(value) {
            let mut conn = ConnectionManager::clone(redis);
            let _: () = conn.set_ex(key, json, ttl_seconds).await?;
            tracing::debug!("Cache SET: {} (TTL: {}s)", key, ttl_seconds);
        }
        Ok(())
    }

    pub async fn delete(
        redis: &Arc<ConnectionManager>,
        key: &str,
    ) -> Result<(), redis::RedisError> {
        let mut conn = ConnectionManager::clone(redis);
        let _: () = conn.del(key).await?;
        tracing::debug!("Cache DELETE: {}", key);
        Ok(())
    }
}

#[derive(Clone)]
enum CacheBackend {
    Redis(Arc<ConnectionManager>),
    Local(Arc<RwLock<HashMap<String, String>>>),
}

/// Viewer-independent gig snapshots keyed by gig id. The store stays the
/// source of truth: every mutation calls `invalidate` before it returns, and
/// cache failures only cost a store read.
///
/// Fills are fenced by a generation counter. A reader takes `generation()`
/// before loading from the store and hands it back to `fill`; any
/// invalidation in between bumps the counter and the stale snapshot is
/// dropped instead of written.
#[derive(Clone)]
pub struct StatusCache {
    backend: CacheBackend,
    ttl_seconds: usize,
    generation: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for StatusCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCache")
            .field("backend", &self.backend_name())
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl StatusCache {
    pub fn local() -> Self {
        Self {
            backend: CacheBackend::Local(Arc::new(RwLock::new(HashMap::new()))),
            ttl_seconds: GIG_STATUS_CACHE_TTL,
            generation: Arc::new(Mutex::new(0)),
        }
    }

    /// Uses Redis when a connection is available, the in-process map otherwise.
    pub fn from_redis(redis_client: Option<Arc<ConnectionManager>>, ttl_seconds: usize) -> Self {
        match redis_client {
            Some(conn) => Self {
                backend: CacheBackend::Redis(conn),
                ttl_seconds,
                generation: Arc::new(Mutex::new(0)),
            },
            None => Self {
                ttl_seconds,
                ..Self::local()
            },
        }
    }

    pub fn backend_name(&self) -> &str {
        match self.backend {
            CacheBackend::Redis(_) => "redis",
            CacheBackend::Local(_) => "local",
        }
    }

    pub async fn get_gig(&self, gig_id: Uuid) -> Option<Gig> {
        let key = gig_status_key(gig_id);
        match &self.backend {
            CacheBackend::Redis(conn) => match CacheHelper::get::<Gig>(conn, &key).await {
                Ok(hit) => hit,
                Err(e) => {
                    tracing::warn!("Status cache read failed for {}: {}", key, e);
                    None
                }
            },
            CacheBackend::Local(map) => map
                .read()
                .await
                .get(&key)
                .and_then(|json| serde_json::from_str(json).ok()),
        }
    }

    /// Current fill generation. Take it before reading the store.
    pub async fn generation(&self) -> u64 {
        *self.generation.lock().await
    }

    /// Stores `gig` unless the cache was invalidated since `seen` was taken.
    /// Returns whether the snapshot was written.
    pub async fn fill(&self, gig: &Gig, seen: u64) -> bool {
        let current = self.generation.lock().await;
        if *current != seen {
            tracing::debug!("Skipping stale cache fill for gig {}", gig.id);
            return false;
        }

        let key = gig_status_key(gig.id);
        match &self.backend {
            CacheBackend::Redis(conn) => {
                if let Err(e) = CacheHelper::set(conn, &key, gig, self.ttl_seconds).await {
                    tracing::warn!("Status cache write failed for {}: {}", key, e);
                    return false;
                }
            }
            CacheBackend::Local(map) => match serde_json::to_string(gig) {
                Ok(json) => {
                    map.write().await.insert(key, json);
                }
                Err(_) => return false,
            },
        }
        true
    }

    pub async fn invalidate(&self, gig_id: Uuid) {
        // Held across the delete so no fill can slip in between.
        let mut generation = self.generation.lock().await;
        *generation += 1;

        let key = gig_status_key(gig_id);
        match &self.backend {
            CacheBackend::Redis(conn) => {
                if let Err(e) = CacheHelper::delete(conn, &key).await {
                    tracing::warn!("Status cache invalidation failed for {}: {}", key, e);
                }
            }
            CacheBackend::Local(map) => {
                map.write().await.remove(&key);
            }
        }
    }
}
