// db/db.rs
use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::{Pool, Postgres};

use super::cache::connect_redis;

#[derive(Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
    pub redis_client: Option<Arc<ConnectionManager>>,
}

impl std::fmt::Debug for DBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClient")
            .field("pool", &"Pool<Postgres>")
            .field("redis_client", &self.redis_client.is_some())
            .finish()
    }
}

impl DBClient {
    /// Create a new DBClient with PostgreSQL pool only
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient {
            pool,
            redis_client: None,
        }
    }

    /// Create a new DBClient with both PostgreSQL and Redis. A Redis that
    /// cannot be reached leaves the client running without it.
    pub async fn with_redis(pool: Pool<Postgres>, redis_url: &str) -> Self {
        DBClient {
            pool,
            redis_client: connect_redis(redis_url).await,
        }
    }
}
