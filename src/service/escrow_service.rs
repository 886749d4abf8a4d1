// service/escrow_service.rs
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    db::db::DBClient,
    models::escrowmodel::{EscrowReleaseRecord, ReleaseReceipt},
    service::error::ServiceError,
};

/// Moves a gig's held funds to its payee.
///
/// Implementations must be idempotent per `gig_id`: a repeated call returns
/// the first receipt with `newly_released = false` and moves nothing.
#[async_trait]
pub trait EscrowRelease: Send + Sync + std::fmt::Debug {
    async fn release(
        &self,
        gig_id: Uuid,
        payee_id: Uuid,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<ReleaseReceipt, ServiceError>;

    async fn get_release(&self, gig_id: Uuid) -> Result<Option<EscrowReleaseRecord>, ServiceError>;
}

/// Ledger-backed release: the `escrow_releases` primary key is the
/// idempotency key.
#[derive(Debug, Clone)]
pub struct LedgerEscrow {
    db_client: Arc<DBClient>,
}

impl LedgerEscrow {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }
}

#[async_trait]
impl EscrowRelease for LedgerEscrow {
    async fn release(
        &self,
        gig_id: Uuid,
        payee_id: Uuid,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<ReleaseReceipt, ServiceError> {
        let inserted = sqlx::query_as::<_, EscrowReleaseRecord>(
            r#"
            INSERT INTO escrow_releases (gig_id, payee_id, amount, released_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (gig_id) DO NOTHING
            RETURNING gig_id, payee_id, amount, released_at
            "#,
        )
        .bind(gig_id)
        .bind(payee_id)
        .bind(amount)
        .bind(at)
        .fetch_optional(&self.db_client.pool)
        .await?;

        if let Some(record) = inserted {
            tracing::info!("💸 Released {} to {} for gig {}", amount, payee_id, gig_id);
            return Ok(ReleaseReceipt {
                record,
                newly_released: true,
            });
        }

        let record = self.get_release(gig_id).await?.ok_or(ServiceError::Escrow {
            gig_id,
            reason: "release row vanished after conflict".to_string(),
        })?;

        tracing::debug!("Escrow for gig {} was already released", gig_id);
        Ok(ReleaseReceipt {
            record,
            newly_released: false,
        })
    }

    async fn get_release(&self, gig_id: Uuid) -> Result<Option<EscrowReleaseRecord>, ServiceError> {
        let record = sqlx::query_as::<_, EscrowReleaseRecord>(
            r#"
            SELECT gig_id, payee_id, amount, released_at
            FROM escrow_releases
            WHERE gig_id = $1
            "#,
        )
        .bind(gig_id)
        .fetch_optional(&self.db_client.pool)
        .await?;

        Ok(record)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryEscrow {
    releases: Arc<RwLock<HashMap<Uuid, EscrowReleaseRecord>>>,
}

impl InMemoryEscrow {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn release_count(&self) -> usize {
        self.releases.read().await.len()
    }
}

#[async_trait]
impl EscrowRelease for InMemoryEscrow {
    async fn release(
        &self,
        gig_id: Uuid,
        payee_id: Uuid,
        amount: i64,
        at: DateTime<Utc>,
    ) -> Result<ReleaseReceipt, ServiceError> {
        let mut releases = self.releases.write().await;
        if let Some(existing) = releases.get(&gig_id) {
            return Ok(ReleaseReceipt {
                record: existing.clone(),
                newly_released: false,
            });
        }

        let record = EscrowReleaseRecord {
            gig_id,
            payee_id,
            amount,
            released_at: at,
        };
        releases.insert(gig_id, record.clone());
        tracing::info!("💸 Released {} to {} for gig {}", amount, payee_id, gig_id);

        Ok(ReleaseReceipt {
            record,
            newly_released: true,
        })
    }

    async fn get_release(&self, gig_id: Uuid) -> Result<Option<EscrowReleaseRecord>, ServiceError> {
        Ok(self.releases.read().await.get(&gig_id).cloned())
    }
}
