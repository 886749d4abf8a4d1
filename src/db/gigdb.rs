// db/gigdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::db::DBClient;
use crate::{
    models::{gigmodel::*, reviewmodel::GigReview},
    service::{
        completion_machine::{self, CompletionPolicy, GigCommand, Transition},
        error::ServiceError,
    },
};

/// Durable home of gigs, their confirmation records and reviews.
///
/// `apply_command` is the only way gig state changes after creation. It must
/// run the state machine and persist its result as one unit per gig, so two
/// concurrent confirmations can never both observe "first confirmer".
#[async_trait]
pub trait GigStore: Send + Sync + std::fmt::Debug {
    async fn insert_gig(&self, gig: &Gig) -> Result<(), ServiceError>;

    async fn get_gig(&self, gig_id: Uuid) -> Result<Option<Gig>, ServiceError>;

    async fn apply_command(
        &self,
        gig_id: Uuid,
        actor_id: Uuid,
        command: GigCommand,
        policy: CompletionPolicy,
        at: DateTime<Utc>,
    ) -> Result<(Gig, Transition), ServiceError>;

    /// Stamps `escrow_released_at` unless it is already set.
    async fn mark_escrow_released(
        &self,
        gig_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Gig, ServiceError>;

    /// Completed gigs whose payout was never acknowledged, oldest first.
    async fn completed_without_release(&self, limit: i64) -> Result<Vec<Gig>, ServiceError>;

    /// Gigs still waiting on a confirmation and untouched since `updated_before`.
    async fn stale_confirmations(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Gig>, ServiceError>;

    async fn insert_review(&self, review: &GigReview) -> Result<(), ServiceError>;

    async fn get_reviews(&self, gig_id: Uuid) -> Result<Vec<GigReview>, ServiceError>;
}

const GIG_COLUMNS: &str = "id, poster_id, seeker_id, title, description, budget, status, \
                           escrow_released_at, created_at, updated_at";

const CONFIRMATION_COLUMNS: &str = "gig_id, confirmed_by_seeker, confirmed_by_poster, \
                                    seeker_confirmed_at, poster_confirmed_at, created_at";

// Gig and confirmation columns from one LEFT JOIN, so a reader never pairs
// a status with a confirmation row from a different commit.
const JOINED_COLUMNS: &str = "g.id, g.poster_id, g.seeker_id, g.title, g.description, g.budget, \
                              g.status, g.escrow_released_at, g.created_at, g.updated_at, \
                              c.gig_id AS confirmation_gig_id, c.confirmed_by_seeker, \
                              c.confirmed_by_poster, c.seeker_confirmed_at, \
                              c.poster_confirmed_at, c.created_at AS confirmation_created_at";

const JOINED_FROM: &str = "gigs g LEFT JOIN completion_confirmations c ON c.gig_id = g.id";

fn into_gigs(rows: Vec<GigWithConfirmationRow>) -> Result<Vec<Gig>, ServiceError> {
    rows.into_iter()
        .map(|row| row.into_gig().map_err(ServiceError::from))
        .collect()
}

#[async_trait]
impl GigStore for DBClient {
    async fn insert_gig(&self, gig: &Gig) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO gigs (
                id, poster_id, seeker_id, title, description, budget,
                status, escrow_released_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(gig.id)
        .bind(gig.poster_id)
        .bind(gig.seeker_id())
        .bind(&gig.title)
        .bind(&gig.description)
        .bind(gig.budget)
        .bind(gig.status())
        .bind(gig.escrow_released_at)
        .bind(gig.created_at)
        .bind(gig.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_gig(&self, gig_id: Uuid) -> Result<Option<Gig>, ServiceError> {
        let sql = format!("SELECT {} FROM {} WHERE g.id = $1", JOINED_COLUMNS, JOINED_FROM);
        let row = sqlx::query_as::<_, GigWithConfirmationRow>(&sql)
            .bind(gig_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.into_gig().map_err(ServiceError::from))
            .transpose()
    }

    async fn apply_command(
        &self,
        gig_id: Uuid,
        actor_id: Uuid,
        command: GigCommand,
        policy: CompletionPolicy,
        at: DateTime<Utc>,
    ) -> Result<(Gig, Transition), ServiceError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serialises every writer of this gig until commit.
        let sql = format!("SELECT {} FROM gigs WHERE id = $1 FOR UPDATE", GIG_COLUMNS);
        let row = sqlx::query_as::<_, GigRow>(&sql)
            .bind(gig_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ServiceError::GigNotFound(gig_id))?;

        // Read after the lock is granted, so it sees whatever the previous
        // holder committed.
        let sql = format!(
            "SELECT {} FROM completion_confirmations WHERE gig_id = $1",
            CONFIRMATION_COLUMNS
        );
        let confirmation = sqlx::query_as::<_, CompletionConfirmation>(&sql)
            .bind(gig_id)
            .fetch_optional(&mut *tx)
            .await?;

        let mut gig = row.into_gig(confirmation)?;
        let transition = completion_machine::apply(&mut gig, actor_id, command, policy, at)?;

        sqlx::query(
            r#"
            UPDATE gigs
            SET status = $2, seeker_id = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(gig.id)
        .bind(gig.status())
        .bind(gig.seeker_id())
        .bind(gig.updated_at)
        .execute(&mut *tx)
        .await?;

        if let Some(record) = gig.confirmation() {
            // Flags are OR-ed and stamps coalesced so the row can only move forward.
            sqlx::query(
                r#"
                INSERT INTO completion_confirmations (
                    gig_id, confirmed_by_seeker, confirmed_by_poster,
                    seeker_confirmed_at, poster_confirmed_at, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (gig_id) DO UPDATE SET
                    confirmed_by_seeker = completion_confirmations.confirmed_by_seeker
                        OR EXCLUDED.confirmed_by_seeker,
                    confirmed_by_poster = completion_confirmations.confirmed_by_poster
                        OR EXCLUDED.confirmed_by_poster,
                    seeker_confirmed_at = COALESCE(
                        completion_confirmations.seeker_confirmed_at,
                        EXCLUDED.seeker_confirmed_at
                    ),
                    poster_confirmed_at = COALESCE(
                        completion_confirmations.poster_confirmed_at,
                        EXCLUDED.poster_confirmed_at
                    )
                "#,
            )
            .bind(record.gig_id)
            .bind(record.confirmed_by_seeker)
            .bind(record.confirmed_by_poster)
            .bind(record.seeker_confirmed_at)
            .bind(record.poster_confirmed_at)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "Gig {} moved {} -> {} by {} ({})",
            gig.id,
            transition.from,
            transition.to,
            actor_id,
            transition.party
        );

        Ok((gig, transition))
    }

    async fn mark_escrow_released(
        &self,
        gig_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Gig, ServiceError> {
        sqlx::query(
            r#"
            UPDATE gigs
            SET escrow_released_at = COALESCE(escrow_released_at, $2)
            WHERE id = $1 AND status = 'completed'::gig_status
            "#,
        )
        .bind(gig_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        self.get_gig(gig_id)
            .await?
            .ok_or(ServiceError::GigNotFound(gig_id))
    }

    async fn completed_without_release(&self, limit: i64) -> Result<Vec<Gig>, ServiceError> {
        let sql = format!(
            r#"
            SELECT {} FROM {}
            WHERE g.status = 'completed'::gig_status
            AND g.escrow_released_at IS NULL
            ORDER BY g.updated_at ASC
            LIMIT $1
            "#,
            JOINED_COLUMNS, JOINED_FROM
        );
        let rows = sqlx::query_as::<_, GigWithConfirmationRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        into_gigs(rows)
    }

    async fn stale_confirmations(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Gig>, ServiceError> {
        let sql = format!(
            r#"
            SELECT {} FROM {}
            WHERE g.status IN (
                'pending_completion'::gig_status,
                'awaiting_mutual_confirmation'::gig_status
            )
            AND g.updated_at < $1
            ORDER BY g.updated_at ASC
            LIMIT $2
            "#,
            JOINED_COLUMNS, JOINED_FROM
        );
        let rows = sqlx::query_as::<_, GigWithConfirmationRow>(&sql)
            .bind(updated_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        into_gigs(rows)
    }

    async fn insert_review(&self, review: &GigReview) -> Result<(), ServiceError> {
        let result = sqlx::query(
            r#"
            INSERT INTO gig_reviews (
                id, gig_id, reviewer_id, reviewee_id, rating, comment, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(review.id)
        .bind(review.gig_id)
        .bind(review.reviewer_id)
        .bind(review.reviewee_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(ServiceError::DuplicateReview {
                    gig_id: review.gig_id,
                    reviewer_id: review.reviewer_id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_reviews(&self, gig_id: Uuid) -> Result<Vec<GigReview>, ServiceError> {
        let reviews = sqlx::query_as::<_, GigReview>(
            r#"
            SELECT id, gig_id, reviewer_id, reviewee_id, rating, comment, created_at
            FROM gig_reviews
            WHERE gig_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(gig_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reviews)
    }
}
