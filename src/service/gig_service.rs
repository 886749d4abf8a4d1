// service/gig_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{cache::StatusCache, gigdb::GigStore},
    models::{gigmodel::*, reviewmodel::GigReview},
    service::{
        completion_machine::{CompletionPolicy, GigCommand},
        error::{CompletionError, GigAction, ServiceError},
        notification_service::NotificationService,
    },
};

/// Reads a gig through the status cache, filling it on a miss.
pub async fn fetch_gig(
    store: &dyn GigStore,
    cache: &StatusCache,
    gig_id: Uuid,
) -> Result<Gig, ServiceError> {
    if let Some(gig) = cache.get_gig(gig_id).await {
        return Ok(gig);
    }

    let seen = cache.generation().await;
    let gig = store
        .get_gig(gig_id)
        .await?
        .ok_or(ServiceError::GigNotFound(gig_id))?;
    cache.fill(&gig, seen).await;
    Ok(gig)
}

/// Gig lifecycle around the completion protocol: posting, assignment and
/// the reviews unlocked by completion.
#[derive(Debug, Clone)]
pub struct GigService {
    store: Arc<dyn GigStore>,
    notifications: NotificationService,
    cache: StatusCache,
}

impl GigService {
    pub fn new(store: Arc<dyn GigStore>, notifications: NotificationService, cache: StatusCache) -> Self {
        Self {
            store,
            notifications,
            cache,
        }
    }

    pub async fn create_gig(
        &self,
        poster_id: Uuid,
        title: String,
        description: String,
        budget: i64,
    ) -> Result<Gig, ServiceError> {
        if budget < 0 {
            return Err(ServiceError::Validation("Budget cannot be negative".to_string()));
        }

        let gig = Gig::new(poster_id, title, description, budget, Utc::now());
        self.store.insert_gig(&gig).await?;
        self.cache.invalidate(gig.id).await;
        self.notifications.notify_gig_posted(&gig);

        Ok(gig)
    }

    pub async fn assign_seeker(
        &self,
        gig_id: Uuid,
        poster_id: Uuid,
        seeker_id: Uuid,
    ) -> Result<Gig, ServiceError> {
        if seeker_id == poster_id {
            return Err(ServiceError::Validation(
                "A poster cannot be assigned to their own gig".to_string(),
            ));
        }

        let (gig, _) = self
            .store
            .apply_command(
                gig_id,
                poster_id,
                GigCommand::AssignSeeker { seeker_id },
                CompletionPolicy::default(),
                Utc::now(),
            )
            .await?;
        self.cache.invalidate(gig_id).await;
        self.notifications.notify_seeker_assigned(gig_id, seeker_id);

        Ok(gig)
    }

    pub async fn get_gig(&self, gig_id: Uuid) -> Result<Gig, ServiceError> {
        fetch_gig(self.store.as_ref(), &self.cache, gig_id).await
    }

    /// Each party may review the other once, and only after both confirmed.
    pub async fn submit_review(
        &self,
        gig_id: Uuid,
        reviewer_id: Uuid,
        rating: i32,
        comment: String,
    ) -> Result<GigReview, ServiceError> {
        if !(1..=5).contains(&rating) {
            return Err(ServiceError::Validation(
                "Rating must be between 1 and 5".to_string(),
            ));
        }

        let gig = self.get_gig(gig_id).await?;
        let party = gig.party_of(reviewer_id).ok_or(CompletionError::Forbidden {
            gig_id,
            actor_id: reviewer_id,
            action: GigAction::SubmitReview,
        })?;
        if gig.status() != GigStatus::Completed {
            return Err(CompletionError::InvalidState {
                gig_id,
                status: gig.status(),
                action: GigAction::SubmitReview,
            }
            .into());
        }
        let reviewee_id = gig.user_for(party.counterpart()).ok_or(ServiceError::InvalidGigRecord(
            InvalidGigRow {
                gig_id,
                reason: "completed gig without a seeker".to_string(),
            },
        ))?;

        let review = GigReview {
            id: Uuid::new_v4(),
            gig_id,
            reviewer_id,
            reviewee_id,
            rating,
            comment,
            created_at: Utc::now(),
        };
        self.store.insert_review(&review).await?;
        self.notifications.notify_review_submitted(&review);

        Ok(review)
    }

    pub async fn list_reviews(&self, gig_id: Uuid) -> Result<Vec<GigReview>, ServiceError> {
        self.get_gig(gig_id).await?;
        self.store.get_reviews(gig_id).await
    }
}
