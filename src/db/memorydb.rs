// db/memorydb.rs
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::gigdb::GigStore;
use crate::{
    models::{gigmodel::*, reviewmodel::GigReview},
    service::{
        completion_machine::{self, CompletionPolicy, GigCommand, Transition},
        error::ServiceError,
    },
};

/// Process-local store. Each gig sits behind its own mutex, so commands on
/// one gig are serialised while different gigs proceed independently.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGigStore {
    gigs: Arc<RwLock<HashMap<Uuid, Arc<Mutex<Gig>>>>>,
    reviews: Arc<RwLock<HashMap<Uuid, Vec<GigReview>>>>,
}

impl InMemoryGigStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, gig_id: Uuid) -> Result<Arc<Mutex<Gig>>, ServiceError> {
        self.gigs
            .read()
            .await
            .get(&gig_id)
            .cloned()
            .ok_or(ServiceError::GigNotFound(gig_id))
    }

    async fn snapshot_where<F>(&self, keep: F) -> Vec<Gig>
    where
        F: Fn(&Gig) -> bool,
    {
        let slots: Vec<Arc<Mutex<Gig>>> = self.gigs.read().await.values().cloned().collect();

        let mut matching = Vec::new();
        for slot in slots {
            let gig = slot.lock().await;
            if keep(&gig) {
                matching.push(gig.clone());
            }
        }
        matching.sort_by_key(|gig| gig.updated_at);
        matching
    }
}

#[async_trait]
impl GigStore for InMemoryGigStore {
    async fn insert_gig(&self, gig: &Gig) -> Result<(), ServiceError> {
        let mut gigs = self.gigs.write().await;
        if gigs.contains_key(&gig.id) {
            return Err(ServiceError::Validation(format!("Gig {} already exists", gig.id)));
        }
        gigs.insert(gig.id, Arc::new(Mutex::new(gig.clone())));
        Ok(())
    }

    async fn get_gig(&self, gig_id: Uuid) -> Result<Option<Gig>, ServiceError> {
        match self.slot(gig_id).await {
            Ok(slot) => Ok(Some(slot.lock().await.clone())),
            Err(ServiceError::GigNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn apply_command(
        &self,
        gig_id: Uuid,
        actor_id: Uuid,
        command: GigCommand,
        policy: CompletionPolicy,
        at: DateTime<Utc>,
    ) -> Result<(Gig, Transition), ServiceError> {
        let slot = self.slot(gig_id).await?;
        let mut current = slot.lock().await;

        let mut next = current.clone();
        let transition = completion_machine::apply(&mut next, actor_id, command, policy, at)?;
        *current = next.clone();

        Ok((next, transition))
    }

    async fn mark_escrow_released(
        &self,
        gig_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Gig, ServiceError> {
        let slot = self.slot(gig_id).await?;
        let mut gig = slot.lock().await;
        if gig.status() == GigStatus::Completed && gig.escrow_released_at.is_none() {
            gig.escrow_released_at = Some(at);
        }
        Ok(gig.clone())
    }

    async fn completed_without_release(&self, limit: i64) -> Result<Vec<Gig>, ServiceError> {
        let mut gigs = self
            .snapshot_where(|gig| {
                gig.status() == GigStatus::Completed && gig.escrow_released_at.is_none()
            })
            .await;
        gigs.truncate(limit.max(0) as usize);
        Ok(gigs)
    }

    async fn stale_confirmations(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Gig>, ServiceError> {
        let mut gigs = self
            .snapshot_where(|gig| gig.status().is_confirming() && gig.updated_at < updated_before)
            .await;
        gigs.truncate(limit.max(0) as usize);
        Ok(gigs)
    }

    async fn insert_review(&self, review: &GigReview) -> Result<(), ServiceError> {
        let mut reviews = self.reviews.write().await;
        let for_gig = reviews.entry(review.gig_id).or_default();
        if for_gig.iter().any(|r| r.reviewer_id == review.reviewer_id) {
            return Err(ServiceError::DuplicateReview {
                gig_id: review.gig_id,
                reviewer_id: review.reviewer_id,
            });
        }
        for_gig.push(review.clone());
        Ok(())
    }

    async fn get_reviews(&self, gig_id: Uuid) -> Result<Vec<GigReview>, ServiceError> {
        Ok(self
            .reviews
            .read()
            .await
            .get(&gig_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::error::CompletionError;

    async fn seeded(store: &InMemoryGigStore) -> (Uuid, Uuid, Uuid) {
        let poster = Uuid::new_v4();
        let seeker = Uuid::new_v4();
        let gig = Gig::new(
            poster,
            "Assemble wardrobe".to_string(),
            "Flat-pack, tools on site".to_string(),
            12_000,
            Utc::now(),
        );
        store.insert_gig(&gig).await.unwrap();
        store
            .apply_command(
                gig.id,
                poster,
                GigCommand::AssignSeeker { seeker_id: seeker },
                CompletionPolicy::default(),
                Utc::now(),
            )
            .await
            .unwrap();
        (gig.id, poster, seeker)
    }

    #[tokio::test]
    async fn rejected_command_leaves_stored_gig_untouched() {
        let store = InMemoryGigStore::new();
        let (gig_id, _, _) = seeded(&store).await;
        let before = store.get_gig(gig_id).await.unwrap().unwrap();

        let err = store
            .apply_command(
                gig_id,
                Uuid::new_v4(),
                GigCommand::InitiateCompletion,
                CompletionPolicy::default(),
                Utc::now(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Completion(CompletionError::Forbidden { .. })
        ));
        assert_eq!(store.get_gig(gig_id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn concurrent_confirmations_complete_exactly_once() {
        let store = InMemoryGigStore::new();
        let policy = CompletionPolicy {
            initiator_confirms: false,
        };

        for _ in 0..25 {
            let (gig_id, poster, seeker) = seeded(&store).await;
            store
                .apply_command(gig_id, poster, GigCommand::InitiateCompletion, policy, Utc::now())
                .await
                .unwrap();

            let handles: Vec<_> = [poster, seeker]
                .into_iter()
                .map(|actor| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        store
                            .apply_command(gig_id, actor, GigCommand::ConfirmCompletion, policy, Utc::now())
                            .await
                    })
                })
                .collect();

            let mut completions = 0;
            for outcome in futures::future::join_all(handles).await {
                let (_, transition) = outcome.unwrap().unwrap();
                if transition.reached_completion() {
                    completions += 1;
                }
            }
            assert_eq!(completions, 1);
        }
    }

    #[tokio::test]
    async fn unknown_gig_is_not_found() {
        let store = InMemoryGigStore::new();
        let missing = Uuid::new_v4();

        assert!(store.get_gig(missing).await.unwrap().is_none());
        let err = store
            .apply_command(
                missing,
                Uuid::new_v4(),
                GigCommand::ConfirmCompletion,
                CompletionPolicy::default(),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::GigNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn stale_confirmations_only_lists_waiting_gigs() {
        let store = InMemoryGigStore::new();
        let (waiting, _, seeker) = seeded(&store).await;
        let (idle, _, _) = seeded(&store).await;
        let started = Utc::now() - chrono::Duration::days(4);
        store
            .apply_command(
                waiting,
                seeker,
                GigCommand::InitiateCompletion,
                CompletionPolicy::default(),
                started,
            )
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(3);
        let stale = store.stale_confirmations(cutoff, 10).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, waiting);
        assert!(stale.iter().all(|gig| gig.id != idle));

        assert!(store
            .stale_confirmations(started - chrono::Duration::hours(1), 10)
            .await
            .unwrap()
            .is_empty());
    }
}
