// service/completion_service.rs
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::{cache::StatusCache, gigdb::GigStore},
    models::gigmodel::*,
    service::{
        completion_machine::{self, CompletionPolicy, CompletionStatus, GigCommand, Transition},
        error::ServiceError,
        escrow_service::EscrowRelease,
        gig_service::fetch_gig,
        notification_service::NotificationService,
    },
};

#[derive(Debug, Clone, Serialize)]
pub struct InitiateOutcome {
    pub gig: Gig,
    pub status: GigStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmOutcome {
    pub gig: Gig,
    pub status: GigStatus,
    pub mutually_confirmed: bool,
    /// Whether the payout is known to have gone through. A failed release is
    /// picked up again by the reconciliation job.
    pub escrow_released: bool,
}

/// Runs the mutual confirmation protocol and everything hanging off it:
/// cache invalidation, notifications and the escrow payout.
#[derive(Debug, Clone)]
pub struct CompletionService {
    store: Arc<dyn GigStore>,
    escrow: Arc<dyn EscrowRelease>,
    notifications: NotificationService,
    cache: StatusCache,
    policy: CompletionPolicy,
}

impl CompletionService {
    pub fn new(
        store: Arc<dyn GigStore>,
        escrow: Arc<dyn EscrowRelease>,
        notifications: NotificationService,
        cache: StatusCache,
        policy: CompletionPolicy,
    ) -> Self {
        Self {
            store,
            escrow,
            notifications,
            cache,
            policy,
        }
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    async fn run(
        &self,
        gig_id: Uuid,
        actor_id: Uuid,
        command: GigCommand,
    ) -> Result<(Gig, Transition), ServiceError> {
        match self
            .store
            .apply_command(gig_id, actor_id, command, self.policy, Utc::now())
            .await
        {
            Ok(outcome) => {
                self.cache.invalidate(gig_id).await;
                Ok(outcome)
            }
            Err(ServiceError::Completion(e)) => {
                if e.is_benign_replay() {
                    tracing::debug!("Replayed {} on gig {} by {}: {}", command.action(), gig_id, actor_id, e);
                } else {
                    tracing::warn!("Rejected {} on gig {} by {}: {}", command.action(), gig_id, actor_id, e);
                }
                Err(e.into())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn initiate_completion(
        &self,
        gig_id: Uuid,
        actor_id: Uuid,
    ) -> Result<InitiateOutcome, ServiceError> {
        let (gig, transition) = self.run(gig_id, actor_id, GigCommand::InitiateCompletion).await?;
        self.notifications.notify_completion_initiated(&transition);

        Ok(InitiateOutcome {
            status: gig.status(),
            gig,
        })
    }

    pub async fn confirm_completion(
        &self,
        gig_id: Uuid,
        actor_id: Uuid,
    ) -> Result<ConfirmOutcome, ServiceError> {
        let (mut gig, transition) = self.run(gig_id, actor_id, GigCommand::ConfirmCompletion).await?;
        self.notifications.notify_completion_confirmed(&transition);

        // Only the committed transition into `completed` triggers the payout.
        let mut escrow_released = false;
        if transition.reached_completion() {
            match self.release_escrow(&gig).await {
                Ok(updated) => {
                    gig = updated;
                    escrow_released = true;
                }
                Err(e) => {
                    tracing::error!("❌ Escrow release for gig {} failed, will retry: {}", gig_id, e);
                }
            }
        }

        Ok(ConfirmOutcome {
            status: gig.status(),
            mutually_confirmed: gig.is_mutually_confirmed(),
            gig,
            escrow_released,
        })
    }

    pub async fn get_completion_status(
        &self,
        gig_id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<CompletionStatus, ServiceError> {
        let gig = fetch_gig(self.store.as_ref(), &self.cache, gig_id).await?;
        Ok(completion_machine::completion_status(&gig, viewer))
    }

    /// Pays the seeker of a completed gig. Safe to call repeatedly.
    pub async fn release_escrow(&self, gig: &Gig) -> Result<Gig, ServiceError> {
        let seeker_id = match (&gig.stage, gig.is_mutually_confirmed()) {
            (GigStage::Completed { seeker_id, .. }, true) => *seeker_id,
            _ => {
                return Err(ServiceError::Escrow {
                    gig_id: gig.id,
                    reason: format!("gig is {}, not completed", gig.status()),
                })
            }
        };

        let receipt = self
            .escrow
            .release(gig.id, seeker_id, gig.budget, Utc::now())
            .await?;
        if receipt.newly_released {
            self.notifications.notify_escrow_released(&receipt.record);
        }

        let updated = self
            .store
            .mark_escrow_released(gig.id, receipt.record.released_at)
            .await?;
        self.cache.invalidate(gig.id).await;

        Ok(updated)
    }

    /// Replays the payout for completed gigs that never got their release
    /// stamped. Returns how many were settled.
    pub async fn reconcile_escrow_releases(&self, limit: i64) -> Result<usize, ServiceError> {
        let pending = self.store.completed_without_release(limit).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        tracing::info!("🔁 Reconciling escrow for {} completed gig(s)", pending.len());
        let mut settled = 0;
        for gig in pending {
            match self.release_escrow(&gig).await {
                Ok(_) => settled += 1,
                Err(e) => tracing::error!("Escrow reconciliation failed for gig {}: {}", gig.id, e),
            }
        }

        Ok(settled)
    }

    /// Nudges every party that still owes a confirmation on gigs untouched
    /// for longer than `threshold`. Never changes gig state.
    pub async fn send_confirmation_reminders(
        &self,
        threshold: Duration,
        limit: i64,
    ) -> Result<usize, ServiceError> {
        let stale = self
            .store
            .stale_confirmations(Utc::now() - threshold, limit)
            .await?;

        let mut sent = 0;
        for gig in &stale {
            let Some(record) = gig.confirmation() else {
                continue;
            };
            for party in [Party::Poster, Party::Seeker] {
                if record.has_confirmed(party) {
                    continue;
                }
                if let Some(user_id) = gig.user_for(party) {
                    self.notifications.notify_confirmation_reminder(gig.id, user_id, party);
                    sent += 1;
                }
            }
        }

        Ok(sent)
    }
}
