// service/notification_service.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{
    escrowmodel::EscrowReleaseRecord,
    gigmodel::{Gig, GigStatus, Party},
    reviewmodel::GigReview,
};
use crate::service::completion_machine::Transition;

/// Published after every successful mutation so observers can re-fetch the
/// gig instead of polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletionEvent {
    GigPosted {
        gig_id: Uuid,
        poster_id: Uuid,
    },
    SeekerAssigned {
        gig_id: Uuid,
        seeker_id: Uuid,
    },
    CompletionInitiated {
        gig_id: Uuid,
        initiated_by: Uuid,
        party: Party,
    },
    CompletionConfirmed {
        gig_id: Uuid,
        confirmed_by: Uuid,
        party: Party,
        status: GigStatus,
    },
    MutuallyConfirmed {
        gig_id: Uuid,
        completed_at: DateTime<Utc>,
    },
    EscrowReleased {
        gig_id: Uuid,
        payee_id: Uuid,
        amount: i64,
    },
    ConfirmationReminder {
        gig_id: Uuid,
        user_id: Uuid,
        party: Party,
    },
    ReviewSubmitted {
        gig_id: Uuid,
        reviewer_id: Uuid,
        reviewee_id: Uuid,
        rating: i32,
    },
}

impl CompletionEvent {
    pub fn gig_id(&self) -> Uuid {
        match self {
            CompletionEvent::GigPosted { gig_id, .. }
            | CompletionEvent::SeekerAssigned { gig_id, .. }
            | CompletionEvent::CompletionInitiated { gig_id, .. }
            | CompletionEvent::CompletionConfirmed { gig_id, .. }
            | CompletionEvent::MutuallyConfirmed { gig_id, .. }
            | CompletionEvent::EscrowReleased { gig_id, .. }
            | CompletionEvent::ConfirmationReminder { gig_id, .. }
            | CompletionEvent::ReviewSubmitted { gig_id, .. } => *gig_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationService {
    sender: broadcast::Sender<CompletionEvent>,
}

impl NotificationService {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CompletionEvent> {
        self.sender.subscribe()
    }

    // Nobody listening is not an error.
    fn publish(&self, event: CompletionEvent) {
        let gig_id = event.gig_id();
        if self.sender.send(event).is_err() {
            tracing::debug!("No subscribers for event on gig {}", gig_id);
        }
    }

    pub fn notify_gig_posted(&self, gig: &Gig) {
        tracing::info!("📢 Gig posted: {} ({}) by {}", gig.title, gig.id, gig.poster_id);
        self.publish(CompletionEvent::GigPosted {
            gig_id: gig.id,
            poster_id: gig.poster_id,
        });
    }

    pub fn notify_seeker_assigned(&self, gig_id: Uuid, seeker_id: Uuid) {
        tracing::info!("👷 Seeker {} assigned to gig {}", seeker_id, gig_id);
        self.publish(CompletionEvent::SeekerAssigned { gig_id, seeker_id });
    }

    pub fn notify_completion_initiated(&self, transition: &Transition) {
        tracing::info!(
            "📝 Completion of gig {} initiated by {} ({})",
            transition.gig_id,
            transition.actor_id,
            transition.party
        );
        self.publish(CompletionEvent::CompletionInitiated {
            gig_id: transition.gig_id,
            initiated_by: transition.actor_id,
            party: transition.party,
        });
    }

    pub fn notify_completion_confirmed(&self, transition: &Transition) {
        tracing::info!(
            "✅ Gig {} confirmed by {} ({}), now {}",
            transition.gig_id,
            transition.actor_id,
            transition.party,
            transition.to
        );
        self.publish(CompletionEvent::CompletionConfirmed {
            gig_id: transition.gig_id,
            confirmed_by: transition.actor_id,
            party: transition.party,
            status: transition.to,
        });

        if transition.reached_completion() {
            tracing::info!("🎉 Gig {} mutually confirmed", transition.gig_id);
            self.publish(CompletionEvent::MutuallyConfirmed {
                gig_id: transition.gig_id,
                completed_at: transition.at,
            });
        }
    }

    pub fn notify_escrow_released(&self, record: &EscrowReleaseRecord) {
        tracing::info!(
            "💰 Escrow for gig {} released to {}: {}",
            record.gig_id,
            record.payee_id,
            record.amount
        );
        self.publish(CompletionEvent::EscrowReleased {
            gig_id: record.gig_id,
            payee_id: record.payee_id,
            amount: record.amount,
        });
    }

    pub fn notify_confirmation_reminder(&self, gig_id: Uuid, user_id: Uuid, party: Party) {
        tracing::info!(
            "⏰ Reminding {} {} to confirm completion of gig {}",
            party,
            user_id,
            gig_id
        );
        self.publish(CompletionEvent::ConfirmationReminder {
            gig_id,
            user_id,
            party,
        });
    }

    pub fn notify_review_submitted(&self, review: &GigReview) {
        tracing::info!(
            "⭐ Review {} for gig {}: {} rated {} {}/5",
            review.id,
            review.gig_id,
            review.reviewer_id,
            review.reviewee_id,
            review.rating
        );
        self.publish(CompletionEvent::ReviewSubmitted {
            gig_id: review.gig_id,
            reviewer_id: review.reviewer_id,
            reviewee_id: review.reviewee_id,
            rating: review.rating,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::error::GigAction;

    fn transition(from: GigStatus, to: GigStatus) -> Transition {
        Transition {
            gig_id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
            party: Party::Poster,
            action: GigAction::ConfirmCompletion,
            from,
            to,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn closing_confirmation_emits_mutual_event() {
        let notifications = NotificationService::new(16);
        let mut events = notifications.subscribe();
        let closing = transition(GigStatus::PendingCompletion, GigStatus::Completed);

        notifications.notify_completion_confirmed(&closing);

        let first = events.recv().await.unwrap();
        assert!(matches!(first, CompletionEvent::CompletionConfirmed { status: GigStatus::Completed, .. }));
        let second = events.recv().await.unwrap();
        assert_eq!(
            second,
            CompletionEvent::MutuallyConfirmed {
                gig_id: closing.gig_id,
                completed_at: closing.at,
            }
        );
    }

    #[tokio::test]
    async fn partial_confirmation_emits_single_event() {
        let notifications = NotificationService::new(16);
        let mut events = notifications.subscribe();
        let partial = transition(GigStatus::PendingCompletion, GigStatus::AwaitingMutualConfirmation);

        notifications.notify_completion_confirmed(&partial);

        assert_eq!(events.recv().await.unwrap().gig_id(), partial.gig_id);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let notifications = NotificationService::new(1);
        notifications.notify_seeker_assigned(Uuid::new_v4(), Uuid::new_v4());
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let gig_id = Uuid::new_v4();
        let value = serde_json::to_value(CompletionEvent::MutuallyConfirmed {
            gig_id,
            completed_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(value["kind"], "mutually_confirmed");
        assert_eq!(value["gig_id"], gig_id.to_string());
    }
}
