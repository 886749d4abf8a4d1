use std::fmt;

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    models::gigmodel::{GigStatus, InvalidGigRow},
};

/// Operations guarded by the gig state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GigAction {
    AssignSeeker,
    InitiateCompletion,
    ConfirmCompletion,
    SubmitReview,
}

impl fmt::Display for GigAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GigAction::AssignSeeker => "assign a seeker to",
            GigAction::InitiateCompletion => "initiate completion of",
            GigAction::ConfirmCompletion => "confirm completion of",
            GigAction::SubmitReview => "submit a review for",
        };
        f.write_str(label)
    }
}

/// Rejections of the completion protocol. All of them are user-facing and
/// leave the gig untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("Cannot {action} gig {gig_id} while it is {status}")]
    InvalidState {
        gig_id: Uuid,
        status: GigStatus,
        action: GigAction,
    },

    #[error("User {actor_id} is not allowed to {action} gig {gig_id}")]
    Forbidden {
        gig_id: Uuid,
        actor_id: Uuid,
        action: GigAction,
    },

    #[error("User {actor_id} has already confirmed completion of gig {gig_id}")]
    AlreadyConfirmed { gig_id: Uuid, actor_id: Uuid },
}

impl CompletionError {
    /// A retried write that lands here means the state the caller wanted was
    /// already reached by an earlier, unacknowledged attempt.
    pub fn is_benign_replay(&self) -> bool {
        match self {
            CompletionError::AlreadyConfirmed { .. } => true,
            CompletionError::InvalidState { action, status, .. } => matches!(
                (action, status),
                (GigAction::InitiateCompletion, GigStatus::PendingCompletion)
                    | (GigAction::InitiateCompletion, GigStatus::AwaitingMutualConfirmation)
                    | (GigAction::InitiateCompletion, GigStatus::Completed)
                    | (GigAction::ConfirmCompletion, GigStatus::Completed)
            ),
            CompletionError::Forbidden { .. } => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("Gig {0} not found")]
    GigNotFound(Uuid),

    #[error(transparent)]
    InvalidGigRecord(#[from] InvalidGigRow),

    #[error("User {reviewer_id} has already reviewed gig {gig_id}")]
    DuplicateReview { gig_id: Uuid, reviewer_id: Uuid },

    #[error("Escrow release failed for gig {gig_id}: {reason}")]
    Escrow { gig_id: Uuid, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Completion(CompletionError::InvalidState { .. })
            | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::Completion(CompletionError::Forbidden { .. }) => StatusCode::FORBIDDEN,

            ServiceError::Completion(CompletionError::AlreadyConfirmed { .. })
            | ServiceError::DuplicateReview { .. } => StatusCode::CONFLICT,

            ServiceError::GigNotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::InvalidGigRecord(_)
            | ServiceError::Escrow { .. }
            | ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", error);
            return HttpError::server_error(ErrorMessage::ServerError.to_string());
        }
        HttpError::new(error.to_string(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_map_to_client_statuses() {
        let gig_id = Uuid::new_v4();
        let actor_id = Uuid::new_v4();

        let invalid: HttpError = ServiceError::from(CompletionError::InvalidState {
            gig_id,
            status: GigStatus::Assigned,
            action: GigAction::ConfirmCompletion,
        })
        .into();
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
        assert!(invalid.message.contains("while it is assigned"));

        let forbidden: HttpError = ServiceError::from(CompletionError::Forbidden {
            gig_id,
            actor_id,
            action: GigAction::InitiateCompletion,
        })
        .into();
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

        let repeated: HttpError =
            ServiceError::from(CompletionError::AlreadyConfirmed { gig_id, actor_id }).into();
        assert_eq!(repeated.status, StatusCode::CONFLICT);
    }

    #[test]
    fn infrastructure_errors_hide_details() {
        let err: HttpError = ServiceError::Escrow {
            gig_id: Uuid::new_v4(),
            reason: "provider timeout".to_string(),
        }
        .into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("provider"));
    }

    #[test]
    fn replays_of_reached_states_are_benign() {
        let gig_id = Uuid::new_v4();
        let actor_id = Uuid::new_v4();

        assert!(CompletionError::AlreadyConfirmed { gig_id, actor_id }.is_benign_replay());
        assert!(CompletionError::InvalidState {
            gig_id,
            status: GigStatus::PendingCompletion,
            action: GigAction::InitiateCompletion,
        }
        .is_benign_replay());
        assert!(!CompletionError::InvalidState {
            gig_id,
            status: GigStatus::Assigned,
            action: GigAction::ConfirmCompletion,
        }
        .is_benign_replay());
        assert!(!CompletionError::Forbidden {
            gig_id,
            actor_id,
            action: GigAction::ConfirmCompletion,
        }
        .is_benign_replay());
    }
}
