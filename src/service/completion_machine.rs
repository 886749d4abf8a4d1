// service/completion_machine.rs
//
// Pure transition rules for a gig. Stores call `apply` inside whatever
// per-gig critical section they provide and persist the result.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    models::gigmodel::*,
    service::error::{CompletionError, GigAction},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GigCommand {
    AssignSeeker { seeker_id: Uuid },
    InitiateCompletion,
    ConfirmCompletion,
}

impl GigCommand {
    pub fn action(&self) -> GigAction {
        match self {
            GigCommand::AssignSeeker { .. } => GigAction::AssignSeeker,
            GigCommand::InitiateCompletion => GigAction::InitiateCompletion,
            GigCommand::ConfirmCompletion => GigAction::ConfirmCompletion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionPolicy {
    /// Initiating completion also records the initiator's confirmation, so
    /// only the counterpart has to confirm afterwards.
    pub initiator_confirms: bool,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            initiator_confirms: true,
        }
    }
}

/// What a successful command did to a gig.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub gig_id: Uuid,
    pub actor_id: Uuid,
    pub party: Party,
    pub action: GigAction,
    pub from: GigStatus,
    pub to: GigStatus,
    pub at: DateTime<Utc>,
}

impl Transition {
    /// True only for the single transition that closed the gig.
    pub fn reached_completion(&self) -> bool {
        self.to == GigStatus::Completed && self.from != GigStatus::Completed
    }
}

/// Runs `command` for `actor_id` against `gig`. On error the gig is left
/// exactly as it was.
///
/// Guards are checked in a fixed order: the actor must be a party (or the
/// poster, for assignment), then the status must allow the command, then a
/// party may not confirm twice.
pub fn apply(
    gig: &mut Gig,
    actor_id: Uuid,
    command: GigCommand,
    policy: CompletionPolicy,
    at: DateTime<Utc>,
) -> Result<Transition, CompletionError> {
    let action = command.action();
    let party = gig.party_of(actor_id).ok_or(CompletionError::Forbidden {
        gig_id: gig.id,
        actor_id,
        action,
    })?;
    let from = gig.status();

    let next = match command {
        GigCommand::AssignSeeker { seeker_id } => assign(gig, party, actor_id, seeker_id)?,
        GigCommand::InitiateCompletion => initiate(gig, party, policy, at)?,
        GigCommand::ConfirmCompletion => confirm(gig, party, actor_id, at)?,
    };

    gig.stage = next;
    gig.updated_at = at;

    Ok(Transition {
        gig_id: gig.id,
        actor_id,
        party,
        action,
        from,
        to: gig.status(),
        at,
    })
}

fn invalid_state(gig: &Gig, action: GigAction) -> CompletionError {
    CompletionError::InvalidState {
        gig_id: gig.id,
        status: gig.status(),
        action,
    }
}

fn assign(
    gig: &Gig,
    party: Party,
    actor_id: Uuid,
    seeker_id: Uuid,
) -> Result<GigStage, CompletionError> {
    if party != Party::Poster {
        return Err(CompletionError::Forbidden {
            gig_id: gig.id,
            actor_id,
            action: GigAction::AssignSeeker,
        });
    }
    match gig.stage {
        GigStage::Open => Ok(GigStage::Assigned { seeker_id }),
        _ => Err(invalid_state(gig, GigAction::AssignSeeker)),
    }
}

fn initiate(
    gig: &Gig,
    party: Party,
    policy: CompletionPolicy,
    at: DateTime<Utc>,
) -> Result<GigStage, CompletionError> {
    let seeker_id = match gig.stage {
        GigStage::Assigned { seeker_id } => seeker_id,
        _ => return Err(invalid_state(gig, GigAction::InitiateCompletion)),
    };

    let mut confirmation = CompletionConfirmation::new(gig.id, at);
    if policy.initiator_confirms {
        confirmation.mark_confirmed(party, at);
    }

    Ok(GigStage::PendingCompletion {
        seeker_id,
        confirmation,
    })
}

fn confirm(
    gig: &Gig,
    party: Party,
    actor_id: Uuid,
    at: DateTime<Utc>,
) -> Result<GigStage, CompletionError> {
    let (seeker_id, current) = match &gig.stage {
        GigStage::PendingCompletion {
            seeker_id,
            confirmation,
        }
        | GigStage::AwaitingMutualConfirmation {
            seeker_id,
            confirmation,
        } => (*seeker_id, confirmation),
        _ => return Err(invalid_state(gig, GigAction::ConfirmCompletion)),
    };

    let mut confirmation = current.clone();
    if !confirmation.mark_confirmed(party, at) {
        return Err(CompletionError::AlreadyConfirmed {
            gig_id: gig.id,
            actor_id,
        });
    }

    if confirmation.is_mutual() {
        Ok(GigStage::Completed {
            seeker_id,
            confirmation,
        })
    } else {
        Ok(GigStage::AwaitingMutualConfirmation {
            seeker_id,
            confirmation,
        })
    }
}

/// Read model handed to observers after every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionStatus {
    pub gig_id: Uuid,
    pub gig_status: GigStatus,
    pub confirmation: Option<CompletionConfirmation>,
    pub mutually_confirmed: bool,
    pub can_initiate_completion: bool,
    pub can_confirm_completion: bool,
    pub can_submit_reviews: bool,
}

/// Derives the capability flags for `viewer`.
///
/// Without a viewer, `can_confirm_completion` reports whether any party is
/// still expected to confirm. A viewer who is not a party can never confirm.
pub fn completion_status(gig: &Gig, viewer: Option<Uuid>) -> CompletionStatus {
    let status = gig.status();
    let confirmation = gig.confirmation().cloned();
    let mutually_confirmed = gig.is_mutually_confirmed();

    let can_confirm_completion = status.is_confirming()
        && match (viewer, confirmation.as_ref()) {
            (Some(viewer_id), Some(record)) => gig
                .party_of(viewer_id)
                .map_or(false, |party| !record.has_confirmed(party)),
            (None, Some(record)) => !record.is_mutual(),
            (_, None) => false,
        };

    CompletionStatus {
        gig_id: gig.id,
        gig_status: status,
        confirmation,
        mutually_confirmed,
        can_initiate_completion: status == GigStatus::Assigned,
        can_confirm_completion,
        can_submit_reviews: status == GigStatus::Completed,
    }
}
