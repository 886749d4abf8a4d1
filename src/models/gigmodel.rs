use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "gig_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GigStatus {
    Open,
    Assigned,
    PendingCompletion,
    AwaitingMutualConfirmation,
    Completed,
}

impl GigStatus {
    pub fn to_str(&self) -> &str {
        match self {
            GigStatus::Open => "open",
            GigStatus::Assigned => "assigned",
            GigStatus::PendingCompletion => "pending_completion",
            GigStatus::AwaitingMutualConfirmation => "awaiting_mutual_confirmation",
            GigStatus::Completed => "completed",
        }
    }

    /// True while the gig is waiting on at least one party's confirmation.
    pub fn is_confirming(&self) -> bool {
        matches!(
            self,
            GigStatus::PendingCompletion | GigStatus::AwaitingMutualConfirmation
        )
    }
}

impl fmt::Display for GigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

/// Which side of a gig a user is on.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Poster,
    Seeker,
}

impl Party {
    pub fn counterpart(&self) -> Party {
        match self {
            Party::Poster => Party::Seeker,
            Party::Seeker => Party::Poster,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Poster => f.write_str("poster"),
            Party::Seeker => f.write_str("seeker"),
        }
    }
}

/// Audit record of both parties agreeing that the work is done.
///
/// Flags only ever move from `false` to `true`, and each timestamp is written
/// once, together with its flag.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CompletionConfirmation {
    pub gig_id: Uuid,
    pub confirmed_by_seeker: bool,
    pub confirmed_by_poster: bool,
    pub seeker_confirmed_at: Option<DateTime<Utc>>,
    pub poster_confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CompletionConfirmation {
    pub fn new(gig_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            gig_id,
            confirmed_by_seeker: false,
            confirmed_by_poster: false,
            seeker_confirmed_at: None,
            poster_confirmed_at: None,
            created_at,
        }
    }

    pub fn has_confirmed(&self, party: Party) -> bool {
        match party {
            Party::Poster => self.confirmed_by_poster,
            Party::Seeker => self.confirmed_by_seeker,
        }
    }

    /// Sets the party's flag. Returns `false` (and changes nothing) when the
    /// party had already confirmed.
    pub fn mark_confirmed(&mut self, party: Party, at: DateTime<Utc>) -> bool {
        let (flag, stamp) = match party {
            Party::Poster => (&mut self.confirmed_by_poster, &mut self.poster_confirmed_at),
            Party::Seeker => (&mut self.confirmed_by_seeker, &mut self.seeker_confirmed_at),
        };
        if *flag {
            return false;
        }
        *flag = true;
        *stamp = Some(at);
        true
    }

    pub fn is_mutual(&self) -> bool {
        self.confirmed_by_seeker && self.confirmed_by_poster
    }
}

/// Where a gig sits in its lifecycle. A seeker exists from `Assigned` on and
/// a confirmation record exists from `PendingCompletion` on.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GigStage {
    Open,
    Assigned {
        seeker_id: Uuid,
    },
    PendingCompletion {
        seeker_id: Uuid,
        confirmation: CompletionConfirmation,
    },
    AwaitingMutualConfirmation {
        seeker_id: Uuid,
        confirmation: CompletionConfirmation,
    },
    Completed {
        seeker_id: Uuid,
        confirmation: CompletionConfirmation,
    },
}

impl GigStage {
    pub fn status(&self) -> GigStatus {
        match self {
            GigStage::Open => GigStatus::Open,
            GigStage::Assigned { .. } => GigStatus::Assigned,
            GigStage::PendingCompletion { .. } => GigStatus::PendingCompletion,
            GigStage::AwaitingMutualConfirmation { .. } => GigStatus::AwaitingMutualConfirmation,
            GigStage::Completed { .. } => GigStatus::Completed,
        }
    }

    pub fn seeker_id(&self) -> Option<Uuid> {
        match self {
            GigStage::Open => None,
            GigStage::Assigned { seeker_id }
            | GigStage::PendingCompletion { seeker_id, .. }
            | GigStage::AwaitingMutualConfirmation { seeker_id, .. }
            | GigStage::Completed { seeker_id, .. } => Some(*seeker_id),
        }
    }

    pub fn confirmation(&self) -> Option<&CompletionConfirmation> {
        match self {
            GigStage::Open | GigStage::Assigned { .. } => None,
            GigStage::PendingCompletion { confirmation, .. }
            | GigStage::AwaitingMutualConfirmation { confirmation, .. }
            | GigStage::Completed { confirmation, .. } => Some(confirmation),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Gig {
    pub id: Uuid,
    pub poster_id: Uuid,
    pub title: String,
    pub description: String,
    /// Amount held in escrow, in minor currency units.
    pub budget: i64,
    #[serde(flatten)]
    pub stage: GigStage,
    pub escrow_released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Gig {
    pub fn new(
        poster_id: Uuid,
        title: String,
        description: String,
        budget: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            poster_id,
            title,
            description,
            budget,
            stage: GigStage::Open,
            escrow_released_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> GigStatus {
        self.stage.status()
    }

    pub fn seeker_id(&self) -> Option<Uuid> {
        self.stage.seeker_id()
    }

    pub fn confirmation(&self) -> Option<&CompletionConfirmation> {
        self.stage.confirmation()
    }

    pub fn party_of(&self, user_id: Uuid) -> Option<Party> {
        if user_id == self.poster_id {
            Some(Party::Poster)
        } else if self.seeker_id() == Some(user_id) {
            Some(Party::Seeker)
        } else {
            None
        }
    }

    pub fn user_for(&self, party: Party) -> Option<Uuid> {
        match party {
            Party::Poster => Some(self.poster_id),
            Party::Seeker => self.seeker_id(),
        }
    }

    pub fn is_mutually_confirmed(&self) -> bool {
        self.confirmation().map_or(false, |c| c.is_mutual())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Gig record {gig_id} is inconsistent: {reason}")]
pub struct InvalidGigRow {
    pub gig_id: Uuid,
    pub reason: String,
}

/// Flat shape of the `gigs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GigRow {
    pub id: Uuid,
    pub poster_id: Uuid,
    pub seeker_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub budget: i64,
    pub status: GigStatus,
    pub escrow_released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GigRow {
    pub fn into_gig(
        self,
        confirmation: Option<CompletionConfirmation>,
    ) -> Result<Gig, InvalidGigRow> {
        let gig_id = self.id;
        let invalid = |reason: &str| InvalidGigRow {
            gig_id,
            reason: reason.to_string(),
        };

        let stage = match (self.status, self.seeker_id, confirmation) {
            (GigStatus::Open, None, None) => GigStage::Open,
            (GigStatus::Open, Some(_), _) => return Err(invalid("open gig has a seeker")),
            (GigStatus::Open, None, Some(_)) | (GigStatus::Assigned, _, Some(_)) => {
                return Err(invalid("confirmation exists before completion was initiated"))
            }
            (_, None, _) => return Err(invalid("seeker missing after assignment")),
            (GigStatus::Assigned, Some(seeker_id), None) => GigStage::Assigned { seeker_id },
            (_, Some(_), None) => return Err(invalid("confirmation record missing")),
            (
                GigStatus::PendingCompletion | GigStatus::AwaitingMutualConfirmation,
                Some(_),
                Some(confirmation),
            ) if confirmation.is_mutual() => {
                return Err(invalid("both parties confirmed but gig is not completed"))
            }
            (GigStatus::PendingCompletion, Some(seeker_id), Some(confirmation)) => {
                GigStage::PendingCompletion { seeker_id, confirmation }
            }
            (GigStatus::AwaitingMutualConfirmation, Some(seeker_id), Some(confirmation)) => {
                GigStage::AwaitingMutualConfirmation { seeker_id, confirmation }
            }
            (GigStatus::Completed, Some(seeker_id), Some(confirmation)) => {
                if !confirmation.is_mutual() {
                    return Err(invalid("completed without both confirmations"));
                }
                GigStage::Completed { seeker_id, confirmation }
            }
        };

        Ok(Gig {
            id: self.id,
            poster_id: self.poster_id,
            title: self.title,
            description: self.description,
            budget: self.budget,
            stage,
            escrow_released_at: self.escrow_released_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// A `gigs` row joined with its confirmation, so both come from one snapshot.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GigWithConfirmationRow {
    #[sqlx(flatten)]
    pub gig: GigRow,
    pub confirmation_gig_id: Option<Uuid>,
    pub confirmed_by_seeker: Option<bool>,
    pub confirmed_by_poster: Option<bool>,
    pub seeker_confirmed_at: Option<DateTime<Utc>>,
    pub poster_confirmed_at: Option<DateTime<Utc>>,
    pub confirmation_created_at: Option<DateTime<Utc>>,
}

impl GigWithConfirmationRow {
    pub fn into_gig(self) -> Result<Gig, InvalidGigRow> {
        let confirmation = match (self.confirmation_gig_id, self.confirmation_created_at) {
            (Some(gig_id), Some(created_at)) => Some(CompletionConfirmation {
                gig_id,
                confirmed_by_seeker: self.confirmed_by_seeker.unwrap_or(false),
                confirmed_by_poster: self.confirmed_by_poster.unwrap_or(false),
                seeker_confirmed_at: self.seeker_confirmed_at,
                poster_confirmed_at: self.poster_confirmed_at,
                created_at,
            }),
            _ => None,
        };
        self.gig.into_gig(confirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: GigStatus, seeker_id: Option<Uuid>) -> GigRow {
        let now = Utc::now();
        GigRow {
            id: Uuid::new_v4(),
            poster_id: Uuid::new_v4(),
            seeker_id,
            title: "Fix the fence".to_string(),
            description: "Replace two broken panels".to_string(),
            budget: 15_000,
            status,
            escrow_released_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn mark_confirmed_is_one_way() {
        let now = Utc::now();
        let mut confirmation = CompletionConfirmation::new(Uuid::new_v4(), now);

        assert!(confirmation.mark_confirmed(Party::Seeker, now));
        let stamped = confirmation.seeker_confirmed_at;
        assert!(!confirmation.mark_confirmed(Party::Seeker, now + chrono::Duration::hours(1)));

        assert!(confirmation.confirmed_by_seeker);
        assert_eq!(confirmation.seeker_confirmed_at, stamped);
        assert!(!confirmation.has_confirmed(Party::Poster));
        assert!(!confirmation.is_mutual());
    }

    #[test]
    fn assigned_row_becomes_assigned_stage() {
        let seeker = Uuid::new_v4();
        let gig = row(GigStatus::Assigned, Some(seeker)).into_gig(None).unwrap();

        assert_eq!(gig.stage, GigStage::Assigned { seeker_id: seeker });
        assert_eq!(gig.party_of(seeker), Some(Party::Seeker));
        assert_eq!(gig.party_of(gig.poster_id), Some(Party::Poster));
        assert_eq!(gig.party_of(Uuid::new_v4()), None);
    }

    #[test]
    fn rows_breaking_the_stage_shape_are_rejected() {
        assert!(row(GigStatus::Open, Some(Uuid::new_v4())).into_gig(None).is_err());
        assert!(row(GigStatus::Assigned, None).into_gig(None).is_err());
        assert!(row(GigStatus::PendingCompletion, Some(Uuid::new_v4()))
            .into_gig(None)
            .is_err());

        let half = row(GigStatus::Completed, Some(Uuid::new_v4()));
        let mut confirmation = CompletionConfirmation::new(half.id, Utc::now());
        confirmation.mark_confirmed(Party::Poster, Utc::now());
        assert!(half.into_gig(Some(confirmation)).is_err());

        // A confirmation that already closed cannot sit under a confirming status.
        for status in [GigStatus::PendingCompletion, GigStatus::AwaitingMutualConfirmation] {
            let behind = row(status, Some(Uuid::new_v4()));
            let mut both = CompletionConfirmation::new(behind.id, Utc::now());
            both.mark_confirmed(Party::Seeker, Utc::now());
            both.mark_confirmed(Party::Poster, Utc::now());
            let err = behind.into_gig(Some(both)).unwrap_err();
            assert!(err.reason.contains("not completed"));
        }
    }

    fn joined(
        status: GigStatus,
        seeker_id: Option<Uuid>,
        confirmation: Option<&CompletionConfirmation>,
    ) -> GigWithConfirmationRow {
        let mut gig = row(status, seeker_id);
        if let Some(c) = confirmation {
            gig.id = c.gig_id;
        }
        GigWithConfirmationRow {
            gig,
            confirmation_gig_id: confirmation.map(|c| c.gig_id),
            confirmed_by_seeker: confirmation.map(|c| c.confirmed_by_seeker),
            confirmed_by_poster: confirmation.map(|c| c.confirmed_by_poster),
            seeker_confirmed_at: confirmation.and_then(|c| c.seeker_confirmed_at),
            poster_confirmed_at: confirmation.and_then(|c| c.poster_confirmed_at),
            confirmation_created_at: confirmation.map(|c| c.created_at),
        }
    }

    #[test]
    fn joined_rows_carry_their_confirmation() {
        let seeker = Uuid::new_v4();
        let now = Utc::now();

        let assigned = joined(GigStatus::Assigned, Some(seeker), None).into_gig().unwrap();
        assert_eq!(assigned.stage, GigStage::Assigned { seeker_id: seeker });

        let mut pending = CompletionConfirmation::new(Uuid::new_v4(), now);
        pending.mark_confirmed(Party::Seeker, now);
        let gig = joined(GigStatus::PendingCompletion, Some(seeker), Some(&pending))
            .into_gig()
            .unwrap();
        assert_eq!(gig.confirmation(), Some(&pending));

        // Status and record read together must agree; a completed record under
        // a pending status is refused rather than served.
        let mut done = pending.clone();
        done.mark_confirmed(Party::Poster, now);
        assert!(joined(GigStatus::PendingCompletion, Some(seeker), Some(&done))
            .into_gig()
            .is_err());
        assert!(joined(GigStatus::Completed, Some(seeker), Some(&done))
            .into_gig()
            .unwrap()
            .is_mutually_confirmed());
    }

    #[test]
    fn gig_json_carries_flattened_status() {
        let seeker = Uuid::new_v4();
        let gig = row(GigStatus::Assigned, Some(seeker)).into_gig(None).unwrap();

        let value = serde_json::to_value(&gig).unwrap();
        assert_eq!(value["status"], "assigned");
        assert_eq!(value["seeker_id"], seeker.to_string());

        let back: Gig = serde_json::from_value(value).unwrap();
        assert_eq!(back, gig);
    }
}
