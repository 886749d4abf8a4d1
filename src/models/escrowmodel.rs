use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Proof that a gig's held funds went to its seeker. Keyed by gig, so a gig
/// can be paid out at most once.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EscrowReleaseRecord {
    pub gig_id: Uuid,
    pub payee_id: Uuid,
    pub amount: i64,
    pub released_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ReleaseReceipt {
    pub record: EscrowReleaseRecord,
    /// `false` when an earlier call had already released this gig.
    pub newly_released: bool,
}
