//! Email invite records.

use chrono::{DateTime, Utc};

use super::{CustomerId, TeamId, TeamRole};

/// Pending email invite. Composite key (team_id, email): at most one
/// outstanding invite per address, replaced when a new one is issued.
#[derive(Clone, Debug)]
pub struct EmailInvite {
    pub team_id: TeamId,
    pub email: String,
    /// Role granted on acceptance.
    pub role: TeamRole,
    /// Rotating code carried in the invite link.
    pub code: String,
    pub invited_by: CustomerId,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating an email invite
#[derive(Clone, Debug)]
pub struct CreateEmailInviteParams {
    pub team_id: TeamId,
    pub email: String,
    pub role: TeamRole,
    pub code: String,
    pub invited_by: CustomerId,
}
