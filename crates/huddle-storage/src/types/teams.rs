//! Team and membership records.

use chrono::{DateTime, Utc};

use super::{CustomerId, TeamId, TeamRole};

/// Team record (billing unit)
#[derive(Clone, Debug)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    /// URL-safe unique identifier; immutable once routes depend on it.
    pub slug: String,
    pub image_url: Option<String>,
    /// Single active shareable code, overwritten on rotation, never versioned.
    pub shareable_invite_code: Option<String>,
    /// External billing-customer reference.
    pub billing_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Customer-to-team relation. Composite key (team_id, customer_id).
///
/// A team must keep at least one Owner at all times; the membership service
/// enforces this at removal/role-change time, not the storage layer.
#[derive(Clone, Debug)]
pub struct TeamMember {
    pub team_id: TeamId,
    pub customer_id: CustomerId,
    pub role: TeamRole,
    pub invited_by: Option<CustomerId>,
    pub joined_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a team
#[derive(Clone, Debug)]
pub struct CreateTeamParams {
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
}
