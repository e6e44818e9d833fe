//! The Store trait that backends implement.

use crate::types::*;
use crate::StoreError;

/// The storage trait the domain crates depend on.
///
/// Membership and subscription rows are shared mutable state guarded by the
/// backend's own transaction semantics; invariant checks (last owner, invite
/// uniqueness) live in the services on top of this trait.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Teams ──────────────────────────────────────────

    /// Create a new team. A duplicate slug is rejected with `AlreadyExists`.
    async fn create_team(&self, params: &CreateTeamParams) -> Result<Team, StoreError>;

    /// Get team by ID.
    async fn get_team(&self, team_id: &TeamId) -> Result<Team, StoreError>;

    /// Get team by slug.
    async fn get_team_by_slug(&self, slug: &str) -> Result<Team, StoreError>;

    /// Get the team linked to an external billing customer.
    async fn get_team_by_billing_customer(
        &self,
        billing_customer_id: &str,
    ) -> Result<Team, StoreError>;

    /// Overwrite the team's shareable invite code (`None` clears it).
    async fn set_shareable_invite_code(
        &self,
        team_id: &TeamId,
        code: Option<String>,
    ) -> Result<(), StoreError>;

    /// Link the team to an external billing customer.
    async fn set_team_billing_customer(
        &self,
        team_id: &TeamId,
        billing_customer_id: &str,
    ) -> Result<(), StoreError>;

    // ───────────────────────────────────── Members ────────────────────────────────────────

    /// Add a customer to a team with a role. Duplicate membership is
    /// `AlreadyExists`.
    async fn add_team_member(
        &self,
        team_id: &TeamId,
        customer_id: &CustomerId,
        role: TeamRole,
        invited_by: Option<CustomerId>,
    ) -> Result<(), StoreError>;

    /// Get a customer's membership in a team.
    async fn get_team_member(
        &self,
        team_id: &TeamId,
        customer_id: &CustomerId,
    ) -> Result<TeamMember, StoreError>;

    /// List all members of a team.
    async fn list_team_members(&self, team_id: &TeamId) -> Result<Vec<TeamMember>, StoreError>;

    /// Count members in a team.
    async fn count_team_members(&self, team_id: &TeamId) -> Result<i32, StoreError>;

    /// Count members holding the Owner role.
    async fn count_team_owners(&self, team_id: &TeamId) -> Result<i32, StoreError>;

    /// Update a member's role.
    async fn update_team_member_role(
        &self,
        team_id: &TeamId,
        customer_id: &CustomerId,
        role: TeamRole,
    ) -> Result<(), StoreError>;

    /// Remove a customer from a team.
    async fn remove_team_member(
        &self,
        team_id: &TeamId,
        customer_id: &CustomerId,
    ) -> Result<(), StoreError>;

    // ───────────────────────────────────── Email invites ──────────────────────────────────

    /// Create an email invite, replacing any outstanding invite for the same
    /// (team, email) pair.
    async fn create_email_invite(
        &self,
        params: &CreateEmailInviteParams,
    ) -> Result<EmailInvite, StoreError>;

    /// Look up an invite by its code within a team.
    async fn get_email_invite_by_code(
        &self,
        team_id: &TeamId,
        code: &str,
    ) -> Result<EmailInvite, StoreError>;

    /// List outstanding invites for a team.
    async fn list_email_invites(&self, team_id: &TeamId) -> Result<Vec<EmailInvite>, StoreError>;

    /// Delete an invite by code (cancellation or consumption).
    async fn delete_email_invite(&self, team_id: &TeamId, code: &str) -> Result<(), StoreError>;

    // ───────────────────────────────────── Active team ────────────────────────────────────

    /// Get the team a customer currently has active, if any.
    async fn get_active_team(&self, customer_id: &CustomerId) -> Result<Option<TeamId>, StoreError>;

    /// Point the customer's active-team marker at a team.
    async fn set_active_team(
        &self,
        customer_id: &CustomerId,
        team_id: &TeamId,
    ) -> Result<(), StoreError>;

    /// Clear the customer's active-team marker.
    async fn clear_active_team(&self, customer_id: &CustomerId) -> Result<(), StoreError>;

    // ───────────────────────────────────── Subscriptions ──────────────────────────────────

    /// Get a team's subscription, if it has one.
    async fn get_subscription(&self, team_id: &TeamId) -> Result<Option<Subscription>, StoreError>;

    /// Insert-or-replace a subscription keyed on its external id. Safe to call
    /// repeatedly with the same payload (webhook redelivery).
    async fn upsert_subscription(
        &self,
        params: &UpsertSubscriptionParams,
    ) -> Result<Subscription, StoreError>;

    /// Set the committed quantity and current-period seat count.
    async fn set_subscription_seats(
        &self,
        team_id: &TeamId,
        quantity: i32,
    ) -> Result<(), StoreError>;

    /// Mark the subscription with this external id as canceled.
    async fn mark_subscription_canceled(&self, external_id: &str) -> Result<(), StoreError>;
}
