//! Membership mutation service.
//!
//! Enforces the "a team never reaches zero owners" invariant before any
//! mutation; callers authorize separately via [`crate::policy::authorize`].

use std::sync::Arc;

use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::{info, warn};

use huddle_storage::{
    CreateEmailInviteParams, CreateTeamParams, CustomerId, EmailInvite, Store, StoreError, Team,
    TeamId, TeamRole,
};

use crate::invites::{InviteKind, InviteResolver};
use crate::CoreError;

const INVITE_CODE_LEN: usize = 32;

type SeatSyncError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Seam through which membership changes notify seat billing.
///
/// The reconciler in huddle-billing implements this. Failures never block the
/// membership operation in progress: the service logs them and moves on, and
/// webhook reconciliation repairs any drift later.
#[async_trait]
pub trait SeatSync: Send + Sync {
    async fn on_member_added(&self, team_id: &TeamId) -> Result<(), SeatSyncError>;
    async fn on_member_removed(&self, team_id: &TeamId) -> Result<(), SeatSyncError>;
}

/// No-op seat sync for teams without billing wired up, and for tests.
pub struct NoopSeatSync;

#[async_trait]
impl SeatSync for NoopSeatSync {
    async fn on_member_added(&self, _team_id: &TeamId) -> Result<(), SeatSyncError> {
        Ok(())
    }

    async fn on_member_removed(&self, _team_id: &TeamId) -> Result<(), SeatSyncError> {
        Ok(())
    }
}

/// Membership mutations over a [`Store`], with seat-billing notifications.
pub struct MembershipService<S, R> {
    store: Arc<S>,
    seats: Arc<R>,
}

impl<S: Store, R: SeatSync> MembershipService<S, R> {
    pub fn new(store: Arc<S>, seats: Arc<R>) -> Self {
        Self { store, seats }
    }

    /// Onboarding path: create a team with `owner` as its first Owner and
    /// mark it active for them.
    pub async fn create_team(
        &self,
        name: &str,
        slug: &str,
        owner: &CustomerId,
    ) -> Result<Team, CoreError> {
        validate_slug(slug)?;

        let params = CreateTeamParams {
            name: name.to_owned(),
            slug: slug.to_owned(),
            image_url: None,
        };
        let team = self.store.create_team(&params).await.map_err(|e| match e {
            StoreError::AlreadyExists => CoreError::SlugTaken,
            e => CoreError::Storage(e),
        })?;

        self.store
            .add_team_member(&team.id, owner, TeamRole::Owner, None)
            .await?;
        self.store.set_active_team(owner, &team.id).await?;

        info!(team_id = %team.id.0, slug = %team.slug, "team created");
        Ok(team)
    }

    /// not-member -> role. The caller has already authorized the mutation.
    pub async fn add_member(
        &self,
        team_id: &TeamId,
        customer_id: &CustomerId,
        role: TeamRole,
        invited_by: Option<CustomerId>,
    ) -> Result<(), CoreError> {
        self.store
            .add_team_member(team_id, customer_id, role, invited_by)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists => CoreError::AlreadyMember,
                e => CoreError::Storage(e),
            })?;

        // First team a customer joins becomes their active one.
        if self.store.get_active_team(customer_id).await?.is_none() {
            self.store.set_active_team(customer_id, team_id).await?;
        }

        info!(
            team_id = %team_id.0,
            customer_id = %customer_id.0,
            role = role.as_str(),
            "member added"
        );

        // Seat billing lag is tolerated; a member is never blocked from
        // joining because billing is unreachable.
        if let Err(e) = self.seats.on_member_added(team_id).await {
            warn!(team_id = %team_id.0, error = %e, "seat increase deferred to webhook reconciliation");
        }

        Ok(())
    }

    /// any-role -> new_role, except a transition that would leave the team
    /// with zero owners.
    pub async fn change_role(
        &self,
        team_id: &TeamId,
        customer_id: &CustomerId,
        new_role: TeamRole,
    ) -> Result<(), CoreError> {
        let member = self
            .store
            .get_team_member(team_id, customer_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => CoreError::NotFound,
                e => CoreError::Storage(e),
            })?;

        if member.role == TeamRole::Owner && new_role != TeamRole::Owner {
            self.ensure_not_last_owner(team_id).await?;
        }

        self.store
            .update_team_member_role(team_id, customer_id, new_role)
            .await?;

        info!(
            team_id = %team_id.0,
            customer_id = %customer_id.0,
            role = new_role.as_str(),
            "member role changed"
        );
        Ok(())
    }

    /// any-role -> not-member, except for the last owner.
    pub async fn remove_member(
        &self,
        team_id: &TeamId,
        customer_id: &CustomerId,
    ) -> Result<(), CoreError> {
        let member = self
            .store
            .get_team_member(team_id, customer_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => CoreError::NotFound,
                e => CoreError::Storage(e),
            })?;

        if member.role == TeamRole::Owner {
            self.ensure_not_last_owner(team_id).await?;
        }

        self.store.remove_team_member(team_id, customer_id).await?;

        if self.store.get_active_team(customer_id).await?.as_ref() == Some(team_id) {
            self.store.clear_active_team(customer_id).await?;
        }

        info!(team_id = %team_id.0, customer_id = %customer_id.0, "member removed");

        // Deferred decrease: the committed seat count shrinks at the period
        // boundary, not here.
        if let Err(e) = self.seats.on_member_removed(team_id).await {
            warn!(team_id = %team_id.0, error = %e, "seat release not recorded");
        }

        Ok(())
    }

    /// Issue (or reissue) an email invite. Any outstanding invite for the
    /// same (team, email) pair is replaced.
    pub async fn send_email_invite(
        &self,
        team_id: &TeamId,
        email: &str,
        role: TeamRole,
        invited_by: &CustomerId,
    ) -> Result<EmailInvite, CoreError> {
        if email.is_empty() || !email.contains('@') {
            return Err(CoreError::InvalidEmail);
        }

        let params = CreateEmailInviteParams {
            team_id: team_id.clone(),
            email: email.to_owned(),
            role,
            code: generate_invite_code(),
            invited_by: invited_by.clone(),
        };
        let invite = self.store.create_email_invite(&params).await?;

        info!(
            team_id = %team_id.0,
            email = %invite.email,
            role = role.as_str(),
            "email invite created"
        );
        Ok(invite)
    }

    /// Delete an email invite if present. Canceling a nonexistent invite is
    /// not an error.
    pub async fn cancel_email_invite(&self, team_id: &TeamId, code: &str) -> Result<(), CoreError> {
        match self.store.delete_email_invite(team_id, code).await {
            Ok(()) => {
                info!(team_id = %team_id.0, "email invite canceled");
                Ok(())
            }
            Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Regenerate the team's shareable invite code. Previously issued links
    /// become invalid immediately.
    pub async fn refresh_shareable_invite(&self, team_id: &TeamId) -> Result<String, CoreError> {
        // surface a missing team as NotFound before minting a code
        self.store.get_team(team_id).await.map_err(|e| match e {
            StoreError::NotFound => CoreError::NotFound,
            e => CoreError::Storage(e),
        })?;

        let code = generate_invite_code();
        self.store
            .set_shareable_invite_code(team_id, Some(code.clone()))
            .await?;

        info!(team_id = %team_id.0, "shareable invite code rotated");
        Ok(code)
    }

    /// Clear the team's shareable invite code entirely.
    pub async fn clear_shareable_invite(&self, team_id: &TeamId) -> Result<(), CoreError> {
        self.store.set_shareable_invite_code(team_id, None).await?;
        info!(team_id = %team_id.0, "shareable invite code cleared");
        Ok(())
    }

    /// Resolve a code and join the team with whatever role it grants,
    /// consuming the email invite if that is what the code was.
    pub async fn redeem_invite(
        &self,
        team_id: &TeamId,
        code: &str,
        customer_id: &CustomerId,
    ) -> Result<TeamRole, CoreError> {
        let resolved = InviteResolver::new(Arc::clone(&self.store))
            .resolve(team_id, code)
            .await?;

        self.add_member(team_id, customer_id, resolved.role, resolved.invited_by)
            .await?;

        if resolved.kind == InviteKind::Email {
            match self.store.delete_email_invite(team_id, code).await {
                Ok(()) | Err(StoreError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(resolved.role)
    }

    async fn ensure_not_last_owner(&self, team_id: &TeamId) -> Result<(), CoreError> {
        let owners = self.store.count_team_owners(team_id).await?;
        if owners <= 1 {
            return Err(CoreError::LastOwner);
        }
        Ok(())
    }
}

fn validate_slug(slug: &str) -> Result<(), CoreError> {
    if slug.is_empty()
        || !slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(CoreError::InvalidSlug);
    }
    Ok(())
}

fn generate_invite_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(INVITE_CODE_LEN)
        .map(char::from)
        .collect()
}
