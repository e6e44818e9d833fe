//! Invite code resolution.

use std::sync::Arc;

use huddle_storage::{CustomerId, Store, StoreError, TeamId, TeamRole};

use crate::CoreError;

/// What kind of invite a code turned out to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InviteKind {
    /// Targeted email invite carrying an explicit role; single use per email.
    Email,
    /// The team's shareable code; reusable, always grants Member.
    Shareable,
}

/// A resolved invite code.
#[derive(Clone, Debug)]
pub struct ResolvedInvite {
    pub kind: InviteKind,
    pub role: TeamRole,
    pub code: String,
    /// Inviter provenance; only known for email invites.
    pub invited_by: Option<CustomerId>,
}

/// Resolves an invite code against a team.
pub struct InviteResolver<S> {
    store: Arc<S>,
}

impl<S: Store> InviteResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve `code` for a team.
    ///
    /// Email invites are checked before the shareable code. The order is a
    /// deliberate tie-break: email invites carry an explicit role, so a
    /// targeted admin invite must never be silently downgraded to Member if
    /// the two codes ever collide.
    pub async fn resolve(&self, team_id: &TeamId, code: &str) -> Result<ResolvedInvite, CoreError> {
        match self.store.get_email_invite_by_code(team_id, code).await {
            Ok(invite) => {
                return Ok(ResolvedInvite {
                    kind: InviteKind::Email,
                    role: invite.role,
                    code: invite.code,
                    invited_by: Some(invite.invited_by),
                });
            }
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        let team = match self.store.get_team(team_id).await {
            Ok(team) => team,
            Err(StoreError::NotFound) => return Err(CoreError::InviteNotFound),
            Err(e) => return Err(e.into()),
        };

        match team.shareable_invite_code {
            Some(ref shareable) if shareable == code => Ok(ResolvedInvite {
                kind: InviteKind::Shareable,
                role: TeamRole::Member,
                code: code.to_owned(),
                invited_by: None,
            }),
            _ => Err(CoreError::InviteNotFound),
        }
    }
}
