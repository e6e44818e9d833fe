//! Domain services for huddle team membership.
//!
//! These services are invoked as library logic by an HTTP action layer that
//! owns routing, sessions, status codes, and serialization. Identity is
//! resolved by the caller; [`policy::authorize`] is the primitive the caller
//! uses for role checks before invoking a mutation.

pub mod invites;
pub mod membership;
pub mod policy;

use huddle_storage::StoreError;
use thiserror::Error;

pub use invites::{InviteKind, InviteResolver, ResolvedInvite};
pub use membership::{MembershipService, NoopSeatSync, SeatSync};
pub use policy::authorize;

/// Domain errors surfaced to the action layer.
///
/// All of these are recoverable conditions the caller turns into user-facing
/// messages; none is used for control flow elsewhere in the system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The mutation would leave the team with zero owners.
    #[error("team must keep at least one owner")]
    LastOwner,
    #[error("invite invalid or expired")]
    InviteNotFound,
    #[error("team slug is already taken")]
    SlugTaken,
    #[error("slug must contain only lowercase letters, numbers, and hyphens")]
    InvalidSlug,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("already a member of this team")]
    AlreadyMember,
    #[error("not found")]
    NotFound,
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}
