//! Role policy for team-scoped authorization.

use huddle_storage::{TeamMember, TeamRole};

/// Decide whether a stored membership satisfies a required role.
///
/// Pure and total over the role lattice (member < admin < owner): a missing
/// relation is never authorized, and a role authorizes every requirement at
/// or below its own rank.
pub fn authorize(membership: Option<&TeamMember>, required: TeamRole) -> bool {
    match membership {
        Some(member) => member.role.rank() >= required.rank(),
        None => false,
    }
}
