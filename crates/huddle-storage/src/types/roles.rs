//! Role types for team membership.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role within a team.
///
/// Roles form an ordered lattice: every owner is also an admin, every admin is
/// also a member. Authorization compares ranks instead of enumerating pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    /// Full control, billing, can delete the team
    Owner,
    /// Manage members and settings, but not billing
    Admin,
    /// Access to the team based on permissions
    Member,
}

/// Error type for parsing TeamRole from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTeamRoleError(pub String);

impl std::fmt::Display for ParseTeamRoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid team role: {}", self.0)
    }
}

impl std::error::Error for ParseTeamRoleError {}

impl FromStr for TeamRole {
    type Err = ParseTeamRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(TeamRole::Owner),
            "admin" => Ok(TeamRole::Admin),
            "member" => Ok(TeamRole::Member),
            _ => Err(ParseTeamRoleError(s.to_string())),
        }
    }
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Owner => "owner",
            TeamRole::Admin => "admin",
            TeamRole::Member => "member",
        }
    }

    /// Position in the role lattice (member=0, admin=1, owner=2).
    pub fn rank(&self) -> u8 {
        match self {
            TeamRole::Owner => 2,
            TeamRole::Admin => 1,
            TeamRole::Member => 0,
        }
    }

    /// Check if this role has at least the permissions of another role
    pub fn includes(&self, other: &TeamRole) -> bool {
        self.rank() >= other.rank()
    }
}
