//! Strongly-typed identifiers (avoid mixing strings/UUIDs arbitrarily).

use uuid::Uuid;

/// Customer identifier, issued by the identity collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CustomerId(pub Uuid);

/// Team identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TeamId(pub Uuid);
