//! Type definitions for huddle storage.

mod ids;
mod invites;
mod roles;
mod subscriptions;
mod teams;

// Re-export all types from submodules
pub use ids::*;
pub use invites::*;
pub use roles::*;
pub use subscriptions::*;
pub use teams::*;
