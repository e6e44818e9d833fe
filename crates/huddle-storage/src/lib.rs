//! Storage abstraction for huddle.
//!
//! Backend crates (e.g. huddle-store-sqlite) implement the [`Store`] trait so
//! the domain crates don't depend on any specific database engine or schema
//! details.

mod store;
mod types;

use thiserror::Error;

#[cfg(feature = "test-support")]
pub use store::MockStore;
pub use store::Store;
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}
