//! Persistence layer for endpoint and subscription records.
//!
//! Provides the storage contract the orchestrator depends on, plus a
//! file-backed implementation storing records as a JSON document. Deletion is
//! a soft delete: records carry an explicit lifecycle stamp and a deleted
//! endpoint is restored by re-saving the same name.

mod error;
mod store;

pub use error::RepositoryError;
pub use store::{FileStore, SubscriptionStore};
