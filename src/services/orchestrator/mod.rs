//! Subscription orchestration.
//!
//! The orchestrator owns the set of currently-live subscriptions, drives
//! their lifecycle (bulk load at startup, add, remove, shutdown) and relays
//! every received event to the downstream trigger client. It includes:
//! - The service owning the job registry and the administrative operations
//! - The per-subscription relay loop
//! - Error handling specific to subscription management

mod error;
mod relay;
mod service;

pub use error::OrchestratorError;
pub use relay::spawn_relay;
pub use service::{Service, SubscriptionManager};
