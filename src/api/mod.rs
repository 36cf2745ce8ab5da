//! Administrative HTTP surface.
//!
//! A thin CRUD layer over the orchestrator, consumed by the downstream
//! job-trigger consumer: create/delete subscriptions and create/fetch
//! endpoints, all gated by a shared-secret header pair. Health is ungated.

mod server;

pub use server::{router, ApiState, ACCESS_KEY_HEADER, SECRET_HEADER};
