//! A bridge between heterogeneous blockchain networks and a job-trigger
//! consumer.
//!
//! The crate maintains a registry of subscriptions, each binding an external
//! job identifier to a chain endpoint and a chain-specific event filter. For
//! every subscription it keeps a live feed open (server-push over WebSocket or
//! periodic polling over HTTP), normalizes whatever the chain emits into
//! opaque events, and forwards each event to the downstream trigger client.
//!
//! Modules:
//! - `models`: domain types (endpoints, subscriptions, events) and runtime
//!   configuration
//! - `repositories`: the persistence collaborator storing endpoint and
//!   subscription records
//! - `services`: protocol codecs, transports, the subscription orchestrator
//!   and the trigger client
//! - `api`: the administrative HTTP surface used by the consumer to manage
//!   subscriptions and endpoints

pub mod api;
pub mod models;
pub mod repositories;
pub mod services;
