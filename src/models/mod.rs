//! Domain models and data structures for the event initiator.
//!
//! This module contains the core data structures used throughout the
//! application:
//!
//! - `core`: domain models (Endpoint, Subscription, Event)
//! - `config`: runtime configuration for the binary

mod config;
mod core;

pub use config::AppConfig;
pub use core::{ChainFilter, ChainKind, Endpoint, Event, Subscription};
