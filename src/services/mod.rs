//! Service layer.
//!
//! - `blockchain`: protocol codecs, transports and the connection resolver
//! - `orchestrator`: subscription lifecycle service and event relay
//! - `trigger`: downstream job-trigger client

pub mod blockchain;
pub mod orchestrator;
pub mod trigger;
