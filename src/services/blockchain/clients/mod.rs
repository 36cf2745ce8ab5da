//! Dedicated chain clients.
//!
//! Chain families whose node interface is not JSON-RPC bypass the generic
//! codec/transport pairing and implement the event source contract directly:
//! - Tezos client driving the node's REST shell (head monitor + per-block
//!   operation scans)

mod tezos;

pub use tezos::TezosClient;
