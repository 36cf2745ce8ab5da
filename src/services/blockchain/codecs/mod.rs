//! Protocol codec implementations.
//!
//! Contains codecs for the generic JSON-RPC chain families:
//! - Ethereum-compatible nodes (log filters, poll or push)
//! - Substrate-based nodes (storage subscriptions, push only)
//!
//! Chain families that do not speak JSON-RPC use a dedicated client under
//! `services::blockchain::clients` instead.

mod ethereum;
mod substrate;

pub use ethereum::EthereumCodec;
pub use substrate::SubstrateCodec;
