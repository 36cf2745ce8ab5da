//! Chain connectivity: codecs, transports and the connection resolver.
//!
//! Provides the pieces that turn a chain endpoint into a stream of events:
//!
//! - Protocol codecs building chain requests and parsing chain responses
//! - Poll and push transports streaming codec-produced events into a channel
//! - Dedicated clients for chain families that bypass the generic codecs
//! - The resolver mapping an endpoint's chain kind to one of the above

mod clients;
mod codec;
mod codecs;
mod resolver;
mod transports;

pub use clients::TezosClient;
pub use codec::{CodecError, JsonRpcEnvelope, ProtocolCodec, JSON_RPC_VERSION};
pub use codecs::{EthereumCodec, SubstrateCodec};
pub use resolver::{resolve, ResolveError};
pub use transports::{
	default_http_client, EventSource, PollSource, PushSource, SourceSubscription, TransportError,
	DEFAULT_POLL_INTERVAL,
};
