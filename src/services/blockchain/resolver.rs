//! Connection resolver.
//!
//! Maps an endpoint's declared chain kind (plus its URL scheme) to a
//! transport/codec pairing or a dedicated client. Pure: nothing here touches
//! the network, so unknown or mismatched configurations are rejected before
//! any I/O happens.

use thiserror::Error;
use url::Url;

use crate::{
	models::{ChainFilter, ChainKind, Endpoint},
	services::blockchain::{
		clients::TezosClient,
		codecs::{EthereumCodec, SubstrateCodec},
		transports::{EventSource, PollSource, PushSource},
	},
};

/// Resolution error type
#[derive(Debug, Error)]
pub enum ResolveError {
	/// The endpoint URL does not parse
	#[error("invalid endpoint URL: {0}")]
	InvalidUrl(#[from] url::ParseError),

	/// The URL scheme does not fit the chain kind
	#[error("scheme {scheme} is not supported for {kind} endpoints")]
	SchemeMismatch { kind: ChainKind, scheme: String },

	/// The subscription filter belongs to a different chain family than the
	/// endpoint
	#[error("filter is for {filter_kind} but endpoint {endpoint} is {endpoint_kind}")]
	FilterMismatch {
		endpoint: String,
		endpoint_kind: ChainKind,
		filter_kind: ChainKind,
	},
}

/// Picks the event source implementation for an endpoint/filter pair
pub fn resolve(
	endpoint: &Endpoint,
	filter: &ChainFilter,
) -> Result<Box<dyn EventSource + Send>, ResolveError> {
	if filter.kind() != endpoint.kind {
		return Err(ResolveError::FilterMismatch {
			endpoint: endpoint.name.clone(),
			endpoint_kind: endpoint.kind,
			filter_kind: filter.kind(),
		});
	}

	let url = Url::parse(&endpoint.url)?;
	let scheme = url.scheme().to_string();

	match (endpoint.kind, filter) {
		(ChainKind::Ethereum, ChainFilter::Ethereum { addresses, topics }) => {
			match scheme.as_str() {
				"http" | "https" => Ok(Box::new(PollSource::new(
					endpoint.url.clone(),
					endpoint.refresh_interval_secs,
					Box::new(EthereumCodec::poll(addresses.clone(), topics.clone())),
				))),
				"ws" | "wss" => Ok(Box::new(PushSource::new(
					endpoint.url.clone(),
					Box::new(EthereumCodec::push(addresses.clone(), topics.clone())),
				))),
				_ => Err(ResolveError::SchemeMismatch {
					kind: endpoint.kind,
					scheme,
				}),
			}
		}
		(ChainKind::Substrate, ChainFilter::Substrate { account_ids }) => match scheme.as_str() {
			// Storage subscriptions only exist over the socket interface
			"ws" | "wss" => Ok(Box::new(PushSource::new(
				endpoint.url.clone(),
				Box::new(SubstrateCodec::new(account_ids.clone())),
			))),
			_ => Err(ResolveError::SchemeMismatch {
				kind: endpoint.kind,
				scheme,
			}),
		},
		(ChainKind::Tezos, ChainFilter::Tezos { addresses }) => match scheme.as_str() {
			"http" | "https" => Ok(Box::new(TezosClient::new(
				endpoint.url.clone(),
				addresses.clone(),
				endpoint.refresh_interval_secs,
			))),
			_ => Err(ResolveError::SchemeMismatch {
				kind: endpoint.kind,
				scheme,
			}),
		},
		// Guarded by the kind check above
		_ => Err(ResolveError::FilterMismatch {
			endpoint: endpoint.name.clone(),
			endpoint_kind: endpoint.kind,
			filter_kind: filter.kind(),
		}),
	}
}
