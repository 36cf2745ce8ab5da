//! Ethereum log-filter codec.
//!
//! Builds `eth_getLogs` polls or `eth_subscribe` handshakes for a fixed
//! address/topic filter and parses the matching responses. One event is
//! produced per returned log object; the log is passed through untouched.

use serde_json::{json, Value};

use crate::{
	models::Event,
	services::blockchain::codec::{CodecError, JsonRpcEnvelope, ProtocolCodec},
};

/// RPC method constants
mod rpc_methods {
	pub const BLOCK_NUMBER: &str = "eth_blockNumber";
	pub const GET_LOGS: &str = "eth_getLogs";
	pub const SUBSCRIBE: &str = "eth_subscribe";
	/// Method name on server-pushed subscription notifications
	pub const SUBSCRIPTION_NOTIFICATION: &str = "eth_subscription";
}

/// How the trigger request is phrased
#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
	/// Repeated `eth_getLogs` requests over HTTP
	Poll,
	/// One `eth_subscribe` handshake followed by pushed frames
	Push,
}

/// Codec for Ethereum-compatible JSON-RPC nodes
#[derive(Debug, Clone)]
pub struct EthereumCodec {
	addresses: Vec<String>,
	topics: Vec<String>,
	mode: Mode,
}

impl EthereumCodec {
	/// Creates a codec phrasing trigger requests as `eth_getLogs` polls
	pub fn poll(addresses: Vec<String>, topics: Vec<String>) -> Self {
		EthereumCodec {
			addresses,
			topics,
			mode: Mode::Poll,
		}
	}

	/// Creates a codec phrasing the trigger request as an `eth_subscribe`
	/// handshake
	pub fn push(addresses: Vec<String>, topics: Vec<String>) -> Self {
		EthereumCodec {
			addresses,
			topics,
			mode: Mode::Push,
		}
	}

	fn filter_object(&self) -> Value {
		let mut filter = json!({
			"address": self.addresses,
		});
		if !self.topics.is_empty() {
			filter["topics"] = json!([self.topics]);
		}
		filter
	}
}

impl ProtocolCodec for EthereumCodec {
	fn build_liveness_request(&self) -> Result<Vec<u8>, CodecError> {
		JsonRpcEnvelope::request(1, rpc_methods::BLOCK_NUMBER, None).to_bytes()
	}

	fn parse_liveness_response(&self, body: &[u8]) -> Result<(), CodecError> {
		let envelope = JsonRpcEnvelope::from_bytes(body)
			.map_err(|e| CodecError::protocol_mismatch(e.to_string()))?;
		match envelope.into_result()? {
			Some(Value::String(block)) if block.starts_with("0x") => Ok(()),
			other => Err(CodecError::protocol_mismatch(format!(
				"expected hex block number, got {:?}",
				other
			))),
		}
	}

	fn build_trigger_request(&self) -> Result<Vec<u8>, CodecError> {
		let envelope = match self.mode {
			Mode::Poll => {
				let mut filter = self.filter_object();
				filter["fromBlock"] = json!("latest");
				JsonRpcEnvelope::request(1, rpc_methods::GET_LOGS, Some(json!([filter])))
			}
			Mode::Push => JsonRpcEnvelope::request(
				1,
				rpc_methods::SUBSCRIBE,
				Some(json!(["logs", self.filter_object()])),
			),
		};
		envelope.to_bytes()
	}

	fn parse_trigger_response(&self, body: &[u8]) -> Result<Vec<Event>, CodecError> {
		let envelope = JsonRpcEnvelope::from_bytes(body)?;

		// Server-pushed notification: one log per frame
		if envelope.method.as_deref() == Some(rpc_methods::SUBSCRIPTION_NOTIFICATION) {
			let log = envelope
				.params
				.as_ref()
				.and_then(|p| p.get("result"))
				.cloned()
				.ok_or_else(|| {
					CodecError::protocol_mismatch("subscription notification without result")
				})?;
			return Ok(vec![Event::new(log)]);
		}

		match envelope.into_result()? {
			// eth_getLogs: zero or more logs, in chain order
			Some(Value::Array(logs)) => Ok(logs.into_iter().map(Event::new).collect()),
			// eth_subscribe confirmation carries the subscription id
			Some(Value::String(_)) => Ok(vec![]),
			Some(Value::Null) | None => Ok(vec![]),
			Some(other) => Err(CodecError::protocol_mismatch(format!(
				"unexpected trigger result: {}",
				other
			))),
		}
	}
}
