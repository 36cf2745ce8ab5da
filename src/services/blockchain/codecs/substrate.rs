//! Substrate storage-subscription codec.
//!
//! Subscribes to storage changes for a fixed set of account storage keys over
//! the node's WebSocket JSON-RPC interface. Each storage change in a pushed
//! `state_storage` frame becomes one event. Push only: the resolver never
//! pairs this codec with a polling transport.

use serde_json::{json, Value};

use crate::{
	models::Event,
	services::blockchain::codec::{CodecError, JsonRpcEnvelope, ProtocolCodec},
};

mod rpc_methods {
	pub const SYSTEM_CHAIN: &str = "system_chain";
	pub const SUBSCRIBE_STORAGE: &str = "state_subscribeStorage";
	/// Method name on server-pushed storage change notifications
	pub const STORAGE_NOTIFICATION: &str = "state_storage";
}

/// Codec for Substrate-based JSON-RPC nodes
#[derive(Debug, Clone)]
pub struct SubstrateCodec {
	account_keys: Vec<String>,
}

impl SubstrateCodec {
	/// Creates a codec subscribed to the given account storage keys
	pub fn new(account_keys: Vec<String>) -> Self {
		SubstrateCodec { account_keys }
	}
}

impl ProtocolCodec for SubstrateCodec {
	fn build_liveness_request(&self) -> Result<Vec<u8>, CodecError> {
		JsonRpcEnvelope::request(1, rpc_methods::SYSTEM_CHAIN, None).to_bytes()
	}

	fn parse_liveness_response(&self, body: &[u8]) -> Result<(), CodecError> {
		let envelope = JsonRpcEnvelope::from_bytes(body)
			.map_err(|e| CodecError::protocol_mismatch(e.to_string()))?;
		match envelope.into_result()? {
			Some(Value::String(_)) => Ok(()),
			other => Err(CodecError::protocol_mismatch(format!(
				"expected chain name, got {:?}",
				other
			))),
		}
	}

	fn build_trigger_request(&self) -> Result<Vec<u8>, CodecError> {
		JsonRpcEnvelope::request(
			1,
			rpc_methods::SUBSCRIBE_STORAGE,
			Some(json!([self.account_keys])),
		)
		.to_bytes()
	}

	fn parse_trigger_response(&self, body: &[u8]) -> Result<Vec<Event>, CodecError> {
		let envelope = JsonRpcEnvelope::from_bytes(body)?;

		if envelope.method.as_deref() == Some(rpc_methods::STORAGE_NOTIFICATION) {
			let result = envelope
				.params
				.as_ref()
				.and_then(|p| p.get("result"))
				.ok_or_else(|| {
					CodecError::protocol_mismatch("storage notification without result")
				})?;

			let block = result.get("block").cloned().unwrap_or(Value::Null);
			let changes = result
				.get("changes")
				.and_then(Value::as_array)
				.ok_or_else(|| {
					CodecError::protocol_mismatch("storage notification without changes")
				})?;

			return Ok(changes
				.iter()
				.map(|change| {
					Event::new(json!({
						"block": block,
						"change": change,
					}))
				})
				.collect());
		}

		match envelope.into_result()? {
			// Subscription confirmation carries the subscription id
			Some(Value::String(_)) | Some(Value::Number(_)) => Ok(vec![]),
			Some(Value::Null) | None => Ok(vec![]),
			Some(other) => Err(CodecError::protocol_mismatch(format!(
				"unexpected trigger result: {}",
				other
			))),
		}
	}
}
