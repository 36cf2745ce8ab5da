//! Protocol codec interface and the shared JSON-RPC envelope.
//!
//! A codec builds the bytes for a liveness-test request and for an
//! event-poll/subscribe request, and parses response bytes into zero or more
//! events. Codecs are pure with respect to network state: configuration is
//! captured at construction and they never open connections themselves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::Event;

/// JSON-RPC protocol version sent on every request
pub const JSON_RPC_VERSION: &str = "2.0";

/// Codec error type
#[derive(Debug, Error)]
pub enum CodecError {
	/// The endpoint answered, but not in the expected protocol
	#[error("unexpected protocol response: {0}")]
	ProtocolMismatch(String),

	/// The response payload could not be decoded at all
	#[error("malformed response payload: {0}")]
	Malformed(#[from] serde_json::Error),

	/// The chain returned an error object instead of a result
	#[error("chain returned an error: {0}")]
	Remote(String),
}

impl CodecError {
	/// Creates a ProtocolMismatch error
	pub fn protocol_mismatch(message: impl Into<String>) -> Self {
		Self::ProtocolMismatch(message.into())
	}

	/// Checks whether this error is a protocol mismatch
	pub fn is_protocol_mismatch(&self) -> bool {
		matches!(self, Self::ProtocolMismatch(_))
	}
}

/// JSON-RPC 2.0 message envelope shared by the generic chain families
///
/// Used for both directions: requests carry `method`/`params`, responses
/// carry `result` or `error`, and server-pushed notifications carry both
/// `method` and `params`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcEnvelope {
	#[serde(rename = "jsonrpc")]
	pub version: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub method: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub params: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<Value>,
}

impl JsonRpcEnvelope {
	/// Builds a request envelope
	pub fn request(id: u64, method: &str, params: Option<Value>) -> Self {
		JsonRpcEnvelope {
			version: JSON_RPC_VERSION.to_string(),
			id: Some(Value::from(id)),
			method: Some(method.to_string()),
			params,
			result: None,
			error: None,
		}
	}

	/// Serializes the envelope to its wire bytes
	pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
		Ok(serde_json::to_vec(self)?)
	}

	/// Deserializes an envelope from wire bytes
	pub fn from_bytes(body: &[u8]) -> Result<Self, CodecError> {
		Ok(serde_json::from_slice(body)?)
	}

	/// Returns the result value, or a Remote error when the envelope
	/// carries an error object
	pub fn into_result(self) -> Result<Option<Value>, CodecError> {
		if let Some(error) = self.error {
			return Err(CodecError::Remote(error.to_string()));
		}
		Ok(self.result)
	}
}

/// Builds chain requests and parses chain responses for one subscription
pub trait ProtocolCodec: Send + Sync {
	/// Builds a minimal, side-effect-free request used only to confirm the
	/// endpoint is reachable and speaking the expected protocol
	fn build_liveness_request(&self) -> Result<Vec<u8>, CodecError>;

	/// Validates the response to the liveness request
	fn parse_liveness_response(&self, body: &[u8]) -> Result<(), CodecError>;

	/// Builds the request asking the chain for new matching activity (poll
	/// transports) or the subscribe payload (push transports)
	fn build_trigger_request(&self) -> Result<Vec<u8>, CodecError>;

	/// Parses a response or server-pushed frame into events
	///
	/// An empty event set is the normal empty-poll case, not an error.
	fn parse_trigger_response(&self, body: &[u8]) -> Result<Vec<Event>, CodecError>;
}
