//! Opaque chain event payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opaque unit of "something happened" data.
///
/// Events are produced by a protocol codec (or dedicated client) and consumed
/// by the trigger client; everything in between treats them as inert blobs.
/// There is no cross-chain schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Value);

impl Event {
	/// Wraps a raw JSON payload as an event
	pub fn new(payload: Value) -> Self {
		Event(payload)
	}

	/// Returns the underlying payload
	pub fn as_value(&self) -> &Value {
		&self.0
	}

	/// Consumes the event, returning the underlying payload
	pub fn into_value(self) -> Value {
		self.0
	}
}

impl From<Value> for Event {
	fn from(payload: Value) -> Self {
		Event(payload)
	}
}
