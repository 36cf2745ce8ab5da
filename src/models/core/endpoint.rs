//! Chain endpoint configuration model.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Supported chain families.
///
/// Each variant maps to a transport/codec pairing (or a dedicated client)
/// via the connection resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
	/// Ethereum-compatible nodes speaking JSON-RPC (HTTP polling or
	/// WebSocket subscriptions, depending on the endpoint URL scheme)
	Ethereum,
	/// Substrate-based nodes speaking JSON-RPC over WebSocket
	Substrate,
	/// Tezos nodes, driven by a dedicated client over the node's REST shell
	Tezos,
}

impl ChainKind {
	/// Returns the chain kind as its canonical lowercase string
	pub fn as_str(&self) -> &'static str {
		match self {
			ChainKind::Ethereum => "ethereum",
			ChainKind::Substrate => "substrate",
			ChainKind::Tezos => "tezos",
		}
	}
}

impl fmt::Display for ChainKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ChainKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"ethereum" => Ok(ChainKind::Ethereum),
			"substrate" => Ok(ChainKind::Substrate),
			"tezos" => Ok(ChainKind::Tezos),
			other => Err(format!("unsupported chain kind: {}", other)),
		}
	}
}

/// A named, reachable chain network configuration.
///
/// The name is the endpoint's identity: renames are not supported, and
/// deleting an endpoint cascades to every subscription referencing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
	/// Unique key identifying this endpoint
	pub name: String,
	/// Node URL; the scheme selects between polling and push transports
	pub url: String,
	/// Chain family served by this endpoint
	#[serde(rename = "type")]
	pub kind: ChainKind,
	/// Poll interval in seconds for polling transports; values of zero fall
	/// back to the transport default
	#[serde(rename = "refreshInterval", default)]
	pub refresh_interval_secs: u64,
}
