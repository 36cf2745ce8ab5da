//! Subscription model binding a job to an endpoint and an event filter.

use serde::{Deserialize, Serialize};

use crate::models::ChainKind;

/// Chain-specific event filter payload, variant by chain family.
///
/// Each variant carries the fields that family's codec (or dedicated client)
/// needs to narrow the feed down to the activity the job cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChainFilter {
	Ethereum {
		#[serde(default)]
		addresses: Vec<String>,
		#[serde(default)]
		topics: Vec<String>,
	},
	Substrate {
		#[serde(default, rename = "accountIds")]
		account_ids: Vec<String>,
	},
	Tezos {
		#[serde(default)]
		addresses: Vec<String>,
	},
}

impl ChainFilter {
	/// Returns the chain family this filter belongs to
	pub fn kind(&self) -> ChainKind {
		match self {
			ChainFilter::Ethereum { .. } => ChainKind::Ethereum,
			ChainFilter::Substrate { .. } => ChainKind::Substrate,
			ChainFilter::Tezos { .. } => ChainKind::Tezos,
		}
	}

	/// Returns true when the filter carries at least one selector, which
	/// every chain family requires
	pub fn has_selectors(&self) -> bool {
		match self {
			ChainFilter::Ethereum { addresses, topics } => {
				!addresses.is_empty() || !topics.is_empty()
			}
			ChainFilter::Substrate { account_ids } => !account_ids.is_empty(),
			ChainFilter::Tezos { addresses } => !addresses.is_empty(),
		}
	}
}

/// A binding from an external job identifier to an endpoint plus a
/// chain-specific event filter.
///
/// A subscription is meaningless without its endpoint; the orchestrator
/// always resolves the endpoint by name before bringing the subscription
/// live. At most one live subscription exists per `job_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
	/// Generated opaque handle returned to the administrative caller
	pub reference_id: String,
	/// External job key; one live subscription per job
	pub job_id: String,
	/// Name of the endpoint this subscription listens on
	pub endpoint_name: String,
	/// Chain-specific filter payload
	pub filter: ChainFilter,
}
