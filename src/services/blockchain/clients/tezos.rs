//! Dedicated Tezos client.
//!
//! Tezos nodes expose a REST shell rather than JSON-RPC, so this client
//! bypasses the generic codec/transport pairing while satisfying the same
//! event source contract. It polls the chain head monitor and, whenever the
//! head moves, scans the block's operations for transactions destined to one
//! of the subscribed addresses. Each matching operation content becomes one
//! event.

use std::time::Duration;

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde_json::Value;
use tokio::{
	sync::{mpsc, watch},
	time::MissedTickBehavior,
};

use crate::{
	models::Event,
	services::blockchain::{
		codec::CodecError,
		transports::{
			default_http_client, done_signalled, EventSource, SourceSubscription, TransportError,
			DEFAULT_POLL_INTERVAL,
		},
	},
};

/// Chain head summary returned by the node's head monitor
#[derive(Debug, Clone, Deserialize)]
struct TezosHead {
	hash: String,
	#[serde(default)]
	#[allow(dead_code)]
	level: i64,
}

/// Event source for Tezos nodes
pub struct TezosClient {
	base_url: String,
	addresses: Vec<String>,
	interval: Duration,
	http: ClientWithMiddleware,
}

impl TezosClient {
	/// Creates a client polling the given node for transactions destined to
	/// `addresses`
	///
	/// A refresh interval of zero falls back to the transport default.
	pub fn new(base_url: String, addresses: Vec<String>, refresh_interval_secs: u64) -> Self {
		let interval = if refresh_interval_secs == 0 {
			DEFAULT_POLL_INTERVAL
		} else {
			Duration::from_secs(refresh_interval_secs)
		};
		TezosClient {
			base_url: base_url.trim_end_matches('/').to_string(),
			addresses,
			interval,
			http: default_http_client(),
		}
	}

	fn monitor_url(base_url: &str) -> String {
		format!("{}/monitor/heads/main", base_url)
	}

	fn operations_url(base_url: &str, block_hash: &str) -> String {
		format!("{}/chains/main/blocks/{}/operations", base_url, block_hash)
	}
}

async fn get_bytes(
	http: &ClientWithMiddleware,
	url: &str,
) -> Result<Vec<u8>, TransportError> {
	let response = http
		.get(url)
		.send()
		.await
		.map_err(|e| TransportError::unreachable(url, e))?;

	let status = response.status();
	if status.as_u16() >= 400 {
		return Err(TransportError::BadStatus {
			url: url.to_string(),
			status: status.as_u16(),
		});
	}

	let bytes = response
		.bytes()
		.await
		.map_err(|e| TransportError::unreachable(url, e))?;
	Ok(bytes.to_vec())
}

async fn fetch_head(
	http: &ClientWithMiddleware,
	base_url: &str,
) -> Result<TezosHead, TransportError> {
	let body = get_bytes(http, &TezosClient::monitor_url(base_url)).await?;
	let head: TezosHead = serde_json::from_slice(&body)
		.map_err(|e| CodecError::protocol_mismatch(format!("unexpected head monitor body: {}", e)))?;
	Ok(head)
}

/// Scans a block's operation groups for transactions destined to one of the
/// subscribed addresses, preserving block order
fn matching_contents(operations: &Value, addresses: &[String]) -> Vec<Event> {
	let mut events = Vec::new();
	let Some(validation_passes) = operations.as_array() else {
		return events;
	};
	for pass in validation_passes {
		let Some(groups) = pass.as_array() else {
			continue;
		};
		for group in groups {
			let Some(contents) = group.get("contents").and_then(Value::as_array) else {
				continue;
			};
			for content in contents {
				let is_transaction =
					content.get("kind").and_then(Value::as_str) == Some("transaction");
				let destination = content.get("destination").and_then(Value::as_str);
				if is_transaction
					&& destination.is_some_and(|d| addresses.iter().any(|a| a == d))
				{
					events.push(Event::new(content.clone()));
				}
			}
		}
	}
	events
}

async fn poll_once(
	http: &ClientWithMiddleware,
	base_url: &str,
	addresses: &[String],
	last_head: &mut Option<String>,
) -> Result<Vec<Event>, TransportError> {
	let head = fetch_head(http, base_url).await?;
	if last_head.as_deref() == Some(head.hash.as_str()) {
		// Head has not moved; nothing new to scan
		return Ok(vec![]);
	}

	let body = get_bytes(http, &TezosClient::operations_url(base_url, &head.hash)).await?;
	let operations: Value = serde_json::from_slice(&body).map_err(CodecError::Malformed)?;

	*last_head = Some(head.hash);
	Ok(matching_contents(&operations, addresses))
}

#[async_trait]
impl EventSource for TezosClient {
	async fn test(&self) -> Result<(), TransportError> {
		fetch_head(&self.http, &self.base_url).await.map(|_| ())
	}

	async fn subscribe(
		self: Box<Self>,
		events: mpsc::Sender<Event>,
	) -> Result<SourceSubscription, TransportError> {
		let TezosClient {
			base_url,
			addresses,
			interval,
			http,
		} = *self;
		let (done_tx, mut done_rx) = watch::channel(());

		tracing::info!(url = %base_url, "starting head monitor loop");

		let task = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			let mut last_head: Option<String> = None;

			loop {
				tokio::select! {
					_ = done_signalled(&mut done_rx) => break,
					_ = ticker.tick() => {
						match poll_once(&http, &base_url, &addresses, &mut last_head).await {
							Ok(batch) => {
								for event in batch {
									tokio::select! {
										_ = done_signalled(&mut done_rx) => return,
										sent = events.send(event) => {
											if sent.is_err() {
												return;
											}
										}
									}
								}
							}
							Err(e) => {
								tracing::warn!(url = %base_url, "head poll failed, retrying next tick: {}", e);
							}
						}
					}
				}
			}
			tracing::info!(url = %base_url, "head monitor loop stopped");
		});

		Ok(SourceSubscription::new(done_tx, task))
	}
}
