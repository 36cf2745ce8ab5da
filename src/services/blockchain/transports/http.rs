//! Polling transport over HTTP.
//!
//! Issues the codec's trigger request on a fixed interval and forwards every
//! produced event into the subscription's channel. A failure on any one tick
//! is logged and skipped; the loop only ends on shutdown. Channel sends block
//! until the consumer is ready (intentional backpressure) but always race the
//! done-signal so teardown cannot deadlock.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use tokio::{
	sync::{mpsc, watch},
	time::MissedTickBehavior,
};

use crate::{
	models::Event,
	services::blockchain::{
		codec::ProtocolCodec,
		transports::{
			default_http_client, done_signalled, EventSource, SourceSubscription, TransportError,
			DEFAULT_POLL_INTERVAL,
		},
	},
};

/// Polling event source for request/response chain endpoints
pub struct PollSource {
	url: String,
	interval: Duration,
	codec: Box<dyn ProtocolCodec>,
	http: ClientWithMiddleware,
}

impl PollSource {
	/// Creates a polling source for the given endpoint URL
	///
	/// A refresh interval of zero falls back to the transport default.
	pub fn new(url: String, refresh_interval_secs: u64, codec: Box<dyn ProtocolCodec>) -> Self {
		let interval = if refresh_interval_secs == 0 {
			DEFAULT_POLL_INTERVAL
		} else {
			Duration::from_secs(refresh_interval_secs)
		};
		PollSource {
			url,
			interval,
			codec,
			http: default_http_client(),
		}
	}
}

/// One HTTP POST of a codec-built body, returning the raw response bytes
async fn post(
	http: &ClientWithMiddleware,
	url: &str,
	body: Vec<u8>,
) -> Result<Vec<u8>, TransportError> {
	let response = http
		.post(url)
		.header(CONTENT_TYPE, "application/json")
		.body(body)
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

/// One poll round-trip: build, send, parse
async fn poll_once(
	http: &ClientWithMiddleware,
	url: &str,
	codec: &dyn ProtocolCodec,
) -> Result<Vec<Event>, TransportError> {
	let request = codec.build_trigger_request()?;
	let body = post(http, url, request).await?;
	Ok(codec.parse_trigger_response(&body)?)
}

#[async_trait]
impl EventSource for PollSource {
	async fn test(&self) -> Result<(), TransportError> {
		let request = self.codec.build_liveness_request()?;
		let body = post(&self.http, &self.url, request).await?;
		Ok(self.codec.parse_liveness_response(&body)?)
	}

	async fn subscribe(
		self: Box<Self>,
		events: mpsc::Sender<Event>,
	) -> Result<SourceSubscription, TransportError> {
		let PollSource {
			url,
			interval,
			codec,
			http,
		} = *self;
		let (done_tx, mut done_rx) = watch::channel(());

		tracing::info!(url = %url, interval_secs = interval.as_secs_f64(), "starting poll loop");

		let task = tokio::spawn(async move {
			// The first tick completes immediately, so the first poll does
			// not wait a full interval.
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				tokio::select! {
					_ = done_signalled(&mut done_rx) => break,
					_ = ticker.tick() => {
						match poll_once(&http, &url, codec.as_ref()).await {
							Ok(batch) => {
								for event in batch {
									tokio::select! {
										_ = done_signalled(&mut done_rx) => return,
										sent = events.send(event) => {
											if sent.is_err() {
												// Consumer is gone; nothing left to feed
												return;
											}
										}
									}
								}
							}
							Err(e) => {
								tracing::warn!(url = %url, "poll failed, retrying next tick: {}", e);
							}
						}
					}
				}
			}
			tracing::info!(url = %url, "poll loop stopped");
		});

		Ok(SourceSubscription::new(done_tx, task))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::services::blockchain::codecs::EthereumCodec;
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	};

	fn eth_codec() -> Box<dyn ProtocolCodec> {
		Box::new(EthereumCodec::poll(vec!["0xabc".to_string()], vec![]))
	}

	fn source_with_interval(url: String, interval: Duration) -> PollSource {
		PollSource {
			url,
			interval,
			codec: eth_codec(),
			http: default_http_client(),
		}
	}

	#[test]
	fn test_zero_interval_falls_back_to_default() {
		let source = PollSource::new("http://node".to_string(), 0, eth_codec());
		assert_eq!(source.interval, DEFAULT_POLL_INTERVAL);

		let source = PollSource::new("http://node".to_string(), 10, eth_codec());
		assert_eq!(source.interval, Duration::from_secs(10));
	}

	#[tokio::test]
	async fn test_liveness_success() {
		let mut server = mockito::Server::new_async().await;
		let mock = server
			.mock("POST", "/")
			.match_body(r#"{"jsonrpc":"2.0","id":1,"method":"eth_blockNumber"}"#)
			.with_status(200)
			.with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x4b7"}"#)
			.create_async()
			.await;

		let source = Box::new(PollSource::new(server.url(), 5, eth_codec()));
		assert!(source.test().await.is_ok());
		mock.assert_async().await;
	}

	#[tokio::test]
	async fn test_liveness_bad_status_is_unreachable_class() {
		let mut server = mockito::Server::new_async().await;
		server
			.mock("POST", "/")
			.with_status(500)
			.create_async()
			.await;

		let source = Box::new(PollSource::new(server.url(), 5, eth_codec()));
		let error = source.test().await.unwrap_err();
		assert!(matches!(error, TransportError::BadStatus { status: 500, .. }));
		assert!(!error.is_protocol_mismatch());
	}

	#[tokio::test]
	async fn test_liveness_wrong_protocol() {
		let mut server = mockito::Server::new_async().await;
		server
			.mock("POST", "/")
			.with_status(200)
			.with_body("<html>I am not a chain node</html>")
			.create_async()
			.await;

		let source = Box::new(PollSource::new(server.url(), 5, eth_codec()));
		let error = source.test().await.unwrap_err();
		assert!(error.is_protocol_mismatch());
	}

	#[tokio::test]
	async fn test_subscribe_forwards_events_in_order() {
		let mut server = mockito::Server::new_async().await;
		server
			.mock("POST", "/")
			.with_status(200)
			.with_body(
				r#"{"jsonrpc":"2.0","id":1,"result":[{"logIndex":"0x0"},{"logIndex":"0x1"}]}"#,
			)
			.expect_at_least(1)
			.create_async()
			.await;

		let source = Box::new(source_with_interval(server.url(), Duration::from_millis(50)));
		let (tx, mut rx) = mpsc::channel(1);
		let handle = source.subscribe(tx).await.unwrap();

		let first = rx.recv().await.unwrap();
		let second = rx.recv().await.unwrap();
		assert_eq!(first.as_value()["logIndex"], "0x0");
		assert_eq!(second.as_value()["logIndex"], "0x1");

		handle.shutdown().await;
	}

	#[tokio::test]
	async fn test_malformed_ticks_do_not_kill_the_loop() {
		let mut server = mockito::Server::new_async().await;
		let hits = Arc::new(AtomicUsize::new(0));
		let hits_in_mock = hits.clone();
		server
			.mock("POST", "/")
			.with_status(200)
			.with_body_from_request(move |_| {
				// Alternate malformed and well-formed responses
				if hits_in_mock.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
					b"this tick is garbage".to_vec()
				} else {
					br#"{"jsonrpc":"2.0","id":1,"result":[{"ok":true}]}"#.to_vec()
				}
			})
			.expect_at_least(4)
			.create_async()
			.await;

		let source = Box::new(source_with_interval(server.url(), Duration::from_millis(20)));
		let (tx, mut rx) = mpsc::channel(1);
		let handle = source.subscribe(tx).await.unwrap();

		// Well-formed ticks keep producing events after malformed ones
		let first = rx.recv().await.unwrap();
		let second = rx.recv().await.unwrap();
		assert_eq!(first.as_value()["ok"], true);
		assert_eq!(second.as_value()["ok"], true);
		assert!(hits.load(Ordering::SeqCst) >= 4);

		handle.shutdown().await;
	}

	#[tokio::test]
	async fn test_shutdown_closes_the_event_channel() {
		let mut server = mockito::Server::new_async().await;
		server
			.mock("POST", "/")
			.with_status(200)
			.with_body(r#"{"jsonrpc":"2.0","id":1,"result":[]}"#)
			.expect_at_least(1)
			.create_async()
			.await;

		let source = Box::new(source_with_interval(server.url(), Duration::from_millis(20)));
		let (tx, mut rx) = mpsc::channel(1);
		let handle = source.subscribe(tx).await.unwrap();

		tokio::time::sleep(Duration::from_millis(60)).await;
		handle.shutdown().await;

		// Producer exited and dropped its sender
		assert!(rx.recv().await.is_none());
	}

	#[tokio::test]
	async fn test_shutdown_does_not_deadlock_on_slow_consumer() {
		let mut server = mockito::Server::new_async().await;
		server
			.mock("POST", "/")
			.with_status(200)
			.with_body(
				r#"{"jsonrpc":"2.0","id":1,"result":[{"n":1},{"n":2},{"n":3},{"n":4}]}"#,
			)
			.expect_at_least(1)
			.create_async()
			.await;

		let source = Box::new(source_with_interval(server.url(), Duration::from_millis(20)));
		// Capacity-1 channel that nobody drains: the producer blocks on send
		let (tx, rx) = mpsc::channel(1);
		let handle = source.subscribe(tx).await.unwrap();

		tokio::time::sleep(Duration::from_millis(60)).await;
		tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
			.await
			.expect("shutdown deadlocked on a blocked producer");
		drop(rx);
	}
}
