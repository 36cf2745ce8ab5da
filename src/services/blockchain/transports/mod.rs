//! Event source transports.
//!
//! Two interchangeable strategies turn a codec's protocol into a stream of
//! events: a polling transport issuing periodic HTTP requests and a push
//! transport reading server-initiated WebSocket frames. Both expose the same
//! contract: a side-effect-free liveness test, and `subscribe` which starts a
//! background producer streaming events into a channel until the returned
//! handle is shut down.

mod http;
mod ws;

pub use http::PollSource;
pub use ws::PushSource;

use std::time::Duration;

use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use thiserror::Error;
use tokio::{
	sync::{mpsc, watch},
	task::JoinHandle,
};

use crate::{models::Event, services::blockchain::codec::CodecError};

/// Poll interval applied when the endpoint configures none
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Transport error type
#[derive(Debug, Error)]
pub enum TransportError {
	/// The endpoint could not be reached at all
	#[error("endpoint {url} is unreachable: {source}")]
	Unreachable {
		url: String,
		#[source]
		source: anyhow::Error,
	},

	/// The endpoint answered with an unexpected HTTP status
	#[error("endpoint {url} returned status {status}")]
	BadStatus { url: String, status: u16 },

	/// The endpoint answered, but the codec could not make sense of it
	#[error(transparent)]
	Codec(#[from] CodecError),
}

impl TransportError {
	/// Creates an Unreachable error
	pub fn unreachable(
		url: impl Into<String>,
		source: impl Into<anyhow::Error>,
	) -> Self {
		Self::Unreachable {
			url: url.into(),
			source: source.into(),
		}
	}

	/// Checks whether the failure means the endpoint speaks a different
	/// protocol (as opposed to being unreachable)
	pub fn is_protocol_mismatch(&self) -> bool {
		matches!(self, Self::Codec(e) if e.is_protocol_mismatch())
	}
}

/// Uniform capability set over poll, push and dedicated chain feeds
#[async_trait]
pub trait EventSource: Send {
	/// One liveness round-trip against the endpoint
	///
	/// A failure here rejects the subscription before it is ever persisted
	/// or registered.
	async fn test(&self) -> Result<(), TransportError>;

	/// Starts the background producer streaming events into `events`
	///
	/// The producer runs until the returned handle is shut down (or
	/// dropped). Sends apply backpressure: the producer blocks until the
	/// consumer is ready, but always remains responsive to shutdown.
	async fn subscribe(
		self: Box<Self>,
		events: mpsc::Sender<Event>,
	) -> Result<SourceSubscription, TransportError>;
}

/// Handle to a live producer task
///
/// Shutting down signals the producer's done-channel exactly once and waits
/// for the task to exit; the producer drops its channel sender on exit, which
/// is what closes the event channel for the consumer. Dropping the handle
/// without calling `shutdown` also stops the producer, just without waiting.
pub struct SourceSubscription {
	done: Option<watch::Sender<()>>,
	task: JoinHandle<()>,
}

impl SourceSubscription {
	/// Wraps a producer task and its done-signal
	pub fn new(done: watch::Sender<()>, task: JoinHandle<()>) -> Self {
		SourceSubscription {
			done: Some(done),
			task,
		}
	}

	/// Signals the producer and waits for it to exit
	pub async fn shutdown(mut self) {
		if let Some(done) = self.done.take() {
			// Receiver may already be gone if the producer exited on its own
			let _ = done.send(());
		}
		if let Err(e) = (&mut self.task).await {
			if e.is_panic() {
				tracing::error!("event source task panicked during shutdown: {}", e);
			}
		}
	}
}

/// Builds the HTTP client shared by polling transports and dedicated
/// clients, with transient-error retries
pub fn default_http_client() -> ClientWithMiddleware {
	let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
	ClientBuilder::new(reqwest::Client::new())
		.with(RetryTransientMiddleware::new_with_policy(retry_policy))
		.build()
}

/// Waits until the done-signal fires (or its sender is dropped)
pub(crate) async fn done_signalled(done: &mut watch::Receiver<()>) {
	// Err means the handle was dropped, which is also a stop
	let _ = done.changed().await;
}
