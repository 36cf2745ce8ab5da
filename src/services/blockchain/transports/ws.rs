//! Push transport over WebSocket.
//!
//! Maintains one persistent connection per subscription: the subscribe
//! handshake is sent on connect, then server-pushed frames are parsed and
//! forwarded into the subscription's channel. A dropped connection is redialed
//! after a fixed backoff and the subscribe handshake is replayed; the old
//! socket is dropped before the redial so nothing leaks.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::{
	net::TcpStream,
	sync::{mpsc, watch},
};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};

use crate::{
	models::Event,
	services::blockchain::{
		codec::ProtocolCodec,
		transports::{done_signalled, EventSource, SourceSubscription, TransportError},
	},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Delay before redialing a dropped connection
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Push event source for server-initiated chain feeds
pub struct PushSource {
	url: String,
	codec: Box<dyn ProtocolCodec>,
	reconnect_backoff: Duration,
}

impl PushSource {
	/// Creates a push source for the given WebSocket endpoint URL
	pub fn new(url: String, codec: Box<dyn ProtocolCodec>) -> Self {
		PushSource {
			url,
			codec,
			reconnect_backoff: RECONNECT_BACKOFF,
		}
	}
}

/// Dials the endpoint and replays the subscribe handshake
async fn connect_and_subscribe(
	url: &str,
	codec: &dyn ProtocolCodec,
) -> Result<WsStream, TransportError> {
	let (mut stream, _response) = connect_async(url)
		.await
		.map_err(|e| TransportError::unreachable(url, e))?;

	let request = codec.build_trigger_request()?;
	let text = String::from_utf8_lossy(&request).into_owned();
	stream
		.send(Message::Text(text.into()))
		.await
		.map_err(|e| TransportError::unreachable(url, e))?;

	Ok(stream)
}

/// Why the frame-reading loop returned
enum ReadOutcome {
	/// Shutdown was signalled
	Shutdown,
	/// The event channel's consumer is gone
	ConsumerGone,
	/// The connection dropped; the caller decides whether to redial
	ConnectionLost,
}

async fn read_frames(
	ws: &mut WsStream,
	codec: &dyn ProtocolCodec,
	events: &mpsc::Sender<Event>,
	done: &mut watch::Receiver<()>,
	url: &str,
) -> ReadOutcome {
	loop {
		tokio::select! {
			_ = done_signalled(done) => return ReadOutcome::Shutdown,
			frame = ws.next() => match frame {
				Some(Ok(Message::Text(text))) => {
					match codec.parse_trigger_response(text.as_bytes()) {
						Ok(batch) => {
							for event in batch {
								tokio::select! {
									_ = done_signalled(done) => return ReadOutcome::Shutdown,
									sent = events.send(event) => {
										if sent.is_err() {
											return ReadOutcome::ConsumerGone;
										}
									}
								}
							}
						}
						Err(e) => {
							tracing::warn!(url = %url, "skipping unparseable frame: {}", e);
						}
					}
				}
				Some(Ok(Message::Ping(payload))) => {
					let _ = ws.send(Message::Pong(payload)).await;
				}
				Some(Ok(Message::Close(_))) | None => {
					tracing::warn!(url = %url, "connection closed by peer");
					return ReadOutcome::ConnectionLost;
				}
				Some(Ok(_)) => {
					// Binary and pong frames carry nothing for us
				}
				Some(Err(e)) => {
					tracing::warn!(url = %url, "connection error: {}", e);
					return ReadOutcome::ConnectionLost;
				}
			}
		}
	}
}

#[async_trait]
impl EventSource for PushSource {
	async fn test(&self) -> Result<(), TransportError> {
		let (mut stream, _response) = connect_async(self.url.as_str())
			.await
			.map_err(|e| TransportError::unreachable(&self.url, e))?;

		let request = self.codec.build_liveness_request()?;
		let text = String::from_utf8_lossy(&request).into_owned();
		stream
			.send(Message::Text(text.into()))
			.await
			.map_err(|e| TransportError::unreachable(&self.url, e))?;

		loop {
			match stream.next().await {
				Some(Ok(Message::Text(text))) => {
					let parsed = self.codec.parse_liveness_response(text.as_bytes());
					let _ = stream.close(None).await;
					return Ok(parsed?);
				}
				Some(Ok(Message::Ping(payload))) => {
					let _ = stream.send(Message::Pong(payload)).await;
				}
				Some(Ok(Message::Close(_))) | None => {
					return Err(TransportError::unreachable(
						&self.url,
						anyhow::anyhow!("connection closed during liveness test"),
					));
				}
				Some(Ok(_)) => {}
				Some(Err(e)) => return Err(TransportError::unreachable(&self.url, e)),
			}
		}
	}

	async fn subscribe(
		self: Box<Self>,
		events: mpsc::Sender<Event>,
	) -> Result<SourceSubscription, TransportError> {
		let PushSource {
			url,
			codec,
			reconnect_backoff,
		} = *self;

		// Establish the first connection before reporting success, so a dead
		// endpoint fails the subscription instead of spinning in the background
		let first = connect_and_subscribe(&url, codec.as_ref()).await?;
		let (done_tx, mut done_rx) = watch::channel(());

		tracing::info!(url = %url, "starting push read loop");

		let task = tokio::spawn(async move {
			let mut stream = Some(first);
			loop {
				let mut ws = match stream.take() {
					Some(ws) => ws,
					None => {
						tokio::select! {
							_ = done_signalled(&mut done_rx) => return,
							_ = tokio::time::sleep(reconnect_backoff) => {}
						}
						match connect_and_subscribe(&url, codec.as_ref()).await {
							Ok(ws) => ws,
							Err(e) => {
								tracing::warn!(url = %url, "reconnect failed, backing off: {}", e);
								continue;
							}
						}
					}
				};

				match read_frames(&mut ws, codec.as_ref(), &events, &mut done_rx, &url).await {
					ReadOutcome::Shutdown => {
						let _ = ws.close(None).await;
						tracing::info!(url = %url, "push read loop stopped");
						return;
					}
					ReadOutcome::ConsumerGone => return,
					ReadOutcome::ConnectionLost => {
						// ws dropped here; the redial above builds a fresh one
					}
				}
			}
		});

		Ok(SourceSubscription::new(done_tx, task))
	}
}
