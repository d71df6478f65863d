//! WebSocket transport over `tokio-tungstenite`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{debug, trace};

use super::{Connector, Frame, FrameReceiver, FrameSender, TransportParts, parse_endpoint};
use crate::error::{Error, Result};

/// Default bound on the opening handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens a WebSocket per connection attempt.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
	connect_timeout: Duration,
}

impl Default for WebSocketConnector {
	fn default() -> Self {
		Self::new(DEFAULT_CONNECT_TIMEOUT)
	}
}

impl WebSocketConnector {
	pub fn new(connect_timeout: Duration) -> Self {
		Self { connect_timeout }
	}

	pub fn connect_timeout(&self) -> Duration {
		self.connect_timeout
	}
}

#[async_trait]
impl Connector for WebSocketConnector {
	async fn connect(&self, endpoint: &str) -> Result<TransportParts> {
		let url = parse_endpoint(endpoint)?;
		debug!(target: "scenelink::transport", endpoint = %url, "opening websocket");

		let handshake = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()));
		let (stream, response) = handshake
			.await
			.map_err(|_| {
				Error::Timeout(format!(
					"websocket handshake with {endpoint} exceeded {}ms",
					self.connect_timeout.as_millis()
				))
			})?
			.map_err(|e| Error::ConnectionFailed {
				endpoint: endpoint.to_string(),
				reason: e.to_string(),
			})?;

		debug!(
			target: "scenelink::transport",
			status = %response.status(),
			"websocket handshake complete"
		);
		Ok(WebSocketTransport::new(stream).into_parts())
	}
}

/// An established WebSocket, before it is split into halves.
///
/// Generic over the byte stream so server-side streams accepted in tests can
/// be wrapped the same way as client connections.
pub struct WebSocketTransport<S> {
	stream: WebSocketStream<S>,
}

impl<S> WebSocketTransport<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	pub fn new(stream: WebSocketStream<S>) -> Self {
		Self { stream }
	}

	pub fn into_parts(self) -> TransportParts {
		let open = Arc::new(AtomicBool::new(true));
		let (sink, stream) = self.stream.split();
		TransportParts {
			sender: Box::new(WebSocketSender {
				sink,
				open: Arc::clone(&open),
			}),
			receiver: Box::new(WebSocketReceiver { stream, open }),
		}
	}
}

struct WebSocketSender<S> {
	sink: SplitSink<WebSocketStream<S>, Message>,
	open: Arc<AtomicBool>,
}

#[async_trait]
impl<S> FrameSender for WebSocketSender<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	async fn send(&mut self, text: &str) -> Result<()> {
		if !self.open.load(Ordering::Acquire) {
			return Err(Error::ChannelClosed);
		}
		trace!(target: "scenelink::transport", len = text.len(), "ws send");
		self.sink.send(Message::Text(text.to_owned())).await.map_err(|e| {
			self.open.store(false, Ordering::Release);
			Error::TransportError(format!("websocket write failed: {e}"))
		})
	}

	async fn close(&mut self) -> Result<()> {
		self.open.store(false, Ordering::Release);
		match self.sink.close().await {
			Ok(()) => Ok(()),
			Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
			Err(e) => Err(Error::TransportError(format!("websocket close failed: {e}"))),
		}
	}

	fn is_open(&self) -> bool {
		self.open.load(Ordering::Acquire)
	}
}

struct WebSocketReceiver<S> {
	stream: SplitStream<WebSocketStream<S>>,
	open: Arc<AtomicBool>,
}

#[async_trait]
impl<S> FrameReceiver for WebSocketReceiver<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	async fn recv(&mut self) -> Result<Frame> {
		loop {
			match self.stream.next().await {
				Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text)),
				Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
					Ok(text) => return Ok(Frame::Text(text)),
					Err(_) => {
						debug!(target: "scenelink::transport", "dropping non-UTF-8 binary frame");
					}
				},
				Some(Ok(Message::Close(frame))) => {
					self.open.store(false, Ordering::Release);
					let reason = frame
						.map(|f| f.reason.to_string())
						.filter(|reason| !reason.is_empty());
					return Ok(Frame::Close(reason));
				}
				// Ping/pong are answered by tungstenite itself.
				Some(Ok(_)) => {}
				Some(Err(e)) => {
					self.open.store(false, Ordering::Release);
					return Err(Error::TransportError(format!("websocket read failed: {e}")));
				}
				None => {
					self.open.store(false, Ordering::Release);
					return Ok(Frame::Close(None));
				}
			}
		}
	}
}
