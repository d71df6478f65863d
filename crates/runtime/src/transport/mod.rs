//! Transport layer for engine communication.
//!
//! A transport is a duplex channel of text frames. Each successful
//! [`Connector::connect`] yields independent sender and receiver halves so the
//! receive loop can run in its own task while callers send concurrently.
//!
//! # Liveness
//!
//! Both halves share one liveness flag. The receiver clears it when it sees a
//! close frame or a read error; the sender clears it after a failed write or
//! an explicit close. [`FrameSender::is_open`] reads that flag without I/O.

pub mod channel;
pub mod websocket;

use async_trait::async_trait;
use url::Url;

use crate::error::{Error, Result};

/// One inbound frame, as seen by the receive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
	/// A text frame. Binary frames carrying valid UTF-8 are surfaced here too.
	Text(String),
	/// The remote end closed the channel, with an optional reason.
	Close(Option<String>),
}

/// Sending half of a transport.
#[async_trait]
pub trait FrameSender: Send {
	/// Writes one text frame.
	async fn send(&mut self, text: &str) -> Result<()>;

	/// Initiates a graceful close. Closing an already closed channel is not
	/// an error.
	async fn close(&mut self) -> Result<()>;

	/// Whether the channel still looks usable. Performs no I/O.
	fn is_open(&self) -> bool;
}

/// Receiving half of a transport.
///
/// `recv` must be cancel-safe: the receive loop races it against shutdown.
#[async_trait]
pub trait FrameReceiver: Send {
	/// Waits for the next frame. A clean remote close is `Ok(Frame::Close)`;
	/// read failures are errors.
	async fn recv(&mut self) -> Result<Frame>;
}

/// The two halves of a freshly opened transport.
pub struct TransportParts {
	pub sender: Box<dyn FrameSender>,
	pub receiver: Box<dyn FrameReceiver>,
}

impl std::fmt::Debug for TransportParts {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransportParts")
			.field("open", &self.sender.is_open())
			.finish_non_exhaustive()
	}
}

/// Opens transports. A new channel is created for every attempt; channels
/// are never reused across sessions.
#[async_trait]
pub trait Connector: Send + Sync {
	async fn connect(&self, endpoint: &str) -> Result<TransportParts>;
}

/// Validates an endpoint string as a `ws://` or `wss://` URL with a host.
pub fn parse_endpoint(endpoint: &str) -> Result<Url> {
	let invalid = |reason: String| Error::InvalidEndpoint {
		endpoint: endpoint.to_string(),
		reason,
	};

	let url = Url::parse(endpoint.trim()).map_err(|e| invalid(e.to_string()))?;
	match url.scheme() {
		"ws" | "wss" => {}
		other => return Err(invalid(format!("scheme must be ws or wss, got '{other}'"))),
	}
	if url.host_str().is_none_or(str::is_empty) {
		return Err(invalid("missing host".to_string()));
	}
	Ok(url)
}
