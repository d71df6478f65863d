//! In-memory transport.
//!
//! [`ChannelConnector`] hands out transports backed by tokio channels. Every
//! accepted connection produces a [`RemoteEnd`] that plays the engine: it can
//! push frames, read the commands the client sent, close the channel, or
//! sever it silently. Attempts are logged with a tokio [`Instant`] so backoff
//! schedules can be asserted under paused time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{Connector, Frame, FrameReceiver, FrameSender, TransportParts, parse_endpoint};
use crate::error::{Error, Result};

/// One recorded call to [`Connector::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
	pub endpoint: String,
	pub at: Instant,
	pub accepted: bool,
}

#[derive(Debug, Default)]
struct ConnectorState {
	refusing: bool,
	refuse_remaining: u32,
	attempts: Vec<ConnectAttempt>,
}

/// Connector producing in-memory transports.
#[derive(Debug, Clone)]
pub struct ChannelConnector {
	state: Arc<Mutex<ConnectorState>>,
	accepted: mpsc::UnboundedSender<RemoteEnd>,
}

/// Stream of remote ends, one per accepted connection.
#[derive(Debug)]
pub struct RemoteEnds {
	rx: mpsc::UnboundedReceiver<RemoteEnd>,
}

impl RemoteEnds {
	/// Waits for the next accepted connection.
	pub async fn next(&mut self) -> Option<RemoteEnd> {
		self.rx.recv().await
	}

	/// Returns an already accepted connection without waiting.
	pub fn try_next(&mut self) -> Option<RemoteEnd> {
		self.rx.try_recv().ok()
	}
}

impl ChannelConnector {
	pub fn new() -> (Self, RemoteEnds) {
		let (accepted, rx) = mpsc::unbounded_channel();
		let connector = Self {
			state: Arc::new(Mutex::new(ConnectorState::default())),
			accepted,
		};
		(connector, RemoteEnds { rx })
	}

	/// Refuses every attempt while `refusing` is set.
	pub fn set_refusing(&self, refusing: bool) {
		self.state.lock().refusing = refusing;
	}

	/// Refuses the next `count` attempts, then accepts again.
	pub fn refuse_next(&self, count: u32) {
		self.state.lock().refuse_remaining = count;
	}

	pub fn attempts(&self) -> Vec<ConnectAttempt> {
		self.state.lock().attempts.clone()
	}

	pub fn attempt_count(&self) -> usize {
		self.state.lock().attempts.len()
	}
}

#[async_trait]
impl Connector for ChannelConnector {
	async fn connect(&self, endpoint: &str) -> Result<TransportParts> {
		parse_endpoint(endpoint)?;

		let accepted = {
			let mut state = self.state.lock();
			let accepted = if state.refusing {
				false
			} else if state.refuse_remaining > 0 {
				state.refuse_remaining -= 1;
				false
			} else {
				true
			};
			state.attempts.push(ConnectAttempt {
				endpoint: endpoint.to_string(),
				at: Instant::now(),
				accepted,
			});
			accepted
		};

		if !accepted {
			return Err(Error::ConnectionFailed {
				endpoint: endpoint.to_string(),
				reason: "connection refused".to_string(),
			});
		}

		let (to_client, client_rx) = mpsc::unbounded_channel();
		let (client_tx, from_client) = mpsc::unbounded_channel();
		let open = Arc::new(AtomicBool::new(true));

		let remote = RemoteEnd {
			endpoint: endpoint.to_string(),
			to_client,
			from_client,
			open: Arc::clone(&open),
		};
		self.accepted.send(remote).map_err(|_| Error::ChannelClosed)?;

		Ok(TransportParts {
			sender: Box::new(ChannelSender {
				tx: client_tx,
				open: Arc::clone(&open),
			}),
			receiver: Box::new(ChannelReceiver { rx: client_rx, open }),
		})
	}
}

#[derive(Debug)]
enum Outbound {
	Text(String),
	Close,
}

struct ChannelSender {
	tx: mpsc::UnboundedSender<Outbound>,
	open: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSender for ChannelSender {
	async fn send(&mut self, text: &str) -> Result<()> {
		if !self.open.load(Ordering::Acquire) {
			return Err(Error::ChannelClosed);
		}
		self.tx.send(Outbound::Text(text.to_owned())).map_err(|_| {
			self.open.store(false, Ordering::Release);
			Error::TransportError("remote end dropped".to_string())
		})
	}

	async fn close(&mut self) -> Result<()> {
		self.open.store(false, Ordering::Release);
		let _ = self.tx.send(Outbound::Close);
		Ok(())
	}

	fn is_open(&self) -> bool {
		self.open.load(Ordering::Acquire)
	}
}

struct ChannelReceiver {
	rx: mpsc::UnboundedReceiver<Result<Frame>>,
	open: Arc<AtomicBool>,
}

#[async_trait]
impl FrameReceiver for ChannelReceiver {
	async fn recv(&mut self) -> Result<Frame> {
		match self.rx.recv().await {
			Some(Ok(Frame::Text(text))) => Ok(Frame::Text(text)),
			Some(Ok(Frame::Close(reason))) => {
				self.open.store(false, Ordering::Release);
				Ok(Frame::Close(reason))
			}
			Some(Err(err)) => {
				self.open.store(false, Ordering::Release);
				Err(err)
			}
			None => {
				self.open.store(false, Ordering::Release);
				Ok(Frame::Close(None))
			}
		}
	}
}

/// The engine's side of an in-memory connection.
#[derive(Debug)]
pub struct RemoteEnd {
	endpoint: String,
	to_client: mpsc::UnboundedSender<Result<Frame>>,
	from_client: mpsc::UnboundedReceiver<Outbound>,
	open: Arc<AtomicBool>,
}

impl RemoteEnd {
	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	/// Pushes a text frame to the client. Returns false once the client
	/// receiver is gone.
	pub fn push(&self, text: impl Into<String>) -> bool {
		self.to_client.send(Ok(Frame::Text(text.into()))).is_ok()
	}

	/// Closes the channel from the engine side.
	pub fn close(&self, reason: Option<&str>) {
		self.open.store(false, Ordering::Release);
		let _ = self.to_client.send(Ok(Frame::Close(reason.map(str::to_string))));
	}

	/// Delivers a read error to the client.
	pub fn fail(&self, message: &str) {
		self.open.store(false, Ordering::Release);
		let _ = self
			.to_client
			.send(Err(Error::TransportError(message.to_string())));
	}

	/// Marks the channel dead without telling the client's receiver.
	pub fn sever(&self) {
		self.open.store(false, Ordering::Release);
	}

	pub fn is_open(&self) -> bool {
		self.open.load(Ordering::Acquire)
	}

	/// Waits for the next command the client sent. `None` once the client
	/// closed the channel or dropped its sender.
	pub async fn recv_command(&mut self) -> Option<String> {
		match self.from_client.recv().await {
			Some(Outbound::Text(text)) => Some(text),
			Some(Outbound::Close) | None => None,
		}
	}

	/// Returns an already sent command without waiting.
	pub fn try_recv_command(&mut self) -> Option<String> {
		match self.from_client.try_recv() {
			Ok(Outbound::Text(text)) => Some(text),
			_ => None,
		}
	}

	/// Waits until the client closes or drops the channel, discarding any
	/// commands still queued.
	pub async fn closed_by_client(&mut self) {
		while let Some(Outbound::Text(_)) = self.from_client.recv().await {}
	}
}
