//! Error types for the scenelink runtime.

use scenelink_protocol::ProtocolError;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the scenelink runtime and bridge.
#[derive(Debug, Error)]
pub enum Error {
	/// Endpoint is not a usable `ws://` or `wss://` URL.
	#[error("Invalid endpoint '{endpoint}': {reason}")]
	InvalidEndpoint { endpoint: String, reason: String },

	/// Failed to establish a connection with the engine.
	#[error("Failed to connect to {endpoint}: {reason}")]
	ConnectionFailed { endpoint: String, reason: String },

	/// Transport-level error (read/write on an open channel).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Operation requires a connected session.
	#[error("Not connected to the engine")]
	NotConnected,

	/// Command could not be rendered to wire text.
	#[error("Invalid command: {0}")]
	InvalidCommand(#[from] ProtocolError),

	/// Channel closed unexpectedly.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// Timeout waiting for operation.
	#[error("Timeout: {0}")]
	Timeout(String),
}

impl Error {
	/// Returns true for failures to reach the engine (refused, unreachable,
	/// handshake timeout). These are expected outcomes, not bugs.
	pub fn is_connection_failure(&self) -> bool {
		matches!(
			self,
			Error::ConnectionFailed { .. } | Error::Timeout(_)
		)
	}

	/// Returns true if the operation failed because no session is active.
	pub fn is_not_connected(&self) -> bool {
		matches!(self, Error::NotConnected)
	}

	/// Returns true for errors caused by how the caller used the API rather
	/// than by the engine or the network.
	pub fn is_misuse(&self) -> bool {
		matches!(
			self,
			Error::NotConnected | Error::InvalidEndpoint { .. } | Error::InvalidCommand(_)
		)
	}
}
