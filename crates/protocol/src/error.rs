use thiserror::Error;

/// Errors raised while building or parsing an outbound [`Command`](crate::Command).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
	#[error("empty command")]
	EmptyCommand,

	#[error("unknown command verb: {0}")]
	UnknownVerb(String),

	#[error("{verb} expects {expected} argument(s), got {found}")]
	Arity {
		verb: &'static str,
		expected: &'static str,
		found: usize,
	},

	#[error("invalid number for {field}: '{value}'")]
	InvalidNumber { field: &'static str, value: String },

	#[error("{field} must be a finite number")]
	NonFinite { field: &'static str },

	/// Token is empty or contains whitespace, which the space-separated
	/// grammar cannot carry.
	#[error("invalid {field}: '{value}' (must be non-empty and contain no whitespace)")]
	InvalidToken { field: &'static str, value: String },
}

/// Reasons an inbound frame could not be turned into an [`InboundMessage`](crate::InboundMessage).
#[derive(Debug, Error)]
pub enum DecodeError {
	/// Frame is not JSON at all (plain text).
	#[error("frame is not JSON: {0}")]
	NotJson(#[source] serde_json::Error),

	/// Frame is JSON but not an object.
	#[error("frame is JSON but not an object")]
	NotAnObject,

	/// Discriminator was recognized but the fields did not match its schema.
	#[error("malformed '{kind}' message: {source}")]
	InvalidFields {
		kind: &'static str,
		#[source]
		source: serde_json::Error,
	},
}
