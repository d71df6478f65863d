//! Inbound message schema.
//!
//! Every structured push from the engine is a JSON object whose `type` field
//! names the message kind. [`decode`] performs the one and only inspection of
//! raw JSON; downstream code works with the closed [`InboundMessage`] enum.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Name of the field carrying the message kind.
pub const DISCRIMINATOR: &str = "type";

const KIND_STATUS: &str = "status";
const KIND_SCENE_UPDATE: &str = "scene_update";

/// Periodic status tick. Absent fields mean "unchanged".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusUpdate {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scene: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub avatar_count: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fps: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rendering: Option<bool>,
}

/// Scene change notification. Fields beyond `scene` and `update_type` are
/// kept verbatim in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEvent {
	pub scene: String,
	pub update_type: String,
	#[serde(flatten)]
	pub payload: Map<String, Value>,
}

/// Decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
	Status(StatusUpdate),
	SceneUpdate(SceneEvent),
	/// Well-formed JSON object with a missing or unrecognized discriminator
	/// (forward-compatible catch-all).
	Unknown { kind: Option<String>, raw: Value },
}

impl InboundMessage {
	/// Discriminator value, if any.
	pub fn kind(&self) -> Option<&str> {
		match self {
			InboundMessage::Status(_) => Some(KIND_STATUS),
			InboundMessage::SceneUpdate(_) => Some(KIND_SCENE_UPDATE),
			InboundMessage::Unknown { kind, .. } => kind.as_deref(),
		}
	}
}

/// Classifies one text frame.
///
/// # Errors
///
/// [`DecodeError::NotJson`] for plain text, [`DecodeError::NotAnObject`] for
/// JSON scalars/arrays, [`DecodeError::InvalidFields`] when a known kind has
/// ill-typed or missing fields.
pub fn decode(text: &str) -> Result<InboundMessage, DecodeError> {
	let value: Value = serde_json::from_str(text).map_err(DecodeError::NotJson)?;
	let Value::Object(mut object) = value else {
		return Err(DecodeError::NotAnObject);
	};

	let kind = match object.get(DISCRIMINATOR) {
		Some(Value::String(kind)) => kind.clone(),
		_ => {
			let kind = object.get(DISCRIMINATOR).map(Value::to_string);
			return Ok(InboundMessage::Unknown {
				kind,
				raw: Value::Object(object),
			});
		}
	};

	match kind.as_str() {
		KIND_STATUS => {
			object.remove(DISCRIMINATOR);
			serde_json::from_value(Value::Object(object))
				.map(InboundMessage::Status)
				.map_err(|source| DecodeError::InvalidFields { kind: KIND_STATUS, source })
		}
		KIND_SCENE_UPDATE => {
			object.remove(DISCRIMINATOR);
			serde_json::from_value(Value::Object(object))
				.map(InboundMessage::SceneUpdate)
				.map_err(|source| DecodeError::InvalidFields {
					kind: KIND_SCENE_UPDATE,
					source,
				})
		}
		_ => Ok(InboundMessage::Unknown {
			kind: Some(kind),
			raw: Value::Object(object),
		}),
	}
}
