//! Inbound frame classification.

use scenelink_protocol::{DecodeError, InboundMessage, SceneEvent, StatusUpdate, decode};
use tracing::debug;

/// Where an inbound frame goes next.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
	Status(StatusUpdate),
	Scene(SceneEvent),
}

/// Turns raw text frames into routed messages, dropping anything that is not
/// a well-formed `status` or `scene_update` object.
#[derive(Debug, Default, Clone, Copy)]
pub struct InboundDispatcher;

impl InboundDispatcher {
	pub fn new() -> Self {
		Self
	}

	/// Returns `None` for frames that are logged and dropped.
	pub fn route(&self, text: &str) -> Option<Routed> {
		match decode(text) {
			Ok(InboundMessage::Status(update)) => Some(Routed::Status(update)),
			Ok(InboundMessage::SceneUpdate(event)) => Some(Routed::Scene(event)),
			Ok(InboundMessage::Unknown { kind, .. }) => {
				debug!(
					target: "scenelink::dispatch",
					kind = kind.as_deref().unwrap_or("<none>"),
					"ignoring unrecognized message"
				);
				None
			}
			Err(DecodeError::NotJson(_)) => {
				debug!(target: "scenelink::dispatch", frame = %preview(text), "ignoring non-JSON frame");
				None
			}
			Err(err) => {
				debug!(target: "scenelink::dispatch", error = %err, frame = %preview(text), "ignoring malformed frame");
				None
			}
		}
	}
}

fn preview(text: &str) -> &str {
	const MAX: usize = 120;
	if text.len() <= MAX {
		return text;
	}
	let mut end = MAX;
	while !text.is_char_boundary(end) {
		end -= 1;
	}
	&text[..end]
}
