//! Connection phase and session state.
//!
//! [`SessionState`] is owned by the bridge and mutated only under its lock.
//! Everything handed to callers is a [`SessionSnapshot`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use scenelink_protocol::{SceneEvent, StatusUpdate};
use serde::{Serialize, Serializer};

/// Scene-update kinds with a local state effect.
pub const AVATAR_SPAWNED: &str = "AvatarSpawned";
pub const AVATAR_REMOVED: &str = "AvatarRemoved";

/// Lifecycle phase of a [`SessionBridge`](crate::SessionBridge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
	#[default]
	Disconnected,
	Connecting,
	Connected,
	/// A retry is scheduled and its backoff wait is pending.
	Reconnecting,
	/// An explicit disconnect is tearing the session down.
	Closing,
}

impl ConnectionState {
	pub fn as_str(&self) -> &'static str {
		match self {
			ConnectionState::Disconnected => "disconnected",
			ConnectionState::Connecting => "connecting",
			ConnectionState::Connected => "connected",
			ConnectionState::Reconnecting => "reconnecting",
			ConnectionState::Closing => "closing",
		}
	}
}

impl std::fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Live session data as last reported by the engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
	pub is_connected: bool,
	pub endpoint: Option<String>,
	pub current_scene: Option<String>,
	pub avatar_count: u32,
	pub frame_rate: f64,
	pub is_rendering: bool,
	pub connected_since: Option<SystemTime>,
}

impl SessionState {
	pub(crate) fn mark_connected(&mut self, endpoint: &str, now: SystemTime) {
		self.reset();
		self.is_connected = true;
		self.endpoint = Some(endpoint.to_string());
		self.connected_since = Some(now);
	}

	/// Back to disconnected defaults. The endpoint is kept for display.
	pub(crate) fn reset(&mut self) {
		*self = SessionState {
			endpoint: self.endpoint.take(),
			..SessionState::default()
		};
	}

	pub(crate) fn apply_status(&mut self, update: &StatusUpdate) {
		if let Some(scene) = &update.scene {
			self.current_scene = Some(scene.clone());
		}
		if let Some(count) = update.avatar_count {
			self.avatar_count = count;
		}
		if let Some(fps) = update.fps {
			self.frame_rate = fps;
		}
		if let Some(rendering) = update.rendering {
			self.is_rendering = rendering;
		}
	}

	pub(crate) fn apply_scene_event(&mut self, event: &SceneEvent) {
		self.current_scene = Some(event.scene.clone());
		match event.update_type.as_str() {
			AVATAR_SPAWNED => self.avatar_count = self.avatar_count.saturating_add(1),
			AVATAR_REMOVED => self.avatar_count = self.avatar_count.saturating_sub(1),
			_ => {}
		}
	}

	/// Immutable copy with `uptime` computed against `now`.
	pub fn snapshot(&self, phase: ConnectionState, now: SystemTime) -> SessionSnapshot {
		let uptime = self
			.connected_since
			.filter(|_| self.is_connected)
			.map(|since| now.duration_since(since).unwrap_or_default());
		SessionSnapshot {
			connection_state: phase,
			is_connected: self.is_connected,
			endpoint: self.endpoint.clone(),
			current_scene: self.current_scene.clone(),
			avatar_count: self.avatar_count,
			frame_rate: self.frame_rate,
			is_rendering: self.is_rendering,
			connected_since: self.connected_since,
			uptime,
		}
	}
}

/// Point-in-time view of the session handed to callers and subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
	pub connection_state: ConnectionState,
	pub is_connected: bool,
	pub endpoint: Option<String>,
	pub current_scene: Option<String>,
	pub avatar_count: u32,
	pub frame_rate: f64,
	pub is_rendering: bool,
	#[serde(rename = "connectedSinceMs", serialize_with = "serialize_epoch_ms")]
	pub connected_since: Option<SystemTime>,
	#[serde(rename = "uptimeMs", serialize_with = "serialize_duration_ms")]
	pub uptime: Option<Duration>,
}

fn serialize_epoch_ms<S>(value: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let millis = value
		.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
		.map(|d| d.as_millis() as u64);
	millis.serialize(serializer)
}

fn serialize_duration_ms<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	value.map(|d| d.as_millis() as u64).serialize(serializer)
}
