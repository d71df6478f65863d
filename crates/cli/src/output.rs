//! Rendering of bridge events, snapshots and commands for stdout.

use clap::ValueEnum;
use scenelink::{BridgeEvent, Command, SceneEvent, SessionSnapshot};
use serde_json::json;

use crate::error::Result;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable lines
	#[default]
	Text,
	/// One JSON object per line
	Json,
}

pub fn render_event(event: &BridgeEvent, format: OutputFormat) -> Result<String> {
	match format {
		OutputFormat::Json => Ok(serde_json::to_string(event)?),
		OutputFormat::Text => Ok(match event {
			BridgeEvent::StatusChanged(snapshot) => format!("status  {}", snapshot_line(snapshot)),
			BridgeEvent::SceneUpdated(scene) => format!("scene   {}", scene_line(scene)),
		}),
	}
}

pub fn render_snapshot(snapshot: &SessionSnapshot, format: OutputFormat) -> Result<String> {
	match format {
		OutputFormat::Json => Ok(serde_json::to_string(snapshot)?),
		OutputFormat::Text => Ok(snapshot_line(snapshot)),
	}
}

/// Wire text for `text`; JSON adds the structured form.
pub fn render_command(command: &Command, format: OutputFormat) -> Result<String> {
	let wire = command.to_wire()?;
	match format {
		OutputFormat::Text => Ok(wire),
		OutputFormat::Json => Ok(serde_json::to_string(&json!({
			"wire": wire,
			"command": command,
		}))?),
	}
}

fn snapshot_line(snapshot: &SessionSnapshot) -> String {
	let mut line = snapshot.connection_state.to_string();
	if let Some(endpoint) = &snapshot.endpoint {
		line.push_str(&format!(" endpoint={endpoint}"));
	}
	if let Some(scene) = &snapshot.current_scene {
		line.push_str(&format!(" scene={scene}"));
	}
	line.push_str(&format!(
		" avatars={} fps={} rendering={}",
		snapshot.avatar_count, snapshot.frame_rate, snapshot.is_rendering
	));
	if let Some(uptime) = snapshot.uptime {
		line.push_str(&format!(" uptime={}s", uptime.as_secs()));
	}
	line
}

fn scene_line(scene: &SceneEvent) -> String {
	let mut line = format!("{} {}", scene.scene, scene.update_type);
	for (key, value) in &scene.payload {
		match value.as_str() {
			Some(text) => line.push_str(&format!(" {key}={text}")),
			None => line.push_str(&format!(" {key}={value}")),
		}
	}
	line
}
