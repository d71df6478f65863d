//! Outbound command grammar.
//!
//! Commands are rendered as a single line of space-separated tokens with the
//! verb first, e.g. `spawn_avatar Bob model.fbx 0 0 0`. The engine does not
//! acknowledge commands; any effect shows up later as an inbound push.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Position or Euler rotation in engine units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
	pub x: f64,
	pub y: f64,
	pub z: f64,
}

impl Vec3 {
	pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

	pub fn new(x: f64, y: f64, z: f64) -> Self {
		Self { x, y, z }
	}

	fn validate(&self, field: &'static str) -> Result<(), ProtocolError> {
		if self.x.is_finite() && self.y.is_finite() && self.z.is_finite() {
			Ok(())
		} else {
			Err(ProtocolError::NonFinite { field })
		}
	}
}

impl fmt::Display for Vec3 {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {} {}", self.x, self.y, self.z)
	}
}

/// A command understood by the remote engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum Command {
	/// Ask the engine to push a fresh `status` message.
	Status,
	/// Ask for a description of the loaded scene.
	GetSceneInfo,
	/// Request a capture of the current frame; the engine replies with a
	/// base64-encoded image.
	CaptureScene,
	SpawnAvatar {
		name: String,
		model_path: String,
		position: Vec3,
	},
	UpdatePose {
		avatar_id: String,
		position: Vec3,
		rotation: Vec3,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		facial_expression: Option<String>,
	},
	MoveAvatar {
		avatar_id: String,
		position: Vec3,
		rotation_y: f64,
	},
	AnimateAvatar {
		avatar_id: String,
		animation: String,
	},
	GetAvatarState {
		avatar_id: String,
	},
}

impl Command {
	pub fn spawn_avatar(name: impl Into<String>, model_path: impl Into<String>, position: Vec3) -> Self {
		Command::SpawnAvatar {
			name: name.into(),
			model_path: model_path.into(),
			position,
		}
	}

	pub fn move_avatar(avatar_id: impl Into<String>, position: Vec3, rotation_y: f64) -> Self {
		Command::MoveAvatar {
			avatar_id: avatar_id.into(),
			position,
			rotation_y,
		}
	}

	pub fn animate_avatar(avatar_id: impl Into<String>, animation: impl Into<String>) -> Self {
		Command::AnimateAvatar {
			avatar_id: avatar_id.into(),
			animation: animation.into(),
		}
	}

	/// Wire verb for this command.
	pub fn verb(&self) -> &'static str {
		match self {
			Command::Status => "status",
			Command::GetSceneInfo => "get_scene_info",
			Command::CaptureScene => "capture_scene",
			Command::SpawnAvatar { .. } => "spawn_avatar",
			Command::UpdatePose { .. } => "update_pose",
			Command::MoveAvatar { .. } => "move_avatar",
			Command::AnimateAvatar { .. } => "animate_avatar",
			Command::GetAvatarState { .. } => "get_avatar_state",
		}
	}

	/// Checks that every argument survives the space-separated encoding.
	///
	/// Tokens must be non-empty and whitespace-free, numbers finite.
	pub fn validate(&self) -> Result<(), ProtocolError> {
		match self {
			Command::Status | Command::GetSceneInfo | Command::CaptureScene => Ok(()),
			Command::SpawnAvatar {
				name,
				model_path,
				position,
			} => {
				check_token("name", name)?;
				check_token("model_path", model_path)?;
				position.validate("position")
			}
			Command::UpdatePose {
				avatar_id,
				position,
				rotation,
				facial_expression,
			} => {
				check_token("avatar_id", avatar_id)?;
				position.validate("position")?;
				rotation.validate("rotation")?;
				if let Some(expression) = facial_expression {
					check_token("facial_expression", expression)?;
				}
				Ok(())
			}
			Command::MoveAvatar {
				avatar_id,
				position,
				rotation_y,
			} => {
				check_token("avatar_id", avatar_id)?;
				position.validate("position")?;
				if rotation_y.is_finite() {
					Ok(())
				} else {
					Err(ProtocolError::NonFinite { field: "rotation_y" })
				}
			}
			Command::AnimateAvatar { avatar_id, animation } => {
				check_token("avatar_id", avatar_id)?;
				check_token("animation", animation)
			}
			Command::GetAvatarState { avatar_id } => check_token("avatar_id", avatar_id),
		}
	}

	/// Validates and renders the command to its wire text.
	pub fn to_wire(&self) -> Result<String, ProtocolError> {
		self.validate()?;
		Ok(self.to_string())
	}
}

impl fmt::Display for Command {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.verb())?;
		match self {
			Command::Status | Command::GetSceneInfo | Command::CaptureScene => Ok(()),
			Command::SpawnAvatar {
				name,
				model_path,
				position,
			} => write!(f, " {name} {model_path} {position}"),
			Command::UpdatePose {
				avatar_id,
				position,
				rotation,
				facial_expression,
			} => {
				write!(f, " {avatar_id} {position} {rotation}")?;
				match facial_expression {
					Some(expression) => write!(f, " {expression}"),
					None => Ok(()),
				}
			}
			Command::MoveAvatar {
				avatar_id,
				position,
				rotation_y,
			} => write!(f, " {avatar_id} {position} {rotation_y}"),
			Command::AnimateAvatar { avatar_id, animation } => write!(f, " {avatar_id} {animation}"),
			Command::GetAvatarState { avatar_id } => write!(f, " {avatar_id}"),
		}
	}
}

impl FromStr for Command {
	type Err = ProtocolError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut tokens = s.split_whitespace();
		let verb = tokens.next().ok_or(ProtocolError::EmptyCommand)?;
		let args: Vec<&str> = tokens.collect();

		let command = match verb {
			"status" => {
				expect_arity("status", &args, 0, 0, "0")?;
				Command::Status
			}
			"get_scene_info" => {
				expect_arity("get_scene_info", &args, 0, 0, "0")?;
				Command::GetSceneInfo
			}
			"capture_scene" => {
				expect_arity("capture_scene", &args, 0, 0, "0")?;
				Command::CaptureScene
			}
			"spawn_avatar" => {
				expect_arity("spawn_avatar", &args, 5, 5, "5")?;
				Command::SpawnAvatar {
					name: args[0].to_string(),
					model_path: args[1].to_string(),
					position: parse_vec3(&args[2..5], ["x", "y", "z"])?,
				}
			}
			"update_pose" => {
				expect_arity("update_pose", &args, 7, 8, "7 or 8")?;
				Command::UpdatePose {
					avatar_id: args[0].to_string(),
					position: parse_vec3(&args[1..4], ["px", "py", "pz"])?,
					rotation: parse_vec3(&args[4..7], ["rx", "ry", "rz"])?,
					facial_expression: args.get(7).map(|s| s.to_string()),
				}
			}
			"move_avatar" => {
				expect_arity("move_avatar", &args, 5, 5, "5")?;
				Command::MoveAvatar {
					avatar_id: args[0].to_string(),
					position: parse_vec3(&args[1..4], ["x", "y", "z"])?,
					rotation_y: parse_number("rotation_y", args[4])?,
				}
			}
			"animate_avatar" => {
				expect_arity("animate_avatar", &args, 2, 2, "2")?;
				Command::AnimateAvatar {
					avatar_id: args[0].to_string(),
					animation: args[1].to_string(),
				}
			}
			"get_avatar_state" => {
				expect_arity("get_avatar_state", &args, 1, 1, "1")?;
				Command::GetAvatarState {
					avatar_id: args[0].to_string(),
				}
			}
			other => return Err(ProtocolError::UnknownVerb(other.to_string())),
		};

		command.validate()?;
		Ok(command)
	}
}

fn expect_arity(verb: &'static str, args: &[&str], min: usize, max: usize, expected: &'static str) -> Result<(), ProtocolError> {
	if (min..=max).contains(&args.len()) {
		Ok(())
	} else {
		Err(ProtocolError::Arity {
			verb,
			expected,
			found: args.len(),
		})
	}
}

fn parse_number(field: &'static str, raw: &str) -> Result<f64, ProtocolError> {
	let value: f64 = raw.parse().map_err(|_| ProtocolError::InvalidNumber {
		field,
		value: raw.to_string(),
	})?;
	if value.is_finite() {
		Ok(value)
	} else {
		Err(ProtocolError::NonFinite { field })
	}
}

fn parse_vec3(raw: &[&str], fields: [&'static str; 3]) -> Result<Vec3, ProtocolError> {
	Ok(Vec3 {
		x: parse_number(fields[0], raw[0])?,
		y: parse_number(fields[1], raw[1])?,
		z: parse_number(fields[2], raw[2])?,
	})
}

fn check_token(field: &'static str, value: &str) -> Result<(), ProtocolError> {
	if value.is_empty() || value.chars().any(char::is_whitespace) {
		return Err(ProtocolError::InvalidToken {
			field,
			value: value.to_string(),
		});
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn spawn_avatar_renders_integral_coordinates_without_decimals() {
		let cmd = Command::spawn_avatar("Bob", "model.fbx", Vec3::ZERO);
		assert_eq!(cmd.to_wire().unwrap(), "spawn_avatar Bob model.fbx 0 0 0");
	}

	#[test]
	fn nullary_commands_render_verb_only() {
		assert_eq!(Command::Status.to_string(), "status");
		assert_eq!(Command::GetSceneInfo.to_string(), "get_scene_info");
		assert_eq!(Command::CaptureScene.to_string(), "capture_scene");
	}

	#[test]
	fn update_pose_appends_optional_expression() {
		let without = Command::UpdatePose {
			avatar_id: "a1".into(),
			position: Vec3::new(1.0, 2.0, 3.0),
			rotation: Vec3::new(0.0, 90.0, 0.0),
			facial_expression: None,
		};
		assert_eq!(without.to_string(), "update_pose a1 1 2 3 0 90 0");

		let with = Command::UpdatePose {
			avatar_id: "a1".into(),
			position: Vec3::new(1.0, 2.0, 3.0),
			rotation: Vec3::new(0.0, 90.0, 0.0),
			facial_expression: Some("smile".into()),
		};
		assert_eq!(with.to_string(), "update_pose a1 1 2 3 0 90 0 smile");
	}

	#[test]
	fn move_avatar_keeps_fractional_values() {
		let cmd = Command::move_avatar("a1", Vec3::new(1.5, 0.0, -2.25), 45.5);
		assert_eq!(cmd.to_string(), "move_avatar a1 1.5 0 -2.25 45.5");
	}

	#[test]
	fn parse_accepts_every_documented_verb() {
		let lines = [
			"status",
			"get_scene_info",
			"capture_scene",
			"spawn_avatar Bob model.fbx 0 0 0",
			"update_pose a1 1 2 3 0 90 0",
			"update_pose a1 1 2 3 0 90 0 smile",
			"move_avatar a1 1.5 0 -2.25 45.5",
			"animate_avatar a1 wave",
			"get_avatar_state a1",
		];
		for line in lines {
			let cmd: Command = line.parse().unwrap_or_else(|e| panic!("{line}: {e}"));
			assert_eq!(cmd.to_string(), line);
		}
	}

	#[test]
	fn parse_collapses_extra_whitespace() {
		let cmd: Command = "  animate_avatar   a1\twave ".parse().unwrap();
		assert_eq!(cmd, Command::animate_avatar("a1", "wave"));
	}

	#[test]
	fn parse_rejects_unknown_verb() {
		let err = "teleport a1".parse::<Command>().unwrap_err();
		assert_eq!(err, ProtocolError::UnknownVerb("teleport".into()));
	}

	#[test]
	fn parse_rejects_empty_input() {
		assert_eq!("   ".parse::<Command>().unwrap_err(), ProtocolError::EmptyCommand);
	}

	#[test]
	fn parse_reports_arity_mismatch() {
		let err = "spawn_avatar Bob model.fbx 0 0".parse::<Command>().unwrap_err();
		assert_eq!(
			err,
			ProtocolError::Arity {
				verb: "spawn_avatar",
				expected: "5",
				found: 4,
			}
		);
		assert!("status now".parse::<Command>().is_err());
		assert!("update_pose a1 1 2 3 0 90 0 smile extra".parse::<Command>().is_err());
	}

	#[test]
	fn parse_names_the_bad_coordinate() {
		let err = "move_avatar a1 1 two 3 0".parse::<Command>().unwrap_err();
		assert_eq!(
			err,
			ProtocolError::InvalidNumber {
				field: "y",
				value: "two".into(),
			}
		);
	}

	#[test]
	fn parse_rejects_non_finite_numbers() {
		let err = "move_avatar a1 1 2 3 NaN".parse::<Command>().unwrap_err();
		assert_eq!(err, ProtocolError::NonFinite { field: "rotation_y" });
	}

	#[test]
	fn validate_rejects_tokens_with_whitespace() {
		let cmd = Command::spawn_avatar("Bob Smith", "model.fbx", Vec3::ZERO);
		assert!(matches!(cmd.to_wire(), Err(ProtocolError::InvalidToken { field: "name", .. })));

		let cmd = Command::animate_avatar("a1", "");
		assert!(matches!(cmd.validate(), Err(ProtocolError::InvalidToken { field: "animation", .. })));
	}

	#[test]
	fn validate_rejects_infinite_position() {
		let cmd = Command::spawn_avatar("Bob", "m.fbx", Vec3::new(f64::INFINITY, 0.0, 0.0));
		assert_eq!(cmd.validate(), Err(ProtocolError::NonFinite { field: "position" }));
	}

	#[test]
	fn command_serializes_with_verb_tag() {
		let value = serde_json::to_value(Command::animate_avatar("a1", "wave")).unwrap();
		assert_eq!(value["verb"], "animate_avatar");
		assert_eq!(value["avatar_id"], "a1");
		assert_eq!(value["animation"], "wave");
	}
}
