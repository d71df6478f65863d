use std::path::PathBuf;

use scenelink::ProtocolError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

/// Exit code for bad input: flags, config, or a malformed command.
pub const EXIT_USAGE: i32 = 2;
/// Exit code when the engine could not be reached.
pub const EXIT_UNREACHABLE: i32 = 3;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("failed to read config {path}: {source}")]
	ConfigRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid config {path}: {source}")]
	ConfigParse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("invalid value for {name}: '{value}'")]
	InvalidEnv { name: &'static str, value: String },

	#[error("no endpoint configured; pass --endpoint or set SCENELINK_ENDPOINT")]
	MissingEndpoint,

	#[error("invalid command: {0}")]
	Command(#[from] ProtocolError),

	#[error("could not reach {endpoint}: {reason}")]
	ConnectFailed { endpoint: String, reason: String },

	#[error(transparent)]
	Bridge(#[from] scenelink::Error),

	#[error("failed to encode output: {0}")]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl CliError {
	pub fn exit_code(&self) -> i32 {
		match self {
			CliError::ConfigRead { .. }
			| CliError::ConfigParse { .. }
			| CliError::InvalidEnv { .. }
			| CliError::MissingEndpoint
			| CliError::Command(_) => EXIT_USAGE,
			CliError::Bridge(err) if err.is_misuse() => EXIT_USAGE,
			CliError::ConnectFailed { .. } => EXIT_UNREACHABLE,
			CliError::Bridge(err) if err.is_connection_failure() => EXIT_UNREACHABLE,
			_ => 1,
		}
	}
}
