//! Layered CLI configuration: file, then environment, then flags.

use std::path::{Path, PathBuf};

use scenelink::BridgeConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::Cli;
use crate::error::{CliError, Result};

pub const ENV_ENDPOINT: &str = "SCENELINK_ENDPOINT";
pub const ENV_AUTO_RECONNECT: &str = "SCENELINK_AUTO_RECONNECT";

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CliConfig {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub endpoint: Option<String>,
	#[serde(flatten)]
	pub bridge: BridgeConfig,
}

/// `<config dir>/scenelink/config.json`, if the platform has a config dir.
pub fn default_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("scenelink").join(CONFIG_FILE))
}

/// The file `--config` names, else the default location.
pub fn source_path(explicit: Option<&Path>) -> Option<PathBuf> {
	explicit.map(Path::to_path_buf).or_else(default_path)
}

impl CliConfig {
	/// Reads `path`. An explicit path must exist; a missing default file
	/// yields the defaults.
	pub fn load(path: &Path, explicit: bool) -> Result<Self> {
		let raw = match std::fs::read_to_string(path) {
			Ok(raw) => raw,
			Err(err) if !explicit && err.kind() == std::io::ErrorKind::NotFound => {
				debug!(target: "scenelink::cli", path = %path.display(), "no config file");
				return Ok(Self::default());
			}
			Err(source) => {
				return Err(CliError::ConfigRead {
					path: path.to_path_buf(),
					source,
				});
			}
		};
		serde_json::from_str(&raw).map_err(|source| CliError::ConfigParse {
			path: path.to_path_buf(),
			source,
		})
	}

	/// Applies environment overrides read through `lookup`.
	pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|v| !v.trim().is_empty()) {
			self.endpoint = Some(endpoint);
		}
		if let Some(value) = lookup(ENV_AUTO_RECONNECT) {
			self.bridge.auto_reconnect = parse_flag(&value).ok_or(CliError::InvalidEnv {
				name: ENV_AUTO_RECONNECT,
				value,
			})?;
		}
		Ok(())
	}

	pub fn apply_flags(&mut self, cli: &Cli) {
		if let Some(endpoint) = &cli.endpoint {
			self.endpoint = Some(endpoint.clone());
		}
		if cli.no_reconnect {
			self.bridge.auto_reconnect = false;
		}
		if let Some(ms) = cli.connect_timeout_ms {
			self.bridge.connect_timeout_ms = ms;
		}
	}

	/// File, then process environment, then flags.
	pub fn resolve(cli: &Cli) -> Result<Self> {
		let mut config = match source_path(cli.config.as_deref()) {
			Some(path) => Self::load(&path, cli.config.is_some())?,
			None => Self::default(),
		};
		config.apply_env(|name| std::env::var(name).ok())?;
		config.apply_flags(cli);
		Ok(config)
	}

	pub fn require_endpoint(&self) -> Result<&str> {
		self.endpoint
			.as_deref()
			.map(str::trim)
			.filter(|e| !e.is_empty())
			.ok_or(CliError::MissingEndpoint)
	}
}

fn parse_flag(value: &str) -> Option<bool> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}
