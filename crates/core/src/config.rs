//! Bridge configuration.

use std::time::Duration;

use scenelink_runtime::ReconnectPolicy;
use serde::{Deserialize, Serialize};

/// Tunables for a [`SessionBridge`](crate::SessionBridge). Every field has a
/// default, so partial JSON documents deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
	/// Bound on opening a transport.
	pub connect_timeout_ms: u64,
	/// Bound on waiting for the receive loop to exit during teardown.
	pub shutdown_timeout_ms: u64,
	/// Reconnect after unrequested connection loss.
	pub auto_reconnect: bool,
	/// Send a background `status` command whenever the status is queried.
	pub status_probe: bool,
	pub reconnect: ReconnectPolicy,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			connect_timeout_ms: 10_000,
			shutdown_timeout_ms: 5_000,
			auto_reconnect: true,
			status_probe: true,
			reconnect: ReconnectPolicy::default(),
		}
	}
}

impl BridgeConfig {
	pub fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout_ms)
	}

	pub fn shutdown_timeout(&self) -> Duration {
		Duration::from_millis(self.shutdown_timeout_ms)
	}

	pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
		self.auto_reconnect = enabled;
		self
	}

	pub fn with_status_probe(mut self, enabled: bool) -> Self {
		self.status_probe = enabled;
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_document_yields_defaults() {
		let config: BridgeConfig = serde_json::from_str("{}").unwrap();
		assert_eq!(config, BridgeConfig::default());
		assert_eq!(config.connect_timeout(), Duration::from_secs(10));
		assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
	}

	#[test]
	fn partial_document_overrides_fields() {
		let config: BridgeConfig = serde_json::from_str(
			r#"{"autoReconnect": false, "reconnect": {"maxAttempts": 3}}"#,
		)
		.unwrap();
		assert!(!config.auto_reconnect);
		assert!(config.status_probe);
		assert_eq!(config.reconnect.max_attempts, 3);
		assert_eq!(config.reconnect.step_secs, 5);
	}
}
