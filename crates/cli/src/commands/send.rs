use std::time::Duration;

use scenelink::{BridgeEvent, Command, ConnectOutcome, SessionBridge};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use super::TARGET;
use crate::config::CliConfig;
use crate::error::{CliError, Result};
use crate::output::{OutputFormat, render_event};

pub async fn run(config: CliConfig, words: &[String], raw: bool, wait: Duration, format: OutputFormat) -> Result<()> {
	let text = words.join(" ");
	let wire = if raw { text } else { text.parse::<Command>()?.to_wire()? };
	let endpoint = config.require_endpoint()?.to_string();

	// One shot: a dropped connection ends the command.
	let bridge = SessionBridge::websocket(config.bridge.with_auto_reconnect(false));
	let mut events = bridge.subscribe();
	if let ConnectOutcome::Failed { reason } = bridge.connect(&endpoint).await? {
		return Err(CliError::ConnectFailed { endpoint, reason });
	}

	let result = send_and_watch(&bridge, &mut events, &wire, wait, format).await;
	bridge.disconnect().await;
	result
}

async fn send_and_watch(
	bridge: &SessionBridge,
	events: &mut broadcast::Receiver<BridgeEvent>,
	wire: &str,
	wait: Duration,
	format: OutputFormat,
) -> Result<()> {
	bridge.send_command(wire).await?;
	info!(target: TARGET, command = wire, "sent");

	let deadline = tokio::time::sleep(wait);
	tokio::pin!(deadline);
	loop {
		let event = tokio::select! {
			_ = &mut deadline => return Ok(()),
			event = events.recv() => event,
		};
		match event {
			Ok(event) => {
				println!("{}", render_event(&event, format)?);
				if event.as_status().is_some_and(|s| !s.is_connected) {
					return Ok(());
				}
			}
			Err(RecvError::Lagged(skipped)) => warn!(target: TARGET, skipped, "output fell behind"),
			Err(RecvError::Closed) => return Ok(()),
		}
	}
}
