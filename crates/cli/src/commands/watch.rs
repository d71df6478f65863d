use scenelink::{BridgeEvent, Command, ConnectOutcome, ProtocolError, SessionBridge};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::TARGET;
use crate::config::CliConfig;
use crate::error::{CliError, Result};
use crate::output::{OutputFormat, render_event, render_snapshot};

/// One line of interactive input.
#[derive(Debug, PartialEq)]
enum Input {
	Empty,
	Quit,
	Status,
	Raw(String),
	Command(Command),
}

fn classify(line: &str) -> std::result::Result<Input, ProtocolError> {
	let line = line.trim();
	if line.is_empty() {
		return Ok(Input::Empty);
	}
	match line.split_once(char::is_whitespace) {
		Some((":raw", rest)) => Ok(Input::Raw(rest.trim().to_string())),
		_ if line == ":raw" => Ok(Input::Raw(String::new())),
		_ if line == ":quit" || line == ":q" => Ok(Input::Quit),
		_ if line == ":status" => Ok(Input::Status),
		_ => line.parse().map(Input::Command),
	}
}

pub async fn run(config: CliConfig, format: OutputFormat) -> Result<()> {
	let endpoint = config.require_endpoint()?.to_string();
	let auto_reconnect = config.bridge.auto_reconnect;

	let bridge = SessionBridge::websocket(config.bridge);
	let mut events = bridge.subscribe();
	if let ConnectOutcome::Failed { reason } = bridge.connect(&endpoint).await? {
		if !auto_reconnect {
			return Err(CliError::ConnectFailed { endpoint, reason });
		}
		warn!(target: TARGET, %endpoint, %reason, "engine unreachable, retrying in the background");
	}

	let result = interact(&bridge, &mut events, format).await;
	bridge.disconnect().await;
	result
}

async fn interact(
	bridge: &SessionBridge,
	events: &mut broadcast::Receiver<BridgeEvent>,
	format: OutputFormat,
) -> Result<()> {
	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => return Ok(()),
			line = lines.next_line() => {
				let Some(line) = line? else {
					debug!(target: TARGET, "stdin closed");
					return Ok(());
				};
				if !handle_line(bridge, &line, format).await? {
					return Ok(());
				}
			}
			event = events.recv() => match event {
				Ok(event) => println!("{}", render_event(&event, format)?),
				Err(RecvError::Lagged(skipped)) => warn!(target: TARGET, skipped, "output fell behind"),
				Err(RecvError::Closed) => return Ok(()),
			},
		}
	}
}

/// Returns false when the session should end.
async fn handle_line(bridge: &SessionBridge, line: &str, format: OutputFormat) -> Result<bool> {
	let sent = match classify(line) {
		Err(err) => {
			eprintln!("invalid command: {err}");
			return Ok(true);
		}
		Ok(Input::Empty) => return Ok(true),
		Ok(Input::Quit) => return Ok(false),
		Ok(Input::Status) => {
			println!("{}", render_snapshot(&bridge.status().await, format)?);
			return Ok(true);
		}
		Ok(Input::Raw(text)) => bridge.send_command(&text).await,
		Ok(Input::Command(command)) => bridge.send(&command).await,
	};
	if let Err(err) = sent {
		eprintln!("error: {err}");
	}
	Ok(true)
}
