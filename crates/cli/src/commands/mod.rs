mod config;
mod parse;
mod send;
mod watch;

use std::time::Duration;

use crate::cli::{Cli, Commands};
use crate::config::CliConfig;
use crate::error::Result;

const TARGET: &str = "scenelink::cli";

pub async fn dispatch(cli: Cli) -> Result<()> {
	let format = cli.format;
	match &cli.command {
		Commands::Parse { command } => parse::run(command, format),
		Commands::Config => {
			let config = CliConfig::resolve(&cli)?;
			config::run(&config, cli.config.as_deref(), format)
		}
		Commands::Send { command, wait_ms, raw } => {
			let config = CliConfig::resolve(&cli)?;
			send::run(config, command, *raw, Duration::from_millis(*wait_ms), format).await
		}
		Commands::Watch => {
			let config = CliConfig::resolve(&cli)?;
			watch::run(config, format).await
		}
	}
}
