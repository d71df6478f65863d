use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use crate::styles::cli_styles;

#[derive(Parser, Debug)]
#[command(name = "scenelink")]
#[command(about = "Drive a remote rendering engine over its command channel")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: text (default) or json (one object per line)
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Configuration file (defaults to <config dir>/scenelink/config.json)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Engine endpoint, e.g. ws://localhost:8765
	#[arg(short, long, global = true, value_name = "URL")]
	pub endpoint: Option<String>,

	/// Do not reconnect after the engine drops the connection
	#[arg(long, global = true)]
	pub no_reconnect: bool,

	/// Bound on opening the connection, in milliseconds
	#[arg(long, global = true, value_name = "MS")]
	pub connect_timeout_ms: Option<u64>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Connect, send one command, print notifications, then disconnect
	#[command(after_help = "Examples:\n  \
		scenelink send status\n  \
		scenelink send spawn_avatar Bob model.fbx 0 0 0\n  \
		scenelink send --raw 'custom_verb 1 2'")]
	Send {
		/// Command words, e.g. `move_avatar bob-1 -1.5 0 2 90`
		#[arg(required = true, allow_hyphen_values = true, trailing_var_arg = true, value_name = "COMMAND")]
		command: Vec<String>,

		/// How long to print notifications after sending
		#[arg(long, default_value_t = 1000, value_name = "MS")]
		wait_ms: u64,

		/// Send the text verbatim without validating it
		#[arg(long)]
		raw: bool,
	},

	/// Interactive session: each stdin line is a command
	///
	/// `:status` prints a snapshot, `:raw <text>` sends text verbatim and
	/// `:quit` exits. Notifications print as they arrive.
	Watch,

	/// Validate a command offline and print its wire form
	Parse {
		#[arg(required = true, allow_hyphen_values = true, trailing_var_arg = true, value_name = "COMMAND")]
		command: Vec<String>,
	},

	/// Print the effective configuration
	Config,
}
