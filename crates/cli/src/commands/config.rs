use std::path::Path;

use serde_json::json;

use crate::config::{CliConfig, source_path};
use crate::error::Result;
use crate::output::OutputFormat;

pub fn run(config: &CliConfig, explicit: Option<&Path>, format: OutputFormat) -> Result<()> {
	let path = source_path(explicit);
	match format {
		OutputFormat::Json => {
			let doc = json!({
				"path": path.as_ref().map(|p| p.display().to_string()),
				"config": config,
			});
			println!("{}", serde_json::to_string(&doc)?);
		}
		OutputFormat::Text => {
			match &path {
				Some(path) if path.exists() => println!("# {}", path.display()),
				Some(path) => println!("# {} (not found, using defaults)", path.display()),
				None => println!("# no config directory, using defaults"),
			}
			println!("{}", serde_json::to_string_pretty(config)?);
		}
	}
	Ok(())
}
