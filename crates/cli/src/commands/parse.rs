use scenelink::Command;

use crate::error::Result;
use crate::output::{OutputFormat, render_command};

pub fn run(words: &[String], format: OutputFormat) -> Result<()> {
	let command: Command = words.join(" ").parse()?;
	println!("{}", render_command(&command, format)?);
	Ok(())
}
