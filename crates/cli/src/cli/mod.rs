
use std::path::PathBuf;

use clap::Parser;

/// Replays a serial chooser scenario and prints what the requester saw.
#[derive(Parser, Debug)]
#[command(name = "serial-chooser")]
#[command(about = "Replay serial port chooser scenarios against an in-memory port catalog")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Scenario file (JSON). Reads stdin when omitted or `-`.
	#[arg(short, long, value_name = "FILE")]
	pub scenario: Option<PathBuf>,

	/// Pretty-print the JSON report
	#[arg(long)]
	pub pretty: bool,
}

impl Cli {
	/// Returns the scenario path, or `None` for stdin.
	pub fn scenario_path(&self) -> Option<&PathBuf> {
		self.scenario.as_ref().filter(|path| path.as_os_str() != "-")
	}
}
