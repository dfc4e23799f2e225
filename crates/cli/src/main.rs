use anyhow::Context;
use clap::Parser;
use serial_chooser_cli::cli::Cli;
use serial_chooser_cli::scenario::Scenario;
use serial_chooser_cli::{logging, run};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let scenario = Scenario::load(cli.scenario_path().map(|p| p.as_path()))?;
	let report = run::run(scenario).await?;

	let json = if cli.pretty {
		serde_json::to_string_pretty(&report)
	} else {
		serde_json::to_string(&report)
	}
	.context("failed to serialize report")?;
	println!("{json}");
	Ok(())
}
