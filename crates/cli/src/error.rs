use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("failed to read scenario {path}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid scenario: {0}")]
	Json(#[from] serde_json::Error),

	/// A step could not be applied in the state the scenario reached.
	#[error("step {step} ({op}): {message}")]
	Step {
		step: usize,
		op: &'static str,
		message: String,
	},
}

impl CliError {
	pub(crate) fn step(step: usize, op: &'static str, message: impl Into<String>) -> Self {
		Self::Step {
			step,
			op,
			message: message.into(),
		}
	}
}
