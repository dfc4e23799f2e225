//! Scenario files.
//!
//! A scenario describes the attached ports, the request a page makes and an
//! ordered list of things that happen while the chooser is open:
//!
//! ```json
//! {
//!   "origin": "https://maker.test",
//!   "ports": [{ "portId": "1", "path": "/dev/ttyACM0", "vendorId": 9025 }],
//!   "filters": [{ "vendorId": 9025 }],
//!   "steps": [
//!     { "op": "attach", "port": { "portId": "2", "path": "/dev/ttyACM1", "vendorId": 9025 } },
//!     { "op": "choose", "portId": "2" }
//!   ]
//! }
//! ```

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serial_chooser::runtime::SnapshotAt;
use serial_chooser::{ChooserOptions, FilterCriterion, Origin, OriginPair, PortDescriptor, PortId};

use crate::error::{CliError, Result};

fn default_origin() -> Origin {
	Origin::from("https://localhost")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Scenario {
	/// Origin of the requesting frame.
	#[serde(default = "default_origin")]
	pub origin: Origin,
	/// Origin of the top-level page; defaults to `origin`.
	#[serde(default)]
	pub embedding_origin: Option<Origin>,
	/// Ports attached before the request.
	#[serde(default)]
	pub ports: Vec<PortDescriptor>,
	#[serde(default)]
	pub filters: Vec<FilterCriterion>,
	#[serde(default)]
	pub options: ChooserOptions,
	/// Delays enumeration until a `releaseEnumeration` step.
	#[serde(default)]
	pub hold_enumeration: Option<HoldEnumeration>,
	/// Makes every permission grant fail.
	#[serde(default)]
	pub read_only_permissions: bool,
	#[serde(default)]
	pub steps: Vec<Step>,
}

/// When a held enumeration takes its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HoldEnumeration {
	Request,
	Release,
}

impl From<HoldEnumeration> for SnapshotAt {
	fn from(hold: HoldEnumeration) -> Self {
		match hold {
			HoldEnumeration::Request => SnapshotAt::Request,
			HoldEnumeration::Release => SnapshotAt::Release,
		}
	}
}

/// One thing that happens while the chooser runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
	/// A device is plugged in.
	Attach { port: PortDescriptor },
	/// A device is unplugged.
	Detach { port_id: PortId },
	/// The user picks a port in the shown chooser.
	Choose { port_id: PortId },
	/// The user closes the shown chooser.
	Dismiss,
	/// The page aborts its request.
	Cancel,
	/// The requesting frame goes away.
	DestroyContext,
	/// The device manager connection drops.
	Disconnect,
	/// The page requests again; `filters` defaults to the scenario's.
	Reopen {
		#[serde(default)]
		filters: Option<Vec<FilterCriterion>>,
	},
	/// Lets a held enumeration complete.
	ReleaseEnumeration,
}

impl Step {
	pub fn op(&self) -> &'static str {
		match self {
			Step::Attach { .. } => "attach",
			Step::Detach { .. } => "detach",
			Step::Choose { .. } => "choose",
			Step::Dismiss => "dismiss",
			Step::Cancel => "cancel",
			Step::DestroyContext => "destroyContext",
			Step::Disconnect => "disconnect",
			Step::Reopen { .. } => "reopen",
			Step::ReleaseEnumeration => "releaseEnumeration",
		}
	}
}

impl Scenario {
	pub fn from_json(json: &str) -> Result<Self> {
		Ok(serde_json::from_str(json)?)
	}

	/// Loads a scenario from `path`, or from stdin when `path` is `None`.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let json = match path {
			Some(path) => std::fs::read_to_string(path).map_err(|source| CliError::Io {
				path: path.to_path_buf(),
				source,
			})?,
			None => {
				let mut json = String::new();
				std::io::stdin().read_to_string(&mut json).map_err(|source| CliError::Io {
					path: "<stdin>".into(),
					source,
				})?;
				json
			}
		};
		Self::from_json(&json)
	}

	pub fn origins(&self) -> OriginPair {
		OriginPair::new(
			self.origin.clone(),
			self.embedding_origin.clone().unwrap_or_else(|| self.origin.clone()),
		)
	}
}
