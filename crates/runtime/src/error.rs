//! Error types for the chooser runtime.
//!
//! None of these reach the original requester: a session logs the error,
//! records a [`CloseReason`](serial_chooser_protocol::CloseReason) and
//! resolves with no port. They are returned by the collaborator seams and
//! reported to the embedder as diagnostics.

use serial_chooser_protocol::PortId;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a chooser.
#[derive(Debug, Clone, Error)]
pub enum Error {
	/// The port catalog could not enumerate devices.
	#[error("Port enumeration unavailable: {0}")]
	EnumerationUnavailable(String),

	/// The surface picked a port that is no longer a candidate.
	#[error("Selected port {port_id} is no longer available")]
	StaleSelection { port_id: PortId },

	/// The permission store failed to record a grant.
	#[error("Failed to grant access to port {port_id}: {reason}")]
	GrantFailed { port_id: PortId, reason: String },

	/// The port catalog lost its device manager.
	#[error("Port catalog disconnected")]
	CatalogDisconnected,

	/// No async runtime was available to drive enumeration.
	#[error("No async runtime available to enumerate ports")]
	NoRuntime,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn grant_failure_names_port() {
		let err = Error::GrantFailed {
			port_id: PortId::from("1"),
			reason: "disk full".into(),
		};
		assert_eq!(err.to_string(), "Failed to grant access to port 1: disk full");
	}

	#[test]
	fn stale_selection_names_port() {
		let err = Error::StaleSelection {
			port_id: PortId::from("7"),
		};
		assert_eq!(err.to_string(), "Selected port 7 is no longer available");
	}
}
