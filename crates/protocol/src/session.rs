//! Chooser session bookkeeping types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Process-unique id of one chooser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "chooser-{}", self.0)
	}
}

/// Why a chooser session stopped being pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
	/// The surface picked a port that was still a candidate.
	Selected,
	/// The surface resolved without a port.
	Dismissed,
	/// The surface picked a port that had already gone away.
	StaleSelection,
	/// The surface declined to show the chooser.
	SurfaceDeclined,
	/// The caller cancelled the request.
	Cancelled,
	/// A newer request from the same context replaced this one.
	Superseded,
	/// The requesting context was destroyed.
	IdentityGone,
	/// The port catalog lost its connection to the device manager.
	CatalogDisconnected,
	/// The initial enumeration could not be performed.
	EnumerationUnavailable,
	/// The session was dropped while still pending.
	Dropped,
}

impl CloseReason {
	/// Returns true if the selection surface itself ended the session.
	///
	/// For every other reason the surface may still be showing the chooser
	/// and has to be told it was closed.
	pub fn is_surface_initiated(self) -> bool {
		matches!(
			self,
			CloseReason::Selected
				| CloseReason::Dismissed
				| CloseReason::StaleSelection
				| CloseReason::SurfaceDeclined
		)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			CloseReason::Selected => "selected",
			CloseReason::Dismissed => "dismissed",
			CloseReason::StaleSelection => "stale-selection",
			CloseReason::SurfaceDeclined => "surface-declined",
			CloseReason::Cancelled => "cancelled",
			CloseReason::Superseded => "superseded",
			CloseReason::IdentityGone => "identity-gone",
			CloseReason::CatalogDisconnected => "catalog-disconnected",
			CloseReason::EnumerationUnavailable => "enumeration-unavailable",
			CloseReason::Dropped => "dropped",
		}
	}
}

impl fmt::Display for CloseReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn close_reason_serializes_kebab_case() {
		let json = serde_json::to_string(&CloseReason::CatalogDisconnected).unwrap();
		assert_eq!(json, r#""catalog-disconnected""#);
		assert_eq!(CloseReason::CatalogDisconnected.as_str(), "catalog-disconnected");
	}

	#[test]
	fn only_surface_reasons_skip_close_notification() {
		assert!(CloseReason::Selected.is_surface_initiated());
		assert!(CloseReason::Dismissed.is_surface_initiated());
		assert!(!CloseReason::Cancelled.is_surface_initiated());
		assert!(!CloseReason::Superseded.is_surface_initiated());
		assert!(!CloseReason::IdentityGone.is_surface_initiated());
	}
}
