//! Requesting-context identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Registry key of a requesting context (one tab or frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(pub u64);

impl fmt::Display for IdentityKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "frame#{}", self.0)
	}
}

/// A serialized web origin such as `https://example.com`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
	pub fn new(origin: impl Into<String>) -> Self {
		Self(origin.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Origin {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for Origin {
	fn from(origin: &str) -> Self {
		Self(origin.to_string())
	}
}

/// Origins a grant is recorded against.
///
/// `requesting` is the frame that asked, `embedding` is the top-level page
/// hosting it. Both are identical for a main frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginPair {
	pub requesting: Origin,
	pub embedding: Origin,
}

impl OriginPair {
	pub fn new(requesting: impl Into<Origin>, embedding: impl Into<Origin>) -> Self {
		Self {
			requesting: requesting.into(),
			embedding: embedding.into(),
		}
	}

	/// Pair for a top-level frame, where requesting and embedding origins match.
	pub fn main_frame(origin: impl Into<Origin>) -> Self {
		let origin = origin.into();
		Self {
			requesting: origin.clone(),
			embedding: origin,
		}
	}
}

impl From<String> for Origin {
	fn from(origin: String) -> Self {
		Self(origin)
	}
}
