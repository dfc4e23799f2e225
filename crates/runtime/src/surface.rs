//! Selection surface seam.
//!
//! The surface renders the candidate list and asks the user. The runtime
//! hands it a [`ResolutionSink`] with every presentation; the surface answers
//! through that sink exactly once. Dropping an unused sink counts as a
//! dismissal, so a session can never be left without an answer.

use std::fmt;
use std::sync::Weak;

use serial_chooser_protocol::{PortDescriptor, PortId, SessionId};

use crate::error::Error;
use crate::identity::RequestingIdentity;
use crate::session::ChooserSession;

/// UI side of a chooser.
pub trait SelectionSurface: Send + Sync {
	/// Shows `candidates` for `identity`.
	///
	/// Returns true if the surface took ownership of `sink`. Returning false
	/// resolves the chooser with no port immediately.
	fn present(&self, identity: &RequestingIdentity, candidates: &[PortDescriptor], sink: ResolutionSink) -> bool;

	/// A matching port appeared while the chooser is shown.
	fn notify_added(&self, identity: &RequestingIdentity, port: &PortDescriptor);

	/// A shown port disappeared.
	fn notify_removed(&self, identity: &RequestingIdentity, port: &PortDescriptor);

	/// The chooser was closed by something other than the surface.
	fn notify_closed(&self, identity: &RequestingIdentity);

	/// Non-fatal problem worth surfacing to the embedder.
	fn report_diagnostic(&self, identity: &RequestingIdentity, error: &Error) {
		let _ = (identity, error);
	}
}

/// Single-use answer channel from a surface back to its chooser session.
pub struct ResolutionSink {
	session_id: SessionId,
	session: Weak<ChooserSession>,
	used: bool,
}

impl ResolutionSink {
	pub(crate) fn new(session_id: SessionId, session: Weak<ChooserSession>) -> Self {
		Self {
			session_id,
			session,
			used: false,
		}
	}

	/// Returns the session this sink answers.
	pub fn session_id(&self) -> SessionId {
		self.session_id
	}

	/// Resolves the chooser with the chosen port id, or none.
	pub fn resolve(mut self, chosen: Option<PortId>) {
		self.used = true;
		if let Some(session) = self.session.upgrade() {
			session.on_selection_resolved(chosen);
		}
	}

	/// Resolves the chooser with `port_id`.
	pub fn select(self, port_id: PortId) {
		self.resolve(Some(port_id));
	}

	/// Resolves the chooser without a port.
	pub fn dismiss(self) {
		self.resolve(None);
	}
}

impl Drop for ResolutionSink {
	fn drop(&mut self) {
		if self.used {
			return;
		}
		if let Some(session) = self.session.upgrade() {
			session.on_sink_abandoned();
		}
	}
}

impl fmt::Debug for ResolutionSink {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResolutionSink")
			.field("session_id", &self.session_id)
			.field("used", &self.used)
			.finish()
	}
}
