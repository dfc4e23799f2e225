//! Session registry: at most one live chooser per requesting context.
//!
//! The registry owns its sessions. A session's close hook holds only a weak
//! reference back to the registry and removes the entry by (identity,
//! session id), so a late close of a superseded session can never evict its
//! replacement. The map lock is never held while a session runs teardown or
//! while a session is dropped, which makes every entry point reentrant from
//! outcome callbacks.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serial_chooser_protocol::{FilterCriterion, IdentityKey, PortDescriptor, SessionId};
use tracing::debug;

use crate::identity::RequestingIdentity;
use crate::session::{ChooserSession, CloseHook, Collaborators, SessionHandle};


type SessionMap = HashMap<IdentityKey, Arc<ChooserSession>>;

struct RegistryInner {
	sessions: Mutex<SessionMap>,
	collaborators: Collaborators,
}

impl RegistryInner {
	/// Removes the entry for `key` only if it still belongs to `session_id`.
	fn remove_session(&self, key: IdentityKey, session_id: SessionId) -> bool {
		let removed = {
			let mut sessions = self.sessions.lock();
			match sessions.get(&key) {
				Some(session) if session.id() == session_id => sessions.remove(&key),
				_ => None,
			}
		};
		let found = removed.is_some();
		if found {
			debug!(target = "serial.registry", identity = %key, session = %session_id, "session removed");
		}
		// Dropped here, outside the map lock.
		drop(removed);
		found
	}
}

/// Keyed store of chooser sessions.
#[derive(Clone)]
pub struct SessionRegistry {
	inner: Arc<RegistryInner>,
}

impl SessionRegistry {
	pub fn new(collaborators: Collaborators) -> Self {
		Self {
			inner: Arc::new(RegistryInner {
				sessions: Mutex::new(HashMap::new()),
				collaborators,
			}),
		}
	}

	pub fn collaborators(&self) -> &Collaborators {
		&self.inner.collaborators
	}

	/// Opens a chooser for `identity`, superseding any live one.
	///
	/// The previous session is taken out of the map and resolves with `None`
	/// before the new session is created, so its outcome is delivered before
	/// the new callback exists and before the new session subscribes or
	/// enumerates. An open that slips in between (another thread, or the
	/// previous outcome callback reopening) is displaced by the insert and
	/// superseded the same way; the last insert wins.
	pub fn open<F>(&self, identity: RequestingIdentity, filters: Vec<FilterCriterion>, on_resolved: F) -> SessionHandle
	where
		F: FnOnce(Option<PortDescriptor>) + Send + 'static,
	{
		let key = identity.key();
		let previous = self.inner.sessions.lock().remove(&key);
		if let Some(previous) = previous {
			debug!(target = "serial.registry", identity = %key, previous = %previous.id(), "superseding chooser");
			previous.supersede();
		}

		let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
		let on_closed: CloseHook = Box::new(move |session_id| {
			if let Some(inner) = weak.upgrade() {
				inner.remove_session(key, session_id);
			}
		});
		let session = ChooserSession::new(
			identity,
			filters,
			&self.inner.collaborators,
			Box::new(on_resolved),
			Some(on_closed),
		);
		let handle = session.handle();

		let displaced = self.inner.sessions.lock().insert(key, Arc::clone(&session));
		if let Some(displaced) = displaced {
			debug!(
				target = "serial.registry",
				identity = %key,
				previous = %displaced.id(),
				next = %session.id(),
				"superseding concurrent chooser"
			);
			displaced.supersede();
		}

		debug!(target = "serial.registry", identity = %key, session = %session.id(), "chooser opened");
		session.start();
		handle
	}

	/// Erases the entry for `key`.
	///
	/// A session dropped here while still pending resolves with `None`.
	pub fn remove(&self, key: IdentityKey) -> bool {
		let removed = self.inner.sessions.lock().remove(&key);
		removed.is_some()
	}

	/// Cancels the live session for `key`, if any.
	pub fn cancel(&self, key: IdentityKey) -> bool {
		let session = self.inner.sessions.lock().get(&key).cloned();
		match session {
			Some(session) => {
				session.cancel();
				true
			}
			None => false,
		}
	}

	/// Routes a context destruction to its session, then drops the entry.
	pub fn on_identity_destroyed(&self, key: IdentityKey) {
		let session = self.inner.sessions.lock().get(&key).cloned();
		if let Some(session) = session {
			debug!(target = "serial.registry", identity = %key, session = %session.id(), "requesting context destroyed");
			session.notify_identity_destroyed();
			self.inner.remove_session(key, session.id());
		}
	}

	/// Returns a handle to the live session for `key`.
	pub fn get(&self, key: IdentityKey) -> Option<SessionHandle> {
		self.inner.sessions.lock().get(&key).map(|s| s.handle())
	}

	pub fn contains(&self, key: IdentityKey) -> bool {
		self.inner.sessions.lock().contains_key(&key)
	}

	pub fn len(&self) -> usize {
		self.inner.sessions.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.sessions.lock().is_empty()
	}

	/// Cancels every live session.
	pub fn shutdown(&self) {
		let sessions: Vec<_> = self.inner.sessions.lock().drain().map(|(_, s)| s).collect();
		if !sessions.is_empty() {
			debug!(target = "serial.registry", count = sessions.len(), "shutting down choosers");
		}
		for session in sessions {
			session.cancel();
		}
	}
}

impl fmt::Debug for SessionRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionRegistry").field("sessions", &self.len()).finish()
	}
}
