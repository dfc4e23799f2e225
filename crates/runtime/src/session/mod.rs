//! Chooser session: one in-flight port selection.
//!
//! A session snapshots the catalog, filters the snapshot, keeps the candidate
//! list current from hot-plug events, presents it to the selection surface
//! and delivers exactly one outcome to its caller.
//!
//! # Lifecycle
//!
//! 1. [`start`](ChooserSession::start) subscribes to the catalog and spawns
//!    enumeration. Hot-plug events that arrive before the snapshot are
//!    buffered and replayed over it.
//! 2. The reconciled candidate list is presented together with a
//!    [`ResolutionSink`].
//! 3. The first trigger to arrive (surface answer, cancel, context
//!    destruction, catalog disconnect, enumeration failure, supersession)
//!    claims the pending → resolved transition. The claim takes the callback
//!    and the catalog subscription out of the state under one lock, so no
//!    later trigger or event can observe a half-resolved session.
//! 4. Teardown runs outside the lock: unsubscribe, tell the surface if it is
//!    still showing the chooser, grant permission for a selection, fire the
//!    callback, then notify the owner.
//!
//! Callbacks into collaborators are never made while the session lock is
//! held, so any of them may call back into the session.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serial_chooser_protocol::{CloseReason, FilterCriterion, IdentityKey, PortDescriptor, PortId, SessionId};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::catalog::{self, PortCatalog, PortObserver, Subscription};
use crate::error::{Error, Result};
use crate::filter;
use crate::identity::RequestingIdentity;
use crate::permission::PermissionStore;
use crate::surface::{ResolutionSink, SelectionSurface};


/// Receives the outcome of a chooser: the chosen port, or `None`.
pub type OutcomeCallback = Box<dyn FnOnce(Option<PortDescriptor>) + Send + 'static>;

/// Invoked once a session has fully closed.
pub(crate) type CloseHook = Box<dyn FnOnce(SessionId) + Send + 'static>;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
	SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst))
}

/// External collaborators a session talks to.
#[derive(Clone)]
pub struct Collaborators {
	pub catalog: Arc<dyn PortCatalog>,
	pub surface: Arc<dyn SelectionSurface>,
	pub permissions: Arc<dyn PermissionStore>,
}

impl Collaborators {
	pub fn new(
		catalog: Arc<dyn PortCatalog>,
		surface: Arc<dyn SelectionSurface>,
		permissions: Arc<dyn PermissionStore>,
	) -> Self {
		Self {
			catalog,
			surface,
			permissions,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
	Pending,
	Resolved,
	Closed,
}

#[derive(Debug)]
enum PortEvent {
	Added(PortDescriptor),
	Removed(PortId),
}

#[derive(Debug)]
enum Phase {
	/// Created but not started.
	Idle,
	/// Waiting for the baseline snapshot.
	Enumerating { buffered: Vec<PortEvent> },
	/// Candidates are live.
	Presented,
}

enum CandidateChange {
	Added(PortDescriptor),
	Removed(PortDescriptor),
}

struct SessionState {
	resolution: Resolution,
	phase: Phase,
	candidates: Vec<PortDescriptor>,
	callback: Option<OutcomeCallback>,
	subscription: Option<Subscription>,
	enumeration: Option<AbortHandle>,
	on_closed: Option<CloseHook>,
	presented: bool,
	/// Set while `present` runs; changes made meanwhile are held in
	/// `deferred` so the surface never sees them before the list.
	presenting: bool,
	deferred: Vec<CandidateChange>,
	sink_abandoned: bool,
	identity_destroyed: bool,
	close_reason: Option<CloseReason>,
}

/// Resources released by the pending → resolved transition.
struct Teardown {
	callback: Option<OutcomeCallback>,
	subscription: Option<Subscription>,
	enumeration: Option<AbortHandle>,
	on_closed: Option<CloseHook>,
	presented: bool,
}

/// One in-flight port selection workflow.
pub struct ChooserSession {
	id: SessionId,
	identity: RequestingIdentity,
	filters: Vec<FilterCriterion>,
	collaborators: Collaborators,
	state: Mutex<SessionState>,
	weak_self: Weak<ChooserSession>,
}

impl ChooserSession {
	/// Creates and starts a session that is not owned by a registry.
	///
	/// The returned `Arc` is the only strong reference: dropping it while
	/// the chooser is pending resolves the outcome with `None`.
	pub fn open<F>(
		identity: RequestingIdentity,
		filters: Vec<FilterCriterion>,
		collaborators: &Collaborators,
		on_resolved: F,
	) -> Arc<Self>
	where
		F: FnOnce(Option<PortDescriptor>) + Send + 'static,
	{
		let session = Self::new(identity, filters, collaborators, Box::new(on_resolved), None);
		session.start();
		session
	}

	pub(crate) fn new(
		identity: RequestingIdentity,
		filters: Vec<FilterCriterion>,
		collaborators: &Collaborators,
		on_resolved: OutcomeCallback,
		on_closed: Option<CloseHook>,
	) -> Arc<Self> {
		Arc::new_cyclic(|weak_self| Self {
			id: next_session_id(),
			identity,
			filters,
			collaborators: collaborators.clone(),
			state: Mutex::new(SessionState {
				resolution: Resolution::Pending,
				phase: Phase::Idle,
				candidates: Vec::new(),
				callback: Some(on_resolved),
				subscription: None,
				enumeration: None,
				on_closed,
				presented: false,
				presenting: false,
				deferred: Vec::new(),
				sink_abandoned: false,
				identity_destroyed: false,
				close_reason: None,
			}),
			weak_self: weak_self.clone(),
		})
	}

	/// Subscribes to hot-plug events and kicks off enumeration.
	///
	/// No-op unless the session is pending and not yet started.
	pub(crate) fn start(&self) {
		{
			let mut state = self.state.lock();
			if state.resolution != Resolution::Pending || !matches!(state.phase, Phase::Idle) {
				return;
			}
			state.phase = Phase::Enumerating { buffered: Vec::new() };
		}

		// Subscribe before enumerating so the snapshot cannot miss a change.
		let observer: Weak<dyn PortObserver> = self.weak_self.clone();
		let subscription = catalog::subscribe(&self.collaborators.catalog, observer);
		{
			let mut state = self.state.lock();
			if state.resolution != Resolution::Pending {
				drop(state);
				drop(subscription);
				return;
			}
			state.subscription = Some(subscription);
		}

		let runtime = match tokio::runtime::Handle::try_current() {
			Ok(runtime) => runtime,
			Err(_) => {
				let err = Error::NoRuntime;
				warn!(target = "serial.session", session = %self.id, error = %err, "cannot enumerate ports");
				self.finish(CloseReason::EnumerationUnavailable);
				return;
			}
		};

		debug!(
			target = "serial.session",
			session = %self.id,
			identity = %self.identity.key(),
			filters = self.filters.len(),
			"enumerating ports"
		);

		let enumeration = self.collaborators.catalog.enumerate();
		let weak = self.weak_self.clone();
		let task = runtime.spawn(async move {
			let result = enumeration.await;
			if let Some(session) = weak.upgrade() {
				session.on_enumeration_complete(result);
			}
		});

		let mut state = self.state.lock();
		if state.resolution == Resolution::Pending && matches!(state.phase, Phase::Enumerating { .. }) {
			state.enumeration = Some(task.abort_handle());
		} else if state.resolution != Resolution::Pending {
			task.abort();
		}
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn identity(&self) -> &RequestingIdentity {
		&self.identity
	}

	pub fn filters(&self) -> &[FilterCriterion] {
		&self.filters
	}

	/// Returns true until the outcome has been claimed.
	pub fn is_pending(&self) -> bool {
		self.state.lock().resolution == Resolution::Pending
	}

	/// Returns the current candidates, sorted by path.
	///
	/// Empty before the baseline snapshot and after the session closed.
	pub fn candidates(&self) -> Vec<PortDescriptor> {
		self.state.lock().candidates.clone()
	}

	/// Returns why the session stopped being pending, if it has.
	pub fn close_reason(&self) -> Option<CloseReason> {
		self.state.lock().close_reason
	}

	/// Returns a non-owning handle to this session.
	pub fn handle(&self) -> SessionHandle {
		SessionHandle {
			id: self.id,
			identity: self.identity.key(),
			session: self.weak_self.clone(),
		}
	}

	/// Caller-initiated cancellation. Idempotent.
	pub fn cancel(&self) {
		self.finish(CloseReason::Cancelled);
	}

	/// The requesting context is gone: resolve with `None` and never touch
	/// the context again.
	pub fn notify_identity_destroyed(&self) {
		self.state.lock().identity_destroyed = true;
		self.finish(CloseReason::IdentityGone);
	}

	pub(crate) fn supersede(&self) {
		self.finish(CloseReason::Superseded);
	}

	pub(crate) fn on_enumeration_complete(&self, result: Result<Vec<PortDescriptor>>) {
		let ports = match result {
			Ok(ports) => ports,
			Err(err) => {
				warn!(target = "serial.session", session = %self.id, error = %err, "port enumeration failed");
				self.finish(CloseReason::EnumerationUnavailable);
				return;
			}
		};

		let candidates = {
			let mut state = self.state.lock();
			if state.resolution != Resolution::Pending {
				return;
			}
			let buffered = match mem::replace(&mut state.phase, Phase::Presented) {
				Phase::Enumerating { buffered } => buffered,
				other => {
					state.phase = other;
					return;
				}
			};
			state.enumeration = None;

			let mut candidates = baseline(&self.filters, ports);
			let replayed = buffered.len();
			for event in buffered {
				apply_event(&self.filters, &mut candidates, event);
			}
			debug!(
				target = "serial.session",
				session = %self.id,
				candidates = candidates.len(),
				replayed,
				"baseline reconciled"
			);
			state.candidates = candidates.clone();

			if !self.alive_locked(&state) {
				None
			} else {
				state.presenting = true;
				state.presented = true;
				Some(candidates)
			}
		};

		let Some(candidates) = candidates else {
			self.finish(CloseReason::IdentityGone);
			return;
		};

		let sink = ResolutionSink::new(self.id, self.weak_self.clone());
		let accepted = self.collaborators.surface.present(&self.identity, &candidates, sink);

		if !accepted {
			{
				let mut state = self.state.lock();
				state.presenting = false;
				state.deferred.clear();
			}
			debug!(target = "serial.session", session = %self.id, "selection surface declined");
			self.finish(CloseReason::SurfaceDeclined);
			return;
		}

		// Changes that raced with `present` go out after it, in arrival order.
		// `presenting` stays set until the queue drains so later events queue
		// behind them.
		loop {
			let changes = {
				let mut state = self.state.lock();
				if state.resolution != Resolution::Pending {
					state.presenting = false;
					state.deferred.clear();
					return;
				}
				if mem::take(&mut state.sink_abandoned) {
					state.presenting = false;
					state.deferred.clear();
					drop(state);
					self.finish(CloseReason::Dismissed);
					return;
				}
				if state.deferred.is_empty() {
					state.presenting = false;
					return;
				}
				if !self.alive_locked(&state) {
					state.presenting = false;
					state.deferred.clear();
					drop(state);
					self.finish(CloseReason::IdentityGone);
					return;
				}
				mem::take(&mut state.deferred)
			};
			for change in changes {
				self.notify_change(change);
			}
		}
	}

	pub(crate) fn on_selection_resolved(&self, chosen: Option<PortId>) {
		let (teardown, port, reason) = {
			let mut state = self.state.lock();
			if state.resolution != Resolution::Pending {
				return;
			}
			// Look up by id: the list may have changed since presentation.
			let port = chosen
				.as_ref()
				.and_then(|id| state.candidates.iter().find(|p| &p.id == id).cloned());
			let (port, reason) = match (&chosen, port) {
				(None, _) => (None, CloseReason::Dismissed),
				(Some(_), None) => (None, CloseReason::StaleSelection),
				(Some(_), Some(_)) if !self.alive_locked(&state) => (None, CloseReason::IdentityGone),
				(Some(_), Some(port)) => (Some(port), CloseReason::Selected),
			};
			match self.claim(&mut state, reason) {
				Some(teardown) => (teardown, port, reason),
				None => return,
			}
		};

		if reason == CloseReason::StaleSelection {
			if let Some(port_id) = chosen {
				let err = Error::StaleSelection { port_id };
				warn!(target = "serial.session", session = %self.id, error = %err, "selection no longer available");
			}
		}

		self.complete(teardown, port, reason);
	}

	pub(crate) fn on_sink_abandoned(&self) {
		{
			let mut state = self.state.lock();
			if state.presenting {
				state.sink_abandoned = true;
				return;
			}
		}
		self.finish(CloseReason::Dismissed);
	}

	fn alive_locked(&self, state: &SessionState) -> bool {
		!state.identity_destroyed && self.identity.is_alive()
	}

	/// Resolves with `None` unless already resolved.
	fn finish(&self, reason: CloseReason) {
		let teardown = {
			let mut state = self.state.lock();
			match self.claim(&mut state, reason) {
				Some(teardown) => teardown,
				None => return,
			}
		};
		self.complete(teardown, None, reason);
	}

	/// The guarded pending → resolved transition.
	fn claim(&self, state: &mut SessionState, reason: CloseReason) -> Option<Teardown> {
		if state.resolution != Resolution::Pending {
			return None;
		}
		state.resolution = Resolution::Resolved;
		state.close_reason = Some(reason);
		Some(Teardown {
			callback: state.callback.take(),
			subscription: state.subscription.take(),
			enumeration: state.enumeration.take(),
			on_closed: state.on_closed.take(),
			presented: state.presented,
		})
	}

	fn complete(&self, teardown: Teardown, port: Option<PortDescriptor>, reason: CloseReason) {
		let Teardown {
			callback,
			subscription,
			enumeration,
			on_closed,
			presented,
		} = teardown;

		drop(subscription);
		if let Some(task) = enumeration {
			task.abort();
		}

		let surface = &self.collaborators.surface;
		if presented && !reason.is_surface_initiated() && reason != CloseReason::IdentityGone {
			surface.notify_closed(&self.identity);
		}

		if let Some(port) = &port {
			if let Err(err) = self.collaborators.permissions.grant(self.identity.origins(), port) {
				let err = match err {
					err @ Error::GrantFailed { .. } => err,
					other => Error::GrantFailed {
						port_id: port.id.clone(),
						reason: other.to_string(),
					},
				};
				warn!(target = "serial.session", session = %self.id, error = %err, "permission grant failed");
				surface.report_diagnostic(&self.identity, &err);
			}
		}

		debug!(
			target = "serial.session",
			session = %self.id,
			identity = %self.identity.key(),
			%reason,
			port = ?port.as_ref().map(|p| p.id.as_str()),
			"chooser resolved"
		);

		if let Some(callback) = callback {
			callback(port);
		}

		{
			let mut state = self.state.lock();
			state.resolution = Resolution::Closed;
			state.candidates.clear();
		}

		if let Some(on_closed) = on_closed {
			on_closed(self.id);
		}
	}
}

impl PortObserver for ChooserSession {
	fn on_port_added(&self, port: &PortDescriptor) {
		self.on_port_event(PortEvent::Added(port.clone()));
	}

	fn on_port_removed(&self, port_id: &PortId) {
		self.on_port_event(PortEvent::Removed(port_id.clone()));
	}

	fn on_port_manager_disconnected(&self) {
		warn!(target = "serial.session", session = %self.id, "port manager disconnected");
		self.finish(CloseReason::CatalogDisconnected);
	}
}

impl ChooserSession {
	fn on_port_event(&self, event: PortEvent) {
		let (change, alive) = {
			let mut state = self.state.lock();
			if state.resolution != Resolution::Pending {
				return;
			}
			let alive = self.alive_locked(&state);
			let state = &mut *state;
			match &mut state.phase {
				Phase::Idle => return,
				Phase::Enumerating { buffered } => {
					buffered.push(event);
					return;
				}
				Phase::Presented => match apply_event(&self.filters, &mut state.candidates, event) {
					Some(change) if state.presenting => {
						state.deferred.push(change);
						return;
					}
					Some(change) => (change, alive),
					None => return,
				},
			}
		};

		if !alive {
			self.finish(CloseReason::IdentityGone);
			return;
		}
		self.notify_change(change);
	}

	fn notify_change(&self, change: CandidateChange) {
		let surface = &self.collaborators.surface;
		match change {
			CandidateChange::Added(port) => {
				debug!(target = "serial.session", session = %self.id, port = %port.id, "candidate added");
				surface.notify_added(&self.identity, &port);
			}
			CandidateChange::Removed(port) => {
				debug!(target = "serial.session", session = %self.id, port = %port.id, "candidate removed");
				surface.notify_removed(&self.identity, &port);
			}
		}
	}
}

impl Drop for ChooserSession {
	fn drop(&mut self) {
		let state = self.state.get_mut();
		if state.resolution != Resolution::Pending {
			return;
		}
		state.resolution = Resolution::Closed;
		state.close_reason = Some(CloseReason::Dropped);

		drop(state.subscription.take());
		if let Some(task) = state.enumeration.take() {
			task.abort();
		}
		debug!(target = "serial.session", session = %self.id, "chooser dropped while pending");
		if let Some(callback) = state.callback.take() {
			callback(None);
		}
	}
}

impl fmt::Debug for ChooserSession {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChooserSession")
			.field("id", &self.id)
			.field("identity", &self.identity.key())
			.field("filters", &self.filters)
			.finish_non_exhaustive()
	}
}

/// Filters `ports`, drops duplicate ids and sorts by path.
fn baseline(filters: &[FilterCriterion], ports: Vec<PortDescriptor>) -> Vec<PortDescriptor> {
	let mut candidates: Vec<PortDescriptor> = Vec::with_capacity(ports.len());
	for port in ports {
		if filter::matches(filters, &port) && !candidates.iter().any(|p| p.same_port(&port)) {
			candidates.push(port);
		}
	}
	candidates.sort_by(|a, b| a.path.cmp(&b.path));
	candidates
}

/// Applies one hot-plug event, keeping `candidates` sorted and free of
/// duplicates. Returns the visible change, if any.
fn apply_event(
	filters: &[FilterCriterion],
	candidates: &mut Vec<PortDescriptor>,
	event: PortEvent,
) -> Option<CandidateChange> {
	match event {
		PortEvent::Added(port) => {
			if !filter::matches(filters, &port) || candidates.iter().any(|p| p.same_port(&port)) {
				return None;
			}
			let at = candidates.partition_point(|p| p.path <= port.path);
			candidates.insert(at, port.clone());
			Some(CandidateChange::Added(port))
		}
		PortEvent::Removed(port_id) => {
			let at = candidates.iter().position(|p| p.id == port_id)?;
			Some(CandidateChange::Removed(candidates.remove(at)))
		}
	}
}

/// Non-owning handle to a chooser session.
///
/// Every method is a no-op once the session is gone.
#[derive(Clone)]
pub struct SessionHandle {
	id: SessionId,
	identity: IdentityKey,
	session: Weak<ChooserSession>,
}

impl SessionHandle {
	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn identity(&self) -> IdentityKey {
		self.identity
	}

	/// Returns true while the session exists and has not resolved.
	pub fn is_pending(&self) -> bool {
		self.session.upgrade().is_some_and(|s| s.is_pending())
	}

	/// Returns the session's current candidates.
	pub fn candidates(&self) -> Vec<PortDescriptor> {
		self.session.upgrade().map(|s| s.candidates()).unwrap_or_default()
	}

	/// Cancels the session if it is still pending.
	pub fn cancel(&self) {
		if let Some(session) = self.session.upgrade() {
			session.cancel();
		}
	}
}

impl fmt::Debug for SessionHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionHandle")
			.field("id", &self.id)
			.field("identity", &self.identity)
			.field("pending", &self.is_pending())
			.finish()
	}
}
