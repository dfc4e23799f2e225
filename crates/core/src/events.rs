//! Event-emitting selection surface.
//!
//! [`EventSurface`] turns the runtime's surface calls into embedder events:
//!
//! - `select-serial-port`: dispatched to handlers registered with
//!   [`EventSurface::on_select_port`]. A handler that returns true takes
//!   ownership of the [`PortSelection`]; if none does, the chooser resolves
//!   with no port.
//! - `serial-port-added`, `serial-port-removed`,
//!   `select-serial-port-cancelled` and `grant-failed`: broadcast as
//!   [`SerialEvent`]s to every [`EventSurface::events`] receiver.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serial_chooser_protocol::{IdentityKey, OriginPair, PortDescriptor, PortId, PortInfo, SessionId};
use serial_chooser_runtime::{Error, RequestingIdentity, ResolutionSink, SelectionSurface, Subscription};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::handlers::{self, HandlerFn, HandlerMap};

const EVENT_CAPACITY: usize = 64;

/// Broadcast chooser event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SerialEvent {
	#[serde(rename = "serial-port-added")]
	PortAdded { identity: IdentityKey, port: PortInfo },
	#[serde(rename = "serial-port-removed")]
	PortRemoved { identity: IdentityKey, port: PortInfo },
	#[serde(rename = "select-serial-port-cancelled")]
	SelectionCancelled { identity: IdentityKey },
	#[serde(rename = "grant-failed")]
	GrantFailed {
		identity: IdentityKey,
		#[serde(rename = "portId")]
		port_id: Option<PortId>,
		message: String,
	},
}

impl SerialEvent {
	/// Event name as seen by the embedder.
	pub fn name(&self) -> &'static str {
		match self {
			SerialEvent::PortAdded { .. } => "serial-port-added",
			SerialEvent::PortRemoved { .. } => "serial-port-removed",
			SerialEvent::SelectionCancelled { .. } => "select-serial-port-cancelled",
			SerialEvent::GrantFailed { .. } => "grant-failed",
		}
	}

	pub fn identity(&self) -> IdentityKey {
		match self {
			SerialEvent::PortAdded { identity, .. }
			| SerialEvent::PortRemoved { identity, .. }
			| SerialEvent::SelectionCancelled { identity }
			| SerialEvent::GrantFailed { identity, .. } => *identity,
		}
	}
}

/// Payload of a `select-serial-port` event.
#[derive(Clone)]
pub struct SelectPortEvent {
	pub identity: IdentityKey,
	pub origins: OriginPair,
	pub ports: Vec<PortInfo>,
	pub selection: PortSelection,
}

impl fmt::Debug for SelectPortEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SelectPortEvent")
			.field("identity", &self.identity)
			.field("origins", &self.origins)
			.field("ports", &self.ports)
			.finish_non_exhaustive()
	}
}

/// Clonable one-shot answer to a `select-serial-port` event.
///
/// The first `select`/`dismiss` across all clones wins. When the last clone
/// is dropped unanswered, the chooser is dismissed.
#[derive(Clone)]
pub struct PortSelection {
	session_id: SessionId,
	sink: Arc<Mutex<Option<ResolutionSink>>>,
}

impl PortSelection {
	fn new(sink: ResolutionSink) -> Self {
		Self {
			session_id: sink.session_id(),
			sink: Arc::new(Mutex::new(Some(sink))),
		}
	}

	pub fn session_id(&self) -> SessionId {
		self.session_id
	}

	/// Chooses `port_id`. Returns false if this selection was already answered.
	pub fn select(&self, port_id: impl Into<PortId>) -> bool {
		self.resolve(Some(port_id.into()))
	}

	/// Resolves without a port. Returns false if already answered.
	pub fn dismiss(&self) -> bool {
		self.resolve(None)
	}

	/// Chooses `port_id`, or dismisses when it is empty.
	pub fn resolve_str(&self, port_id: &str) -> bool {
		if port_id.is_empty() {
			self.dismiss()
		} else {
			self.select(port_id)
		}
	}

	pub fn is_answered(&self) -> bool {
		self.sink.lock().is_none()
	}

	fn resolve(&self, chosen: Option<PortId>) -> bool {
		// Taken under the lock, resolved outside it.
		let sink = self.sink.lock().take();
		match sink {
			Some(sink) => {
				sink.resolve(chosen);
				true
			}
			None => false,
		}
	}
}

impl fmt::Debug for PortSelection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PortSelection")
			.field("session_id", &self.session_id)
			.field("answered", &self.is_answered())
			.finish()
	}
}

/// [`SelectionSurface`] that emits chooser events to registered handlers.
pub struct EventSurface {
	select_handlers: HandlerMap<SelectPortEvent>,
	events_tx: broadcast::Sender<SerialEvent>,
}

impl Default for EventSurface {
	fn default() -> Self {
		Self::new()
	}
}

impl EventSurface {
	pub fn new() -> Self {
		let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			select_handlers: handlers::handler_map(),
			events_tx,
		}
	}

	/// Registers a `select-serial-port` handler.
	///
	/// Handlers run in registration order. Returning true takes ownership of
	/// the event's [`PortSelection`].
	pub fn on_select_port<F>(&self, handler: F) -> Subscription
	where
		F: Fn(SelectPortEvent) -> bool + Send + Sync + 'static,
	{
		let handler: HandlerFn<SelectPortEvent> = Arc::new(handler);
		handlers::register(&self.select_handlers, handler)
	}

	/// Returns a receiver for every other chooser event.
	pub fn events(&self) -> broadcast::Receiver<SerialEvent> {
		self.events_tx.subscribe()
	}

	pub fn handler_count(&self) -> usize {
		self.select_handlers.lock().len()
	}

	fn emit(&self, event: SerialEvent) {
		debug!(target = "serial.surface", event = event.name(), identity = %event.identity(), "chooser event");
		// No receivers is fine.
		let _ = self.events_tx.send(event);
	}
}

impl SelectionSurface for EventSurface {
	fn present(&self, identity: &RequestingIdentity, candidates: &[PortDescriptor], sink: ResolutionSink) -> bool {
		let handlers = handlers::snapshot(&self.select_handlers);
		if handlers.is_empty() {
			debug!(target = "serial.surface", identity = %identity.key(), "no select-serial-port handler");
			return false;
		}

		let selection = PortSelection::new(sink);
		let event = SelectPortEvent {
			identity: identity.key(),
			origins: identity.origins().clone(),
			ports: candidates.iter().map(PortInfo::from).collect(),
			selection: selection.clone(),
		};

		let mut handled = false;
		for entry in handlers {
			if (entry.handler)(event.clone()) {
				debug!(target = "serial.surface", handler_id = entry.id, "select-serial-port handled");
				handled = true;
			}
		}

		if !handled && !selection.is_answered() {
			warn!(
				target = "serial.surface",
				identity = %identity.key(),
				ports = candidates.len(),
				"select-serial-port not handled; resolving without a port"
			);
		}
		handled
	}

	fn notify_added(&self, identity: &RequestingIdentity, port: &PortDescriptor) {
		self.emit(SerialEvent::PortAdded {
			identity: identity.key(),
			port: PortInfo::from(port),
		});
	}

	fn notify_removed(&self, identity: &RequestingIdentity, port: &PortDescriptor) {
		self.emit(SerialEvent::PortRemoved {
			identity: identity.key(),
			port: PortInfo::from(port),
		});
	}

	fn notify_closed(&self, identity: &RequestingIdentity) {
		self.emit(SerialEvent::SelectionCancelled {
			identity: identity.key(),
		});
	}

	fn report_diagnostic(&self, identity: &RequestingIdentity, err: &Error) {
		let port_id = match err {
			Error::GrantFailed { port_id, .. } | Error::StaleSelection { port_id } => Some(port_id.clone()),
			_ => None,
		};
		self.emit(SerialEvent::GrantFailed {
			identity: identity.key(),
			port_id,
			message: err.to_string(),
		});
	}
}

impl fmt::Debug for EventSurface {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventSurface")
			.field("select_handlers", &self.handler_count())
			.field("receivers", &self.events_tx.receiver_count())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use serial_chooser_protocol::PortDescriptor;
	use serial_chooser_runtime::{ChooserSession, Collaborators, MemoryPermissionStore, MemoryPortCatalog};
	use tokio::sync::{mpsc, oneshot};

	use super::*;

	fn identity(key: u64) -> RequestingIdentity {
		RequestingIdentity::untracked(IdentityKey(key), OriginPair::main_frame("https://app.test"))
	}

	struct Fixture {
		catalog: Arc<MemoryPortCatalog>,
		surface: Arc<EventSurface>,
		collaborators: Collaborators,
	}

	fn fixture(ports: Vec<PortDescriptor>) -> Fixture {
		let catalog = Arc::new(MemoryPortCatalog::with_ports(ports));
		let surface = Arc::new(EventSurface::new());
		let collaborators = Collaborators::new(catalog.clone(), surface.clone(), Arc::new(MemoryPermissionStore::new()));
		Fixture {
			catalog,
			surface,
			collaborators,
		}
	}

	fn open(
		fx: &Fixture,
		key: u64,
	) -> (Arc<ChooserSession>, oneshot::Receiver<Option<PortDescriptor>>) {
		let (tx, rx) = oneshot::channel();
		let session = ChooserSession::open(identity(key), Vec::new(), &fx.collaborators, move |port| {
			let _ = tx.send(port);
		});
		(session, rx)
	}

	#[tokio::test]
	async fn handler_selects_port() {
		let fx = fixture(vec![PortDescriptor::new("1", "/dev/ttyACM0").with_display_name("Uno")]);
		let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
		let _sub = fx.surface.on_select_port(move |event| {
			let _ = seen_tx.send(event);
			true
		});

		let (_session, outcome) = open(&fx, 1);
		let event = seen_rx.recv().await.unwrap();
		assert_eq!(event.identity, IdentityKey(1));
		assert_eq!(event.ports.len(), 1);
		assert_eq!(event.ports[0].port_name, "ttyACM0");
		assert_eq!(event.ports[0].display_name.as_deref(), Some("Uno"));

		assert!(event.selection.select("1"));
		assert!(!event.selection.dismiss());
		assert_eq!(outcome.await.unwrap().map(|p| p.id), Some(PortId::from("1")));
	}

	#[tokio::test]
	async fn unhandled_event_resolves_none() {
		let fx = fixture(vec![PortDescriptor::new("1", "/dev/ttyACM0")]);
		let _sub = fx.surface.on_select_port(|_| false);

		let (session, outcome) = open(&fx, 1);
		assert_eq!(outcome.await.unwrap(), None);
		assert!(!session.is_pending());
	}

	#[tokio::test]
	async fn no_handlers_resolves_none() {
		let fx = fixture(vec![PortDescriptor::new("1", "/dev/ttyACM0")]);
		let (_session, outcome) = open(&fx, 1);
		assert_eq!(outcome.await.unwrap(), None);
	}

	#[tokio::test]
	async fn empty_id_dismisses() {
		let fx = fixture(vec![PortDescriptor::new("1", "/dev/ttyACM0")]);
		let _sub = fx.surface.on_select_port(|event| event.selection.resolve_str(""));

		let (_session, outcome) = open(&fx, 1);
		assert_eq!(outcome.await.unwrap(), None);
	}

	#[tokio::test]
	async fn dropped_selection_dismisses() {
		let fx = fixture(vec![PortDescriptor::new("1", "/dev/ttyACM0")]);
		let held = Arc::new(Mutex::new(None));
		let slot = Arc::clone(&held);
		let _sub = fx.surface.on_select_port(move |event| {
			*slot.lock() = Some(event.selection);
			true
		});

		let (session, outcome) = open(&fx, 1);
		while held.lock().is_none() {
			tokio::task::yield_now().await;
		}
		assert!(session.is_pending());

		let selection = held.lock().take();
		drop(selection);
		assert_eq!(outcome.await.unwrap(), None);
	}

	#[tokio::test]
	async fn hot_plug_and_cancel_are_broadcast() {
		let fx = fixture(vec![PortDescriptor::new("1", "/dev/ttyACM0")]);
		let mut events = fx.surface.events();
		let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
		let _sub = fx.surface.on_select_port(move |event| {
			let _ = seen_tx.send(event.selection);
			true
		});

		let (session, outcome) = open(&fx, 4);
		let _selection = seen_rx.recv().await.unwrap();

		fx.catalog.attach(PortDescriptor::new("2", "/dev/ttyACM1"));
		fx.catalog.detach(&PortId::from("1"));
		session.cancel();

		let names: Vec<_> = (0..3).map(|_| events.try_recv().unwrap().name()).collect();
		assert_eq!(names, ["serial-port-added", "serial-port-removed", "select-serial-port-cancelled"]);
		assert_eq!(outcome.await.unwrap(), None);
	}

	#[test]
	fn event_serializes_with_embedder_names() {
		let event = SerialEvent::PortAdded {
			identity: IdentityKey(2),
			port: PortInfo::from(&PortDescriptor::new("7", "/dev/ttyUSB0").with_vendor_id(0x0403)),
		};
		let json = serde_json::to_value(&event).unwrap();
		assert_eq!(json["event"], "serial-port-added");
		assert_eq!(json["identity"], 2);
		assert_eq!(json["port"]["portName"], "ttyUSB0");
		assert_eq!(json["port"]["vendorId"], 0x0403);
	}

	#[test]
	fn dropping_subscription_unregisters_handler() {
		let surface = EventSurface::new();
		let sub = surface.on_select_port(|_| true);
		assert_eq!(surface.handler_count(), 1);
		drop(sub);
		assert_eq!(surface.handler_count(), 0);
	}
}
