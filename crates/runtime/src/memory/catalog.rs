//! In-memory port catalog with controllable enumeration timing.

use std::fmt;
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serial_chooser_protocol::{PortDescriptor, PortId};
use tokio::sync::watch;
use tracing::debug;

use crate::catalog::{ObserverId, PortCatalog, PortObserver, next_observer_id};
use crate::error::{Error, Result};

/// When a held enumeration captures its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotAt {
	/// At the `enumerate()` call; changes made while held are missing from it.
	#[default]
	Request,
	/// When the hold is released; changes made while held are included.
	Release,
}

struct CatalogState {
	ports: IndexMap<PortId, PortDescriptor>,
	observers: IndexMap<ObserverId, Weak<dyn PortObserver>>,
	connected: bool,
	hold: Option<(SnapshotAt, watch::Receiver<bool>)>,
	enumerations: usize,
}

impl CatalogState {
	fn snapshot(&self) -> Result<Vec<PortDescriptor>> {
		if !self.connected {
			return Err(Error::CatalogDisconnected);
		}
		Ok(self.ports.values().cloned().collect())
	}

	fn live_observers(&mut self) -> Vec<Arc<dyn PortObserver>> {
		self.observers.retain(|_, observer| observer.strong_count() > 0);
		self.observers.values().filter_map(Weak::upgrade).collect()
	}
}

/// Port catalog backed by an in-memory table.
///
/// Observers are notified outside the internal lock, in call order; callers
/// that mutate the catalog from several threads must serialize themselves.
pub struct MemoryPortCatalog {
	state: Arc<Mutex<CatalogState>>,
}

impl Default for MemoryPortCatalog {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryPortCatalog {
	pub fn new() -> Self {
		Self {
			state: Arc::new(Mutex::new(CatalogState {
				ports: IndexMap::new(),
				observers: IndexMap::new(),
				connected: true,
				hold: None,
				enumerations: 0,
			})),
		}
	}

	/// Creates a catalog with `ports` already attached.
	pub fn with_ports(ports: impl IntoIterator<Item = PortDescriptor>) -> Self {
		let catalog = Self::new();
		{
			let mut state = catalog.state.lock();
			for port in ports {
				state.ports.insert(port.id.clone(), port);
			}
		}
		catalog
	}

	/// Attaches a port and notifies observers.
	///
	/// Returns false if a port with the same id is already attached.
	pub fn attach(&self, port: PortDescriptor) -> bool {
		let observers = {
			let mut state = self.state.lock();
			if state.ports.contains_key(&port.id) {
				return false;
			}
			state.ports.insert(port.id.clone(), port.clone());
			state.live_observers()
		};
		debug!(target = "serial.catalog", port = %port.id, path = %port.path.display(), "port attached");
		for observer in observers {
			observer.on_port_added(&port);
		}
		true
	}

	/// Detaches a port and notifies observers.
	pub fn detach(&self, port_id: &PortId) -> Option<PortDescriptor> {
		let (port, observers) = {
			let mut state = self.state.lock();
			let port = state.ports.shift_remove(port_id)?;
			(port, state.live_observers())
		};
		debug!(target = "serial.catalog", port = %port.id, "port detached");
		for observer in observers {
			observer.on_port_removed(port_id);
		}
		Some(port)
	}

	/// Simulates losing the device manager.
	///
	/// Every observer is told once and dropped; enumeration fails until
	/// [`reconnect`](Self::reconnect).
	pub fn disconnect(&self) {
		let observers = {
			let mut state = self.state.lock();
			state.connected = false;
			let observers = state.live_observers();
			state.observers.clear();
			observers
		};
		debug!(target = "serial.catalog", observers = observers.len(), "port manager disconnected");
		for observer in observers {
			observer.on_port_manager_disconnected();
		}
	}

	pub fn reconnect(&self) {
		self.state.lock().connected = true;
	}

	/// Delays every enumeration until the returned hold is released.
	pub fn hold_enumeration(&self, at: SnapshotAt) -> EnumerationHold {
		let (tx, rx) = watch::channel(false);
		self.state.lock().hold = Some((at, rx));
		EnumerationHold {
			tx,
			state: Arc::downgrade(&self.state),
		}
	}

	/// Returns the attached ports in attach order.
	pub fn ports(&self) -> Vec<PortDescriptor> {
		self.state.lock().ports.values().cloned().collect()
	}

	pub fn observer_count(&self) -> usize {
		self.state.lock().live_observers().len()
	}

	/// Number of `enumerate()` calls so far.
	pub fn enumeration_count(&self) -> usize {
		self.state.lock().enumerations
	}
}

impl PortCatalog for MemoryPortCatalog {
	fn enumerate(&self) -> BoxFuture<'static, Result<Vec<PortDescriptor>>> {
		let mut state = self.state.lock();
		state.enumerations += 1;

		match state.hold.clone() {
			None => {
				let snapshot = state.snapshot();
				Box::pin(async move { snapshot })
			}
			Some((SnapshotAt::Request, mut released)) => {
				let snapshot = state.snapshot();
				Box::pin(async move {
					let _ = released.wait_for(|released| *released).await;
					snapshot
				})
			}
			Some((SnapshotAt::Release, mut released)) => {
				let shared = Arc::clone(&self.state);
				Box::pin(async move {
					let _ = released.wait_for(|released| *released).await;
					shared.lock().snapshot()
				})
			}
		}
	}

	fn add_observer(&self, observer: Weak<dyn PortObserver>) -> ObserverId {
		let id = next_observer_id();
		self.state.lock().observers.insert(id, observer);
		id
	}

	fn remove_observer(&self, id: ObserverId) {
		self.state.lock().observers.shift_remove(&id);
	}
}

impl fmt::Debug for MemoryPortCatalog {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.lock();
		f.debug_struct("MemoryPortCatalog")
			.field("ports", &state.ports.len())
			.field("observers", &state.observers.len())
			.field("connected", &state.connected)
			.finish()
	}
}

/// Pending-enumeration gate returned by [`MemoryPortCatalog::hold_enumeration`].
///
/// Releasing (or dropping) it completes every held enumeration and lets
/// later ones through immediately.
pub struct EnumerationHold {
	tx: watch::Sender<bool>,
	state: Weak<Mutex<CatalogState>>,
}

impl EnumerationHold {
	pub fn release(self) {
		drop(self);
	}
}

impl Drop for EnumerationHold {
	fn drop(&mut self) {
		if let Some(state) = self.state.upgrade() {
			state.lock().hold = None;
		}
		let _ = self.tx.send(true);
	}
}
