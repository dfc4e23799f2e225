//! Port catalog seam: enumeration and hot-plug observation.
//!
//! A [`PortCatalog`] is shared by every live chooser. Each chooser registers
//! its own [`PortObserver`] and holds the returned [`Subscription`], which
//! unregisters the observer when dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use serial_chooser_protocol::{PortDescriptor, PortId};

use crate::error::Result;

/// Catalog-assigned key of a registered [`PortObserver`].
pub type ObserverId = u64;

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates an observer key. Keys are unique across every catalog in the
/// process, so a stale key can never unregister another catalog's observer.
pub fn next_observer_id() -> ObserverId {
	NEXT_OBSERVER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Receives hot-plug notifications from a [`PortCatalog`].
///
/// Calls for one observer are delivered in the order the catalog emits them
/// and never concurrently with each other.
pub trait PortObserver: Send + Sync {
	/// A port was attached.
	fn on_port_added(&self, port: &PortDescriptor);

	/// A port was detached.
	fn on_port_removed(&self, port_id: &PortId);

	/// The catalog lost its device manager; no further events will arrive.
	fn on_port_manager_disconnected(&self);
}

/// Source of attached serial ports.
pub trait PortCatalog: Send + Sync {
	/// Returns the currently attached ports.
	///
	/// The snapshot may be taken at call time and delivered later; observers
	/// registered before the call see every change the snapshot misses.
	fn enumerate(&self) -> BoxFuture<'static, Result<Vec<PortDescriptor>>>;

	/// Registers an observer. The catalog keeps only a weak reference.
	fn add_observer(&self, observer: Weak<dyn PortObserver>) -> ObserverId;

	/// Unregisters an observer. Unknown ids are ignored.
	fn remove_observer(&self, id: ObserverId);
}

/// Registers `observer` on `catalog` and returns a guard that unregisters it.
pub fn subscribe(catalog: &Arc<dyn PortCatalog>, observer: Weak<dyn PortObserver>) -> Subscription {
	let id = catalog.add_observer(observer);
	let weak = Arc::downgrade(catalog);
	Subscription::new(
		id,
		Arc::new(move |id: ObserverId| {
			if let Some(catalog) = weak.upgrade() {
				catalog.remove_observer(id);
			}
		}),
	)
}

/// Keeps a port observer registered for as long as it lives.
///
/// A chooser holds one from before enumeration until its outcome is claimed;
/// dropping it is how the chooser detaches from hot-plug events. Built by
/// [`subscribe`], whose unregister closure only weakly references the
/// catalog, so a chooser outliving its catalog drops cleanly.
pub struct Subscription {
	id: ObserverId,
	dropper: Option<Arc<dyn Fn(ObserverId) + Send + Sync>>,
}

impl Subscription {
	/// Pairs an observer key with the closure that unregisters it.
	pub fn new(id: ObserverId, dropper: Arc<dyn Fn(ObserverId) + Send + Sync>) -> Self {
		Self {
			id,
			dropper: Some(dropper),
		}
	}

	pub fn id(&self) -> ObserverId {
		self.id
	}

	/// Stops delivery now. Same as dropping.
	pub fn unsubscribe(mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.dropper.is_some())
			.finish()
	}
}
