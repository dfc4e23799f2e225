//! Generic event handler infrastructure.
//!
//! Handlers live in a [`HandlerMap`] ([`IndexMap`] storage for O(1) removal
//! and stable insertion order). Registration hands back a [`Subscription`]
//! that removes the handler again when dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serial_chooser_runtime::Subscription;

/// Unique identifier for event handlers.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique handler ID.
pub fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Handler function: `E` → "handled".
///
/// Returning true claims the event, the way an embedder prevents the default
/// action of a DOM-style event.
pub type HandlerFn<E> = Arc<dyn Fn(E) -> bool + Send + Sync>;

/// Registered event handler.
pub struct HandlerEntry<E> {
	pub id: HandlerId,
	pub handler: HandlerFn<E>,
}

impl<E> Clone for HandlerEntry<E> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			handler: Arc::clone(&self.handler),
		}
	}
}

/// Handler storage: [`IndexMap`] for O(1) removal with stable insertion order.
pub type HandlerMap<E> = Arc<Mutex<IndexMap<HandlerId, HandlerEntry<E>>>>;

/// Creates an empty handler map.
pub fn handler_map<E>() -> HandlerMap<E> {
	Arc::new(Mutex::new(IndexMap::new()))
}

/// Inserts `handler` into `handlers` and returns a subscription removing it.
pub fn register<E>(handlers: &HandlerMap<E>, handler: HandlerFn<E>) -> Subscription
where
	E: Send + 'static,
{
	let id = next_handler_id();
	handlers.lock().insert(id, HandlerEntry { id, handler });
	subscription(id, handlers)
}

/// Creates a subscription that removes `id` from `handlers` using a weak
/// reference, so dropping it after the map is gone is a no-op.
pub fn subscription<E>(id: HandlerId, handlers: &HandlerMap<E>) -> Subscription
where
	E: Send + 'static,
{
	let weak: Weak<Mutex<IndexMap<HandlerId, HandlerEntry<E>>>> = Arc::downgrade(handlers);
	let dropper = Arc::new(move |id: HandlerId| {
		if let Some(map) = weak.upgrade() {
			map.lock().shift_remove(&id);
		}
	});
	Subscription::new(id, dropper)
}

/// Snapshots the handlers so they can be called without holding the lock.
pub fn snapshot<E>(handlers: &HandlerMap<E>) -> Vec<HandlerEntry<E>> {
	handlers.lock().values().cloned().collect()
}
