//! Serial port chooser for embedders.
//!
//! [`SerialDelegate`] is the host-facing entry point: it runs choosers,
//! answers permission checks and exposes the shared port catalog.
//! [`EventSurface`] is a ready-made selection surface that turns chooser
//! activity into `select-serial-port` handler calls and broadcast
//! [`SerialEvent`]s.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use serial_chooser::{ChooserOptions, Collaborators, EventSurface, SerialDelegate};
//! use serial_chooser::runtime::{MemoryPermissionStore, MemoryPortCatalog};
//!
//! let surface = Arc::new(EventSurface::new());
//! let _sub = surface.on_select_port(|event| {
//!     let first = event.ports.first().map(|p| p.port_id.clone());
//!     first.is_some_and(|id| event.selection.select(id))
//! });
//!
//! let delegate = SerialDelegate::new(
//!     Collaborators::new(
//!         Arc::new(MemoryPortCatalog::new()),
//!         surface,
//!         Arc::new(MemoryPermissionStore::new()),
//!     ),
//!     ChooserOptions::default(),
//! );
//! let port = delegate.request_port(identity, filters).await;
//! ```

pub mod delegate;
pub mod events;
pub mod handlers;

pub use delegate::{ChooserOptions, SerialDelegate};
pub use events::{EventSurface, PortSelection, SelectPortEvent, SerialEvent};
pub use handlers::HandlerId;
pub use serial_chooser_protocol::{
	CloseReason, FilterCriterion, IdentityKey, Origin, OriginPair, PortDescriptor, PortId, PortInfo, SessionId,
};
pub use serial_chooser_runtime::{
	self as runtime, Collaborators, Error, RequestingContext, RequestingIdentity, Result, SessionHandle, Subscription,
};
