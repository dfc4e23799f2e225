//! Serial chooser runtime - sessions, registry and collaborator seams.
//!
//! This crate implements the part of a serial port permission prompt that
//! has to be right under concurrency: picking one port out of a changing set
//! of attached devices and delivering the answer exactly once.
//!
//! - **Filter matching**: [`filter::matches`]
//! - **Chooser sessions**: [`ChooserSession`], one in-flight selection
//! - **Registry**: [`SessionRegistry`], at most one session per requesting context
//! - **Seams**: [`PortCatalog`], [`SelectionSurface`], [`PermissionStore`]
//! - **In-memory collaborators**: [`memory`]
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐      open/cancel      ┌──────────────────┐
//! │ SessionRegistry  │ ────────────────────▶ │  ChooserSession  │
//! └──────────────────┘ ◀──── close hook ──── └────────┬─────────┘
//!                          (weak)                     │
//!        ┌───────────────────────┬────────────────────┼───────────────┐
//!        ▼                       ▼                    ▼               │
//! ┌─────────────┐       ┌──────────────────┐  ┌─────────────────┐     │
//! │ PortCatalog │       │ SelectionSurface │  │ PermissionStore │     │
//! └─────────────┘       └──────────────────┘  └─────────────────┘     │
//!   enumerate +            present + sink        grant on select      │
//!   subscribe ─────────────── hot-plug events ────────────────────────┘
//! ```

pub mod catalog;
pub mod error;
pub mod filter;
pub mod identity;
pub mod memory;
pub mod permission;
pub mod registry;
pub mod session;
pub mod surface;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::{ObserverId, PortCatalog, PortObserver, Subscription, subscribe};
pub use error::{Error, Result};
pub use identity::{RequestingContext, RequestingIdentity};
pub use memory::{MemoryPermissionStore, MemoryPortCatalog, SnapshotAt};
pub use permission::PermissionStore;
pub use registry::SessionRegistry;
pub use serial_chooser_protocol as protocol;
pub use session::{ChooserSession, Collaborators, OutcomeCallback, SessionHandle};
pub use surface::{ResolutionSink, SelectionSurface};
