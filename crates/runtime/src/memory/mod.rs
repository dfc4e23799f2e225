//! In-memory collaborators.
//!
//! [`MemoryPortCatalog`] and [`MemoryPermissionStore`] back the scenario
//! runner and the test suites. They implement the same seams a real device
//! manager and profile store would.

mod catalog;
mod permissions;

pub use catalog::{EnumerationHold, MemoryPortCatalog, SnapshotAt};
pub use permissions::{GrantKey, MemoryPermissionStore};
