//! In-memory permission store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serial_chooser_protocol::{OriginPair, PortDescriptor, PortId};
use tracing::debug;

use crate::error::{Error, Result};
use crate::permission::PermissionStore;

/// What a grant is recorded against.
///
/// Ports with a persistent id keep their grant across reconnects; others
/// only for the current connection instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GrantKey {
	Persistent(String),
	Ephemeral(PortId),
}

impl GrantKey {
	pub fn for_port(port: &PortDescriptor) -> Self {
		match port.persistent_id.as_deref() {
			Some(id) if !id.is_empty() => GrantKey::Persistent(id.to_string()),
			_ => GrantKey::Ephemeral(port.id.clone()),
		}
	}
}

/// Permission store keyed by origin pair.
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
	grants: DashMap<OriginPair, HashSet<GrantKey>>,
	read_only: AtomicBool,
}

impl MemoryPermissionStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every subsequent grant fail.
	pub fn set_read_only(&self, read_only: bool) {
		self.read_only.store(read_only, Ordering::SeqCst);
	}

	/// Removes a grant. Returns true if one existed.
	pub fn revoke(&self, origins: &OriginPair, port: &PortDescriptor) -> bool {
		let key = GrantKey::for_port(port);
		self.grants
			.get_mut(origins)
			.is_some_and(|mut keys| keys.remove(&key))
	}

	/// Returns every grant recorded for `origins`.
	pub fn grants_for(&self, origins: &OriginPair) -> Vec<GrantKey> {
		self.grants
			.get(origins)
			.map(|keys| keys.iter().cloned().collect())
			.unwrap_or_default()
	}

	/// Total number of grants across all origins.
	pub fn len(&self) -> usize {
		self.grants.iter().map(|entry| entry.value().len()).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl PermissionStore for MemoryPermissionStore {
	fn grant(&self, origins: &OriginPair, port: &PortDescriptor) -> Result<()> {
		if self.read_only.load(Ordering::SeqCst) {
			return Err(Error::GrantFailed {
				port_id: port.id.clone(),
				reason: "permission store is read-only".into(),
			});
		}
		let key = GrantKey::for_port(port);
		debug!(
			target = "serial.permissions",
			requesting = %origins.requesting,
			embedding = %origins.embedding,
			?key,
			"grant recorded"
		);
		self.grants.entry(origins.clone()).or_default().insert(key);
		Ok(())
	}

	fn has_grant(&self, origins: &OriginPair, port: &PortDescriptor) -> bool {
		let key = GrantKey::for_port(port);
		self.grants.get(origins).is_some_and(|keys| keys.contains(&key))
	}
}
