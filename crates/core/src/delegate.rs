//! Serial delegate: the facade a host uses to run choosers and check access.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use serial_chooser_protocol::{FilterCriterion, IdentityKey, Origin, OriginPair, PortDescriptor};
use serial_chooser_runtime::{
	Collaborators, PermissionStore, PortCatalog, PortObserver, RequestingIdentity, SessionHandle,
	SessionRegistry, Subscription, subscribe,
};
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Host policy applied before a chooser is shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChooserOptions {
	/// Whether pages may request port access at all.
	pub allow_requests: bool,
	/// Requesting origins that are never shown a chooser.
	pub blocked_origins: Vec<Origin>,
}

impl Default for ChooserOptions {
	fn default() -> Self {
		Self {
			allow_requests: true,
			blocked_origins: Vec::new(),
		}
	}
}

/// Entry point for serial port choosers.
///
/// Owns the [`SessionRegistry`], so at most one chooser is live per
/// requesting context. Cheap to clone.
#[derive(Clone, Debug)]
pub struct SerialDelegate {
	registry: SessionRegistry,
	options: ChooserOptions,
}

impl SerialDelegate {
	pub fn new(collaborators: Collaborators, options: ChooserOptions) -> Self {
		Self {
			registry: SessionRegistry::new(collaborators),
			options,
		}
	}

	pub fn options(&self) -> &ChooserOptions {
		&self.options
	}

	pub fn registry(&self) -> &SessionRegistry {
		&self.registry
	}

	/// Opens a chooser for `identity`, replacing any chooser that context
	/// already has open. `on_resolved` runs exactly once.
	pub fn run_chooser<F>(&self, identity: RequestingIdentity, filters: Vec<FilterCriterion>, on_resolved: F) -> SessionHandle
	where
		F: FnOnce(Option<PortDescriptor>) + Send + 'static,
	{
		debug!(
			target = "serial.delegate",
			identity = %identity.key(),
			origin = %identity.origins().requesting,
			filters = filters.len(),
			"run chooser"
		);
		self.registry.open(identity, filters, on_resolved)
	}

	/// Runs a chooser and waits for its outcome.
	///
	/// Resolves `None` without showing anything when the origin may not
	/// request ports.
	pub async fn request_port(
		&self,
		identity: RequestingIdentity,
		filters: Vec<FilterCriterion>,
	) -> Option<PortDescriptor> {
		if !self.can_request_port_permission(identity.origins()) {
			info!(
				target = "serial.delegate",
				origin = %identity.origins().requesting,
				"port request blocked by policy"
			);
			return None;
		}

		let (tx, rx) = oneshot::channel();
		self.run_chooser(identity, filters, move |port| {
			let _ = tx.send(port);
		});
		// A dropped sender can only mean the chooser went away unresolved.
		rx.await.ok().flatten()
	}

	/// Returns whether `origins` may open a chooser at all.
	pub fn can_request_port_permission(&self, origins: &OriginPair) -> bool {
		self.options.allow_requests && !self.options.blocked_origins.contains(&origins.requesting)
	}

	/// Returns whether `origins` were granted access to `port`.
	pub fn has_port_permission(&self, origins: &OriginPair, port: &PortDescriptor) -> bool {
		self.permissions().has_grant(origins, port)
	}

	pub fn port_catalog(&self) -> &Arc<dyn PortCatalog> {
		&self.registry.collaborators().catalog
	}

	pub fn permissions(&self) -> &Arc<dyn PermissionStore> {
		&self.registry.collaborators().permissions
	}

	/// Registers a hot-plug observer on the shared catalog.
	pub fn add_port_observer(&self, observer: Weak<dyn PortObserver>) -> Subscription {
		subscribe(self.port_catalog(), observer)
	}

	/// Cancels the chooser open for `key`, if any.
	pub fn cancel(&self, key: IdentityKey) -> bool {
		self.registry.cancel(key)
	}

	/// The requesting context went away.
	pub fn frame_deleted(&self, key: IdentityKey) {
		self.registry.on_identity_destroyed(key);
	}

	/// Cancels every open chooser.
	pub fn shutdown(&self) {
		self.registry.shutdown();
	}
}
