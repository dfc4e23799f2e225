//! Permission store seam.

use serial_chooser_protocol::{OriginPair, PortDescriptor};

use crate::error::Result;

/// Records which origins may access which ports.
///
/// Chooser sessions only call [`grant`](Self::grant), and only after a
/// successful selection. [`has_grant`](Self::has_grant) serves the separate
/// permission-check path of the embedder.
pub trait PermissionStore: Send + Sync {
	/// Records that `origins` may access `port`.
	fn grant(&self, origins: &OriginPair, port: &PortDescriptor) -> Result<()>;

	/// Returns true if `origins` were granted access to `port`.
	fn has_grant(&self, origins: &OriginPair, port: &PortDescriptor) -> bool;
}
