//! Shared fixtures for the session and registry test suites.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serial_chooser_protocol::{IdentityKey, OriginPair, PortDescriptor, PortId};
use tokio::sync::{Notify, mpsc};

use crate::error::Error;
use crate::identity::RequestingIdentity;
use crate::memory::{MemoryPermissionStore, MemoryPortCatalog};
use crate::session::Collaborators;
use crate::surface::{ResolutionSink, SelectionSurface};

const WAIT: Duration = Duration::from_secs(2);

pub(crate) fn port(id: &str, path: &str) -> PortDescriptor {
	PortDescriptor::new(id, path)
}

pub(crate) fn vendor_port(id: &str, path: &str, vendor_id: u16) -> PortDescriptor {
	PortDescriptor::new(id, path).with_vendor_id(vendor_id)
}

pub(crate) fn identity(key: u64) -> RequestingIdentity {
	RequestingIdentity::untracked(IdentityKey(key), origins())
}

pub(crate) fn origins() -> OriginPair {
	OriginPair::main_frame("https://app.test")
}

/// One observed call into the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SurfaceCall {
	Presented(IdentityKey, Vec<PortId>),
	Added(IdentityKey, PortId),
	Removed(IdentityKey, PortId),
	Closed(IdentityKey),
	Diagnostic(IdentityKey, String),
}

pub(crate) fn ids(ids: &[&str]) -> Vec<PortId> {
	ids.iter().map(|id| PortId::from(*id)).collect()
}

/// How [`RecordingSurface::present`] reacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PresentMode {
	/// Keep the sink for the test to resolve later.
	Hold,
	/// Return false without touching the sink.
	Decline,
	/// Resolve synchronously with this id before returning.
	SelectNow(PortId),
	/// Accept ownership but drop the sink.
	AcceptAndDrop,
}

pub(crate) struct RecordingSurface {
	mode: Mutex<PresentMode>,
	sinks: Mutex<Vec<ResolutionSink>>,
	tx: mpsc::UnboundedSender<SurfaceCall>,
}

impl RecordingSurface {
	pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SurfaceCall>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let surface = Arc::new(Self {
			mode: Mutex::new(PresentMode::Hold),
			sinks: Mutex::new(Vec::new()),
			tx,
		});
		(surface, rx)
	}

	pub(crate) fn set_mode(&self, mode: PresentMode) {
		*self.mode.lock() = mode;
	}

	/// Takes the most recently held sink.
	pub(crate) fn take_sink(&self) -> ResolutionSink {
		self.sinks.lock().pop().expect("no held resolution sink")
	}

	fn record(&self, call: SurfaceCall) {
		let _ = self.tx.send(call);
	}
}

impl SelectionSurface for RecordingSurface {
	fn present(&self, identity: &RequestingIdentity, candidates: &[PortDescriptor], sink: ResolutionSink) -> bool {
		self.record(SurfaceCall::Presented(
			identity.key(),
			candidates.iter().map(|p| p.id.clone()).collect(),
		));
		let mode = self.mode.lock().clone();
		match mode {
			PresentMode::Hold => {
				self.sinks.lock().push(sink);
				true
			}
			PresentMode::Decline => false,
			PresentMode::SelectNow(id) => {
				sink.select(id);
				true
			}
			PresentMode::AcceptAndDrop => {
				drop(sink);
				true
			}
		}
	}

	fn notify_added(&self, identity: &RequestingIdentity, port: &PortDescriptor) {
		self.record(SurfaceCall::Added(identity.key(), port.id.clone()));
	}

	fn notify_removed(&self, identity: &RequestingIdentity, port: &PortDescriptor) {
		self.record(SurfaceCall::Removed(identity.key(), port.id.clone()));
	}

	fn notify_closed(&self, identity: &RequestingIdentity) {
		self.record(SurfaceCall::Closed(identity.key()));
	}

	fn report_diagnostic(&self, identity: &RequestingIdentity, error: &Error) {
		self.record(SurfaceCall::Diagnostic(identity.key(), error.to_string()));
	}
}

/// Collects every outcome delivered to the callbacks it hands out.
#[derive(Clone, Default)]
pub(crate) struct Outcomes {
	seen: Arc<Mutex<Vec<(&'static str, Option<PortDescriptor>)>>>,
	notify: Arc<Notify>,
}

impl Outcomes {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn callback(&self, label: &'static str) -> impl FnOnce(Option<PortDescriptor>) + Send + 'static {
		let seen = Arc::clone(&self.seen);
		let notify = Arc::clone(&self.notify);
		move |port| {
			seen.lock().push((label, port));
			notify.notify_one();
		}
	}

	/// Outcomes delivered for `label`, as port ids.
	pub(crate) fn of(&self, label: &str) -> Vec<Option<PortId>> {
		self.seen
			.lock()
			.iter()
			.filter(|(l, _)| *l == label)
			.map(|(_, port)| port.as_ref().map(|p| p.id.clone()))
			.collect()
	}

	/// Labels in delivery order.
	pub(crate) fn order(&self) -> Vec<&'static str> {
		self.seen.lock().iter().map(|(label, _)| *label).collect()
	}

	pub(crate) fn len(&self) -> usize {
		self.seen.lock().len()
	}

	/// Waits until at least `count` outcomes arrived.
	pub(crate) async fn wait_for(&self, count: usize) {
		let deadline = tokio::time::Instant::now() + WAIT;
		while self.len() < count {
			let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
			if remaining.is_zero() {
				panic!("timed out waiting for {count} outcomes, got {}", self.len());
			}
			let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
		}
	}
}

/// Wires the in-memory collaborators to a recording surface.
pub(crate) struct Harness {
	pub(crate) catalog: Arc<MemoryPortCatalog>,
	pub(crate) surface: Arc<RecordingSurface>,
	pub(crate) permissions: Arc<MemoryPermissionStore>,
	pub(crate) collaborators: Collaborators,
	calls: mpsc::UnboundedReceiver<SurfaceCall>,
}

impl Harness {
	pub(crate) fn new(ports: impl IntoIterator<Item = PortDescriptor>) -> Self {
		let catalog = Arc::new(MemoryPortCatalog::with_ports(ports));
		let (surface, calls) = RecordingSurface::new();
		let permissions = Arc::new(MemoryPermissionStore::new());
		let collaborators = Collaborators::new(catalog.clone(), surface.clone(), permissions.clone());
		Self {
			catalog,
			surface,
			permissions,
			collaborators,
			calls,
		}
	}

	/// Waits for the next surface call.
	pub(crate) async fn next_call(&mut self) -> SurfaceCall {
		tokio::time::timeout(WAIT, self.calls.recv())
			.await
			.expect("timed out waiting for surface call")
			.expect("surface channel closed")
	}

	/// Returns surface calls already recorded, without waiting.
	pub(crate) fn drain_calls(&mut self) -> Vec<SurfaceCall> {
		let mut calls = Vec::new();
		while let Ok(call) = self.calls.try_recv() {
			calls.push(call);
		}
		calls
	}
}
