//! Scenario runner.
//!
//! Drives a [`SerialDelegate`] wired to an in-memory catalog, permission
//! store and an [`EventSurface`] whose `select-serial-port` handler parks the
//! selection until a `choose` or `dismiss` step answers it.
//!
//! Steps are applied on the calling task, with a scheduler yield after each
//! so spawned enumerations can finish. Run on a current-thread runtime for
//! reproducible reports.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serial_chooser::runtime::memory::{EnumerationHold, GrantKey};
use serial_chooser::runtime::{MemoryPermissionStore, MemoryPortCatalog, SnapshotAt};
use serial_chooser::{
	Collaborators, EventSurface, FilterCriterion, IdentityKey, OriginPair, PortDescriptor, PortInfo, PortSelection,
	RequestingContext, SerialDelegate, SerialEvent, SessionId, Subscription,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{CliError, Result};
use crate::scenario::{Scenario, Step};

/// Frame every scenario request comes from.
const FRAME: IdentityKey = IdentityKey(1);

/// Yields this many times after each step.
const SETTLE_YIELDS: usize = 4;

/// What the requester and the embedder saw.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
	/// True when the origin was not allowed to request ports.
	pub blocked: bool,
	/// One entry per chooser request, in request order.
	pub requests: Vec<RequestReport>,
	/// Broadcast events in emission order.
	pub events: Vec<SerialEvent>,
	/// Grants recorded for the scenario's origins.
	pub grants: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestReport {
	pub session_id: SessionId,
	/// Ports shown in the `select-serial-port` event, if it fired.
	pub presented: Option<Vec<PortInfo>>,
	/// The port handed back to the page.
	pub outcome: Option<PortInfo>,
	/// Still open when the steps ran out; shut down afterwards.
	pub pending_at_end: bool,
}

#[derive(Default)]
struct Shown {
	current: Option<PortSelection>,
	presented: HashMap<SessionId, Vec<PortInfo>>,
}

struct Request {
	session_id: SessionId,
	outcome: Arc<Mutex<Option<Option<PortDescriptor>>>>,
}

struct Runner {
	delegate: SerialDelegate,
	catalog: Arc<MemoryPortCatalog>,
	permissions: Arc<MemoryPermissionStore>,
	shown: Arc<Mutex<Shown>>,
	events: broadcast::Receiver<SerialEvent>,
	origins: OriginPair,
	context: Option<RequestingContext>,
	hold: Option<EnumerationHold>,
	filters: Vec<FilterCriterion>,
	requests: Vec<Request>,
	_select: Subscription,
}

/// Runs `scenario` to completion.
pub async fn run(scenario: Scenario) -> Result<Report> {
	let origins = scenario.origins();
	let catalog = Arc::new(MemoryPortCatalog::with_ports(scenario.ports.iter().cloned()));
	let hold = scenario
		.hold_enumeration
		.map(|at| catalog.hold_enumeration(SnapshotAt::from(at)));
	let permissions = Arc::new(MemoryPermissionStore::new());
	permissions.set_read_only(scenario.read_only_permissions);

	let surface = Arc::new(EventSurface::new());
	let shown = Arc::new(Mutex::new(Shown::default()));
	let select = {
		let shown = Arc::clone(&shown);
		surface.on_select_port(move |event| {
			debug!(target = "serial.cli", ports = event.ports.len(), "chooser shown");
			let mut shown = shown.lock();
			shown.presented.insert(event.selection.session_id(), event.ports);
			shown.current = Some(event.selection);
			true
		})
	};
	let events = surface.events();

	let delegate = SerialDelegate::new(
		Collaborators::new(catalog.clone(), surface, permissions.clone()),
		scenario.options.clone(),
	);

	let mut runner = Runner {
		delegate,
		catalog,
		permissions,
		shown,
		events,
		origins: origins.clone(),
		context: Some(RequestingContext::new(FRAME, origins.clone())),
		hold,
		filters: scenario.filters.clone(),
		requests: Vec::new(),
		_select: select,
	};

	if !runner.delegate.can_request_port_permission(&origins) {
		info!(target = "serial.cli", origin = %origins.requesting, "request blocked by chooser options");
		return Ok(runner.finish(true));
	}

	runner.open(scenario.filters.clone());
	settle().await;

	for (index, step) in scenario.steps.iter().enumerate() {
		let number = index + 1;
		debug!(target = "serial.cli", step = number, op = step.op(), "applying step");
		runner.apply(number, step)?;
		settle().await;
	}

	Ok(runner.finish(false))
}

async fn settle() {
	for _ in 0..SETTLE_YIELDS {
		tokio::task::yield_now().await;
	}
}

impl Runner {
	fn open(&mut self, filters: Vec<FilterCriterion>) -> bool {
		let Some(context) = &self.context else {
			return false;
		};
		let outcome = Arc::new(Mutex::new(None));
		let slot = Arc::clone(&outcome);
		let handle = self.delegate.run_chooser(context.identity(), filters, move |port| {
			*slot.lock() = Some(port);
		});
		self.requests.push(Request {
			session_id: handle.id(),
			outcome,
		});
		true
	}

	fn apply(&mut self, number: usize, step: &Step) -> Result<()> {
		let op = step.op();
		match step {
			Step::Attach { port } => {
				if !self.catalog.attach(port.clone()) {
					warn!(target = "serial.cli", port = %port.id, "port already attached");
				}
			}
			Step::Detach { port_id } => {
				if self.catalog.detach(port_id).is_none() {
					warn!(target = "serial.cli", port = %port_id, "port not attached");
				}
			}
			Step::Choose { port_id } => {
				let selection = self.take_selection(number, op)?;
				selection.select(port_id.clone());
			}
			Step::Dismiss => {
				let selection = self.take_selection(number, op)?;
				selection.dismiss();
			}
			Step::Cancel => {
				self.delegate.cancel(FRAME);
			}
			Step::DestroyContext => {
				self.context = None;
				self.delegate.frame_deleted(FRAME);
			}
			Step::Disconnect => self.catalog.disconnect(),
			Step::Reopen { filters } => {
				let filters = filters.clone().unwrap_or_else(|| self.filters.clone());
				if !self.open(filters) {
					return Err(CliError::step(number, op, "the requesting context was destroyed"));
				}
			}
			Step::ReleaseEnumeration => match self.hold.take() {
				Some(hold) => hold.release(),
				None => return Err(CliError::step(number, op, "enumeration is not held")),
			},
		}
		Ok(())
	}

	/// Takes the parked selection of the chooser currently open for the frame.
	fn take_selection(&self, number: usize, op: &'static str) -> Result<PortSelection> {
		let live = self
			.delegate
			.registry()
			.get(FRAME)
			.filter(|handle| handle.is_pending())
			.map(|handle| handle.id());
		let parked = self.shown.lock().current.take();
		match (parked, live) {
			(Some(selection), Some(id)) if selection.session_id() == id => Ok(selection),
			_ => Err(CliError::step(number, op, "no chooser is being shown")),
		}
	}

	fn finish(mut self, blocked: bool) -> Report {
		let pending: Vec<bool> = self
			.requests
			.iter()
			.map(|request| request.outcome.lock().is_none())
			.collect();
		// Release whatever is still open so every outcome is delivered.
		self.delegate.shutdown();
		let parked = self.shown.lock().current.take();
		drop(parked);
		drop(self.hold.take());

		let requests = self
			.requests
			.iter()
			.zip(pending)
			.map(|(request, pending_at_end)| RequestReport {
				session_id: request.session_id,
				presented: self.shown.lock().presented.get(&request.session_id).cloned(),
				outcome: request.outcome.lock().clone().flatten().as_ref().map(PortInfo::from),
				pending_at_end,
			})
			.collect();

		let mut events = Vec::new();
		loop {
			match self.events.try_recv() {
				Ok(event) => events.push(event),
				Err(broadcast::error::TryRecvError::Lagged(n)) => {
					warn!(target = "serial.cli", dropped = n, "event receiver lagged");
				}
				Err(_) => break,
			}
		}

		let mut grants: Vec<String> = self
			.permissions
			.grants_for(&self.origins)
			.into_iter()
			.map(|key| match key {
				GrantKey::Persistent(id) => format!("persistent:{id}"),
				GrantKey::Ephemeral(id) => format!("port:{id}"),
			})
			.collect();
		grants.sort();

		Report {
			blocked,
			requests,
			events,
			grants,
		}
	}
}
