//! Filter matching for chooser candidates.

use serial_chooser_protocol::{FilterCriterion, PortDescriptor};

/// Returns true if `port` satisfies any criterion in `filters`.
///
/// An empty filter list matches every port.
pub fn matches(filters: &[FilterCriterion], port: &PortDescriptor) -> bool {
	filters.is_empty() || filters.iter().any(|filter| matches_criterion(filter, port))
}

/// Returns true if `port` satisfies every field set on `filter`.
///
/// A field the filter sets but the port lacks fails the criterion.
pub fn matches_criterion(filter: &FilterCriterion, port: &PortDescriptor) -> bool {
	field_matches(filter.vendor_id, port.vendor_id) && field_matches(filter.product_id, port.product_id)
}

fn field_matches(wanted: Option<u16>, actual: Option<u16>) -> bool {
	match wanted {
		None => true,
		Some(wanted) => actual == Some(wanted),
	}
}
