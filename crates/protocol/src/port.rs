//! Serial port descriptors and filter criteria.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Opaque token identifying one physical connection instance of a port.
///
/// Re-plugging a device yields a new id; two descriptors describe the same
/// logical port iff their ids are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(String);

impl PortId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for PortId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for PortId {
	fn from(id: &str) -> Self {
		Self(id.to_string())
	}
}

impl From<String> for PortId {
	fn from(id: String) -> Self {
		Self(id)
	}
}

impl From<u64> for PortId {
	fn from(id: u64) -> Self {
		Self(id.to_string())
	}
}

/// An enumerated serial port.
///
/// Produced by a port catalog; chooser sessions keep their own copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDescriptor {
	/// Connection-instance token.
	#[serde(rename = "portId")]
	pub id: PortId,
	/// Host path of the device node (e.g. `/dev/ttyUSB0`, `COM3`).
	pub path: PathBuf,
	/// Human readable name reported by the driver.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub display_name: Option<String>,
	/// Identifier that survives reconnects (e.g. a USB serial number).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub persistent_id: Option<String>,
	/// USB vendor id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vendor_id: Option<u16>,
	/// USB product id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub product_id: Option<u16>,
}

impl PortDescriptor {
	/// Creates a descriptor with only the mandatory fields set.
	pub fn new(id: impl Into<PortId>, path: impl Into<PathBuf>) -> Self {
		Self {
			id: id.into(),
			path: path.into(),
			display_name: None,
			persistent_id: None,
			vendor_id: None,
			product_id: None,
		}
	}

	pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
		self.display_name = Some(name.into());
		self
	}

	pub fn with_persistent_id(mut self, id: impl Into<String>) -> Self {
		self.persistent_id = Some(id.into());
		self
	}

	pub fn with_vendor_id(mut self, vendor_id: u16) -> Self {
		self.vendor_id = Some(vendor_id);
		self
	}

	pub fn with_product_id(mut self, product_id: u16) -> Self {
		self.product_id = Some(product_id);
		self
	}

	/// Returns the last component of [`path`](Self::path), lossily decoded.
	pub fn port_name(&self) -> String {
		base_name(&self.path)
	}

	/// Returns true if both descriptors name the same connection instance.
	pub fn same_port(&self, other: &PortDescriptor) -> bool {
		self.id == other.id
	}
}

fn base_name(path: &Path) -> String {
	path.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Embedder view of a port as delivered with chooser events.
///
/// Empty display names and persistent ids are omitted rather than sent as
/// empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
	pub port_id: PortId,
	pub port_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub display_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub persistent_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vendor_id: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub product_id: Option<u16>,
}

impl From<&PortDescriptor> for PortInfo {
	fn from(port: &PortDescriptor) -> Self {
		Self {
			port_id: port.id.clone(),
			port_name: port.port_name(),
			display_name: port.display_name.clone().filter(|s| !s.is_empty()),
			persistent_id: port.persistent_id.clone().filter(|s| !s.is_empty()),
			vendor_id: port.vendor_id,
			product_id: port.product_id,
		}
	}
}

/// A vendor/product constraint narrowing the candidate ports.
///
/// Unset fields are wildcards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriterion {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub vendor_id: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub product_id: Option<u16>,
}

impl FilterCriterion {
	/// Matches any vendor with the given id.
	pub fn vendor(vendor_id: u16) -> Self {
		Self {
			vendor_id: Some(vendor_id),
			product_id: None,
		}
	}

	/// Matches one exact vendor/product pair.
	pub fn vendor_product(vendor_id: u16, product_id: u16) -> Self {
		Self {
			vendor_id: Some(vendor_id),
			product_id: Some(product_id),
		}
	}

	/// Matches a product id regardless of vendor.
	pub fn product(product_id: u16) -> Self {
		Self {
			vendor_id: None,
			product_id: Some(product_id),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn port_name_is_path_file_name() {
		let port = PortDescriptor::new("1", "/dev/ttyUSB0");
		assert_eq!(port.port_name(), "ttyUSB0");

		let port = PortDescriptor::new("2", "COM3");
		assert_eq!(port.port_name(), "COM3");
	}

	#[test]
	fn descriptor_serializes_with_port_id_and_omits_unset_fields() {
		let port = PortDescriptor::new("7", "/dev/ttyACM0").with_vendor_id(0x2341);
		let json = serde_json::to_value(&port).unwrap();

		assert_eq!(json["portId"], "7");
		assert_eq!(json["path"], "/dev/ttyACM0");
		assert_eq!(json["vendorId"], 0x2341);
		assert!(json.get("productId").is_none());
		assert!(json.get("displayName").is_none());
	}

	#[test]
	fn port_info_drops_empty_strings() {
		let port = PortDescriptor::new("3", "/dev/ttyS0")
			.with_display_name("")
			.with_persistent_id("A1B2");
		let info = PortInfo::from(&port);

		assert_eq!(info.port_name, "ttyS0");
		assert_eq!(info.display_name, None);
		assert_eq!(info.persistent_id.as_deref(), Some("A1B2"));

		let json = serde_json::to_value(&info).unwrap();
		assert_eq!(json["portId"], "3");
		assert!(json.get("displayName").is_none());
	}

	#[test]
	fn filter_criterion_deserializes_partial_objects() {
		let filters: Vec<FilterCriterion> =
			serde_json::from_str(r#"[{"vendorId": 9025}, {"productId": 67}, {}]"#).unwrap();

		assert_eq!(filters[0], FilterCriterion::vendor(0x2341));
		assert_eq!(filters[1], FilterCriterion::product(67));
		assert_eq!(filters[2], FilterCriterion::default());
	}

	#[test]
	fn same_port_compares_ids_only() {
		let a = PortDescriptor::new("1", "/dev/ttyA");
		let b = PortDescriptor::new("1", "/dev/ttyB").with_vendor_id(1);
		let c = PortDescriptor::new("2", "/dev/ttyA");

		assert!(a.same_port(&b));
		assert!(!a.same_port(&c));
	}
}
