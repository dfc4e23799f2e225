//! Value types for the serial port chooser.
//!
//! This crate contains the plain data shared between the chooser runtime,
//! the embedder-facing delegate and the scenario CLI:
//!
//! - [`PortDescriptor`] / [`PortId`] - an enumerated serial port
//! - [`PortInfo`] - the embedder view of a port, as carried by chooser events
//! - [`FilterCriterion`] - a vendor/product constraint supplied by the caller
//! - [`IdentityKey`] / [`OriginPair`] - who is asking
//! - [`SessionId`] / [`CloseReason`] - chooser session bookkeeping
//!
//! Types in this crate are pure data: no behavior beyond construction,
//! comparison and serialization.

pub mod identity;
pub mod port;
pub mod session;

pub use identity::*;
pub use port::*;
pub use session::*;
