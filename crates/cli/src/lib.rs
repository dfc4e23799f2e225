//! Scenario runner for the serial port chooser.
//!
//! The `serial-chooser` binary reads a JSON [`Scenario`](scenario::Scenario),
//! replays it against in-memory collaborators and prints a
//! [`Report`](run::Report).

pub mod cli;
pub mod error;
pub mod logging;
pub mod run;
pub mod scenario;
