//! Schema definitions for Flotilla
//!
//! This crate contains the data structures shared between the orchestrator
//! core and the CLI: per-instance liveness, run lifecycle states, exit
//! information and the run manifest persisted next to the instance homes.
//! All types here implement JSON Schema generation for external consumption.

pub mod run;


pub use run::*;

use std::time::SystemTime;

/// Current wall-clock time formatted as RFC3339 with seconds precision
pub fn current_timestamp() -> String {
    humantime::format_rfc3339_seconds(SystemTime::now()).to_string()
}
