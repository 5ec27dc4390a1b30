//! Process management utilities for the Flotilla core library
//!
//! This module spawns worker processes with their output redirected to a
//! log file and delivers termination signals to them.
//!
//! ## Platform Support
//!
//! - **Unix**: Full support with process groups for safe cleanup
//!
//! ## Safety
//!
//! The implementation prioritizes safe process management by:
//! - Placing every worker in its own process group so the whole tree is signaled
//! - Treating signals to processes that already exited as success
//! - Reaping exited workers through non-blocking liveness checks

#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use unix::*;
