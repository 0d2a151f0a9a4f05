//! Shared utilities for corral
//!
//! This crate provides:
//! - The `ProcessName` identifier used to address tracked processes
//! - `RunMode`, the process-wide I/O and exit-ownership flag
//! - Default paths for the configuration file

mod ids;
mod mode;
mod paths;

pub use ids::*;
pub use mode::*;
pub use paths::*;
