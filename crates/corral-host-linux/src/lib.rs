//! Linux host for corral
//!
//! Provides:
//! - Shell launch with tree markers and, for captured output, a process group
//! - stdout/stderr capture and exit observation
//! - Process-tree termination (SIGTERM, grace period, SIGKILL)
//! - Host process exit

mod adapter;
mod control;
mod killer;
mod process;
mod tree;

pub use adapter::*;
pub use control::*;
pub use killer::*;
pub use process::*;
pub use tree::*;
