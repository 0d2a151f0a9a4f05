//! Core process supervisor for corral
//!
//! This crate contains:
//! - The `Supervisor`: spawn-and-track, line-buffered output events,
//!   per-process and bulk process-tree termination
//! - Actions and the catalog a supervisor runs them from
//! - Line hooks that transform output before it is emitted
//! - The `ProcessRegistry` shared by every supervisor in a host
//! - The `ExitCoordinator`, which cleans every supervisor before the host exits

mod action;
mod error;
mod events;
mod exit;
mod hooks;
mod output;
mod registry;
mod supervisor;

pub use action::*;
pub use error::*;
pub use events::*;
pub use exit::*;
pub use hooks::*;
pub use output::*;
pub use registry::*;
pub use supervisor::*;
