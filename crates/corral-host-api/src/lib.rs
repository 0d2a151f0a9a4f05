//! Host capability interfaces for corral
//!
//! This crate defines the boundary between the supervisor core and the
//! platform: creating processes, terminating process trees, and ending the
//! host process. It contains no platform code itself.

mod handle;
mod mock;
mod traits;

pub use handle::*;
pub use mock::*;
pub use traits::*;
