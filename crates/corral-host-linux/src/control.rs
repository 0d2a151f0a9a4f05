//! Host process control

use corral_host_api::HostControl;
use std::io::Write;
use tracing::info;

/// Ends the real host process
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxHostControl;

impl LinuxHostControl {
    pub fn new() -> Self {
        Self
    }
}

impl HostControl for LinuxHostControl {
    fn resume_input(&self) {
        // std never pauses stdin, nothing is pending here
    }

    fn exit(&self, code: i32) {
        info!(code = code, "Exiting host process");
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
        std::process::exit(code);
    }
}
