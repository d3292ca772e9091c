//! llamafile backend
//!
//! Drives a `llamafile` executable in CLI mode. CPU oriented: its default
//! configuration leaves GPU offload disabled.

use crate::hardware::SharedHardwareProvider;

use super::process::{ProcessBackend, Runtime};
use super::BackendConfig;

/// llamafile runtime in non-interactive CLI mode
pub const RUNTIME: Runtime = Runtime {
    executable: "llamafile",
    leading_args: &["--cli", "--no-display-prompt"],
};

/// Create a llamafile backend
pub fn backend(config: BackendConfig, hardware: SharedHardwareProvider) -> ProcessBackend {
    ProcessBackend::new(RUNTIME, config, hardware)
}
