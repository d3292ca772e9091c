//! llama.cpp backend
//!
//! Drives the `llama-cli` executable that ships with llama.cpp builds.
//! Offload is controlled with `-ngl`, so CUDA, ROCm, Metal and Vulkan
//! builds all work through the same flags.

use crate::hardware::SharedHardwareProvider;

use super::process::{ProcessBackend, Runtime};
use super::BackendConfig;

/// llama.cpp runtime: single-shot completion, prompt not echoed
pub const RUNTIME: Runtime = Runtime {
    executable: "llama-cli",
    leading_args: &["-no-cnv", "--no-display-prompt", "--log-disable"],
};

/// Create a llama.cpp backend
pub fn backend(config: BackendConfig, hardware: SharedHardwareProvider) -> ProcessBackend {
    ProcessBackend::new(RUNTIME, config, hardware)
}
