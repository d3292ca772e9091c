//! System hardware probing
//!
//! CPU cores come from `num_cpus`, RAM from the system module, and NVIDIA
//! GPUs from `nvidia-smi` when it is installed. GPUs that cannot be
//! probed (AMD, Apple, Intel) can be declared in configuration.

use std::process::Command;

use super::{GpuDevice, GpuVendor, HardwareInfo, HardwareProvider, OptimalSettings};
use crate::config::HardwareSettings;
use crate::system;

/// Provider that probes the host on every call
pub struct SystemHardwareProvider {
    probe_gpus: bool,
    declared_gpus: Vec<GpuDevice>,
    recommended_override: Option<String>,
}

impl SystemHardwareProvider {
    /// Create a provider that probes GPUs and declares none
    pub fn new() -> Self {
        Self {
            probe_gpus: true,
            declared_gpus: Vec::new(),
            recommended_override: None,
        }
    }

    /// Create a provider from the `[hardware]` configuration section
    pub fn from_settings(settings: &HardwareSettings) -> Self {
        Self {
            probe_gpus: settings.detect,
            declared_gpus: settings.gpus.clone(),
            recommended_override: settings.recommended_backend.clone(),
        }
    }

    fn collect_gpus(&self) -> Vec<GpuDevice> {
        let mut gpus = if self.probe_gpus {
            detect_nvidia_gpus()
        } else {
            Vec::new()
        };

        // Declared devices follow probed ones; ids are kept as declared
        // unless they collide with a probed device.
        let mut next_id = gpus.iter().map(|g| g.id + 1).max().unwrap_or(0);
        for declared in &self.declared_gpus {
            let mut gpu = declared.clone();
            if gpus.iter().any(|g| g.id == gpu.id) {
                gpu.id = next_id;
            }
            next_id = next_id.max(gpu.id + 1);
            gpus.push(gpu);
        }
        gpus
    }
}

impl Default for SystemHardwareProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareProvider for SystemHardwareProvider {
    fn hardware_info(&self) -> HardwareInfo {
        let info = HardwareInfo::new(
            self.collect_gpus(),
            num_cpus::get(),
            system::total_memory_mb(),
            self.recommended_override.clone(),
        );
        tracing::debug!(summary = %info.summary(), "Hardware snapshot taken");
        info
    }

    fn optimal_settings(&self) -> OptimalSettings {
        OptimalSettings::for_hardware(&self.hardware_info(), num_cpus::get_physical())
    }
}

// ─────────────────────────────────────────────────────────────────
// NVIDIA detection
// ─────────────────────────────────────────────────────────────────

/// Query NVIDIA GPUs via nvidia-smi (empty when unavailable)
pub fn detect_nvidia_gpus() -> Vec<GpuDevice> {
    // compute_cap is missing from older drivers; retry without it
    let queries = [
        "index,name,memory.total,driver_version,compute_cap",
        "index,name,memory.total,driver_version",
    ];

    for query in queries {
        let output = Command::new("nvidia-smi")
            .arg(format!("--query-gpu={}", query))
            .arg("--format=csv,noheader,nounits")
            .output();

        match output {
            Ok(out) if out.status.success() => {
                let gpus = parse_nvidia_smi(&String::from_utf8_lossy(&out.stdout));
                tracing::debug!(count = gpus.len(), "nvidia-smi reported GPUs");
                return gpus;
            }
            Ok(out) => {
                tracing::debug!(status = %out.status, query, "nvidia-smi query rejected");
            }
            Err(e) => {
                tracing::trace!(error = %e, "nvidia-smi not available");
                return Vec::new();
            }
        }
    }
    Vec::new()
}

/// Parse `nvidia-smi --format=csv,noheader,nounits` output
pub fn parse_nvidia_smi(stdout: &str) -> Vec<GpuDevice> {
    stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
            if parts.len() < 4 {
                return None;
            }

            let compute_capability = parts
                .get(4)
                .filter(|c| !c.is_empty() && !c.starts_with('['))
                .map(|c| c.to_string());

            Some(GpuDevice {
                id: parts[0].parse().ok()?,
                name: parts[1].to_string(),
                vendor: GpuVendor::Nvidia,
                memory_mb: parts[2].parse().ok()?,
                driver_version: parts[3].to_string(),
                compute_capability,
                supports_cuda: true,
                supports_rocm: false,
                supports_opencl: true,
                supports_vulkan: true,
                supports_metal: false,
            })
        })
        .collect()
}
