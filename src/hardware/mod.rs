//! Hardware snapshot types and providers
//!
//! Provides:
//! - GPU vendor identification and per-device capability flags
//! - The immutable `HardwareInfo` snapshot consumed by backend selection
//! - Optimal load settings derived from a snapshot
//! - The `HardwareProvider` seam with static and system-probing implementations

mod detect;

pub use detect::*;

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;

// ─────────────────────────────────────────────────────────────────
// GPU Vendor Identification
// ─────────────────────────────────────────────────────────────────

/// Known GPU vendors identified by PCI vendor ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    /// AMD (vendor ID: 0x1002)
    Amd,
    /// NVIDIA (vendor ID: 0x10DE)
    Nvidia,
    /// Intel (vendor ID: 0x8086)
    Intel,
    /// Apple (vendor ID: 0x106B)
    Apple,
    /// Unknown vendor with raw ID
    Unknown(u32),
}

impl GpuVendor {
    /// PCI Vendor ID for AMD
    pub const AMD_VENDOR_ID: u32 = 0x1002;
    /// PCI Vendor ID for NVIDIA
    pub const NVIDIA_VENDOR_ID: u32 = 0x10DE;
    /// PCI Vendor ID for Intel
    pub const INTEL_VENDOR_ID: u32 = 0x8086;
    /// PCI Vendor ID for Apple
    pub const APPLE_VENDOR_ID: u32 = 0x106B;

    /// Create GpuVendor from PCI vendor ID
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            Self::AMD_VENDOR_ID => GpuVendor::Amd,
            Self::NVIDIA_VENDOR_ID => GpuVendor::Nvidia,
            Self::INTEL_VENDOR_ID => GpuVendor::Intel,
            Self::APPLE_VENDOR_ID => GpuVendor::Apple,
            other => GpuVendor::Unknown(other),
        }
    }

    /// Get the human-readable vendor name
    pub fn name(&self) -> &'static str {
        match self {
            GpuVendor::Amd => "AMD",
            GpuVendor::Nvidia => "NVIDIA",
            GpuVendor::Intel => "Intel",
            GpuVendor::Apple => "Apple",
            GpuVendor::Unknown(_) => "Unknown",
        }
    }
}

impl std::fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ─────────────────────────────────────────────────────────────────
// Hardware Categories
// ─────────────────────────────────────────────────────────────────

/// Hardware a model can run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareType {
    Cpu,
    Cuda,
    Rocm,
    #[serde(rename = "opencl")]
    OpenCl,
    Vulkan,
    Metal,
}

impl HardwareType {
    /// Accelerators in order of preference when several are present
    pub const ACCELERATORS: [HardwareType; 5] = [
        HardwareType::Cuda,
        HardwareType::Rocm,
        HardwareType::Metal,
        HardwareType::Vulkan,
        HardwareType::OpenCl,
    ];

    /// Lowercase identifier ("cpu", "cuda", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareType::Cpu => "cpu",
            HardwareType::Cuda => "cuda",
            HardwareType::Rocm => "rocm",
            HardwareType::OpenCl => "opencl",
            HardwareType::Vulkan => "vulkan",
            HardwareType::Metal => "metal",
        }
    }
}

impl std::fmt::Display for HardwareType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// GPU Device
// ─────────────────────────────────────────────────────────────────

/// One GPU as reported by detection or declared in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuDevice {
    /// Device index
    pub id: u32,

    /// Display name
    pub name: String,

    /// GPU vendor
    pub vendor: GpuVendor,

    /// Video memory (MB)
    pub memory_mb: u64,

    /// Driver version string
    #[serde(default)]
    pub driver_version: String,

    /// CUDA compute capability, e.g. "8.6"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_capability: Option<String>,

    #[serde(default)]
    pub supports_cuda: bool,
    #[serde(default)]
    pub supports_rocm: bool,
    #[serde(default)]
    pub supports_opencl: bool,
    #[serde(default)]
    pub supports_vulkan: bool,
    #[serde(default)]
    pub supports_metal: bool,
}

impl GpuDevice {
    /// Check a single acceleration API
    pub fn supports(&self, hw: HardwareType) -> bool {
        match hw {
            HardwareType::Cpu => false,
            HardwareType::Cuda => self.supports_cuda,
            HardwareType::Rocm => self.supports_rocm,
            HardwareType::OpenCl => self.supports_opencl,
            HardwareType::Vulkan => self.supports_vulkan,
            HardwareType::Metal => self.supports_metal,
        }
    }

    /// All acceleration APIs this device supports
    pub fn accelerators(&self) -> Vec<HardwareType> {
        HardwareType::ACCELERATORS
            .iter()
            .copied()
            .filter(|hw| self.supports(*hw))
            .collect()
    }

    /// Format a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} {} ({}MB) - {}",
            self.vendor,
            self.name,
            self.memory_mb,
            self.accelerators()
                .iter()
                .map(|a| a.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Hardware Snapshot
// ─────────────────────────────────────────────────────────────────

/// Point-in-time view of the machine
///
/// Never mutated in place. A refresh produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub gpu_count: usize,
    pub gpus: Vec<GpuDevice>,
    pub total_vram_mb: u64,
    pub cpu_cores: usize,
    pub total_ram_mb: u64,
    pub recommended_backend: String,
    pub supported_hardware: BTreeSet<HardwareType>,
}

impl HardwareInfo {
    /// Build a snapshot, deriving totals, categories and the recommendation
    pub fn new(
        gpus: Vec<GpuDevice>,
        cpu_cores: usize,
        total_ram_mb: u64,
        recommended_override: Option<String>,
    ) -> Self {
        let mut supported_hardware = BTreeSet::from([HardwareType::Cpu]);
        for gpu in &gpus {
            supported_hardware.extend(gpu.accelerators());
        }

        let has_accelerator = supported_hardware.len() > 1;
        let recommended_backend = recommended_override.unwrap_or_else(|| {
            if has_accelerator {
                BackendKind::LlamaCpp.name().to_string()
            } else {
                BackendKind::Llamafile.name().to_string()
            }
        });

        Self {
            gpu_count: gpus.len(),
            total_vram_mb: gpus.iter().map(|g| g.memory_mb).sum(),
            gpus,
            cpu_cores,
            total_ram_mb,
            recommended_backend,
            supported_hardware,
        }
    }

    /// Same machine seen by something running without GPU offload
    pub fn cpu_only(&self) -> Self {
        Self {
            gpu_count: 0,
            gpus: Vec::new(),
            total_vram_mb: 0,
            cpu_cores: self.cpu_cores,
            total_ram_mb: self.total_ram_mb,
            recommended_backend: self.recommended_backend.clone(),
            supported_hardware: BTreeSet::from([HardwareType::Cpu]),
        }
    }

    /// Preferred accelerator present on this machine, if any
    pub fn best_accelerator(&self) -> Option<HardwareType> {
        HardwareType::ACCELERATORS
            .iter()
            .copied()
            .find(|hw| self.supported_hardware.contains(hw))
    }

    /// Check whether a hardware category is available
    pub fn supports(&self, hw: HardwareType) -> bool {
        self.supported_hardware.contains(&hw)
    }

    /// One-line summary for logs and CLI output
    pub fn summary(&self) -> String {
        format!(
            "{} cores, {}MB RAM, {} GPU(s) with {}MB VRAM, recommended: {}",
            self.cpu_cores, self.total_ram_mb, self.gpu_count, self.total_vram_mb, self.recommended_backend
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Optimal Settings
// ─────────────────────────────────────────────────────────────────

/// Load settings suggested for a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimalSettings {
    pub gpu_enabled: bool,
    /// -1 = offload every layer
    pub gpu_layers: i32,
    pub context_size: u32,
    pub batch_size: u32,
    pub threads: u32,
}

impl OptimalSettings {
    /// Derive settings from a snapshot and a physical core count
    pub fn for_hardware(info: &HardwareInfo, physical_cores: usize) -> Self {
        let gpu_enabled = info.gpu_count > 0;
        Self {
            gpu_enabled,
            gpu_layers: if gpu_enabled && info.total_vram_mb >= 4096 { -1 } else { 0 },
            context_size: if info.total_ram_mb >= 8192 { 4096 } else { 2048 },
            batch_size: 512,
            threads: physical_cores.max(1) as u32,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────────────────────────

/// Source of hardware snapshots
///
/// Both reads are authoritative at call time and must not cache beyond
/// the call that produced them.
pub trait HardwareProvider: Send + Sync {
    /// Take a snapshot of the machine
    fn hardware_info(&self) -> HardwareInfo;

    /// Suggested load settings for the current snapshot
    fn optimal_settings(&self) -> OptimalSettings {
        let info = self.hardware_info();
        let cores = info.cpu_cores;
        OptimalSettings::for_hardware(&info, cores)
    }
}

/// Shared provider handle
pub type SharedHardwareProvider = Arc<dyn HardwareProvider>;

/// Provider returning a fixed snapshot, replaceable wholesale
pub struct StaticHardwareProvider {
    info: RwLock<HardwareInfo>,
}

impl StaticHardwareProvider {
    /// Create a provider for the given snapshot
    pub fn new(info: HardwareInfo) -> Self {
        Self {
            info: RwLock::new(info),
        }
    }

    /// Provider for a machine with no GPUs
    pub fn cpu_only(cpu_cores: usize, total_ram_mb: u64) -> Self {
        Self::new(HardwareInfo::new(Vec::new(), cpu_cores, total_ram_mb, None))
    }

    /// Replace the snapshot
    pub fn replace(&self, info: HardwareInfo) {
        *self.info.write() = info;
    }
}

impl HardwareProvider for StaticHardwareProvider {
    fn hardware_info(&self) -> HardwareInfo {
        self.info.read().clone()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
