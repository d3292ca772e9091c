//! Host resource sampling
//!
//! Provides the system metrics section of the monitoring report and the
//! RAM figure the system hardware provider reports.

use std::time::Instant;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────
// System Info
// ─────────────────────────────────────────────────────────────────

/// Static host information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Number of logical CPU cores
    pub cpu_count: usize,

    /// Number of physical CPU cores
    pub physical_cores: usize,

    /// Total system memory (MB)
    pub total_memory_mb: u64,

    /// Operating system name
    pub os_name: String,

    /// OS version
    pub os_version: String,

    /// CPU architecture
    pub arch: String,

    /// Hostname
    pub hostname: String,
}

impl SystemInfo {
    /// Collect system information
    pub fn collect() -> Self {
        Self {
            cpu_count: num_cpus::get(),
            physical_cores: num_cpus::get_physical(),
            total_memory_mb: total_memory_mb(),
            os_name: std::env::consts::OS.to_string(),
            os_version: get_os_version(),
            arch: std::env::consts::ARCH.to_string(),
            hostname: get_hostname(),
        }
    }
}

/// Read a `/proc/meminfo` field in MB
#[cfg(target_os = "linux")]
fn meminfo_mb(field: &str) -> Option<u64> {
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;
    content
        .lines()
        .find(|line| line.starts_with(field))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb / 1024)
}

/// Total system memory in MB (8192 when it cannot be determined)
pub fn total_memory_mb() -> u64 {
    #[cfg(target_os = "linux")]
    {
        meminfo_mb("MemTotal:").unwrap_or(8192)
    }

    #[cfg(not(target_os = "linux"))]
    {
        8192
    }
}

/// Memory currently available to new allocations, in MB
fn available_memory_mb(total_mb: u64) -> u64 {
    #[cfg(target_os = "linux")]
    {
        meminfo_mb("MemAvailable:").unwrap_or(total_mb)
    }

    #[cfg(not(target_os = "linux"))]
    {
        total_mb
    }
}

/// Resident memory of this process in MB
fn process_memory_mb() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/self/statm").ok()?;
        let pages = content.split_whitespace().nth(1)?.parse::<u64>().ok()?;
        // Page size is typically 4KB
        Some((pages * 4) / 1024)
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// One-minute load average
fn load_average() -> Option<f64> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/loadavg")
            .ok()?
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Get OS version string
fn get_os_version() -> String {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|content| {
                content.lines()
                    .find(|l| l.starts_with("PRETTY_NAME="))
                    .map(|l| l.trim_start_matches("PRETTY_NAME=").trim_matches('"').to_string())
            })
            .unwrap_or_else(|| "Linux".to_string())
    }

    #[cfg(target_os = "macos")]
    {
        "macOS".to_string()
    }

    #[cfg(target_os = "windows")]
    {
        "Windows".to_string()
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        "Unknown".to_string()
    }
}

/// Get hostname
fn get_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

// ─────────────────────────────────────────────────────────────────
// System Monitor
// ─────────────────────────────────────────────────────────────────

/// Point-in-time resource sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Static host info
    pub system: SystemInfo,

    /// Memory available to new allocations (MB)
    pub memory_available_mb: u64,

    /// Resident memory of this process (MB)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_memory_mb: Option<u64>,

    /// One-minute load average
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_average: Option<f64>,

    /// Seconds since the monitor was created
    pub uptime_secs: u64,

    /// When the sample was taken
    pub sampled_at: chrono::DateTime<chrono::Utc>,
}

/// Samples host resources for monitoring reports
pub struct SystemMonitor {
    system_info: SystemInfo,
    start_time: Instant,
}

impl SystemMonitor {
    /// Create a new monitor, collecting static info once
    pub fn new() -> Self {
        Self {
            system_info: SystemInfo::collect(),
            start_time: Instant::now(),
        }
    }

    /// Get static system info
    pub fn system_info(&self) -> &SystemInfo {
        &self.system_info
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Take a fresh sample
    pub fn sample(&self) -> SystemMetrics {
        SystemMetrics {
            system: self.system_info.clone(),
            memory_available_mb: available_memory_mb(self.system_info.total_memory_mb),
            process_memory_mb: process_memory_mb(),
            load_average: load_average(),
            uptime_secs: self.uptime_secs(),
            sampled_at: chrono::Utc::now(),
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
