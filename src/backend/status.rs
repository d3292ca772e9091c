//! Per-backend health and statistics ledger
//!
//! Mutated only by the manager. Counters accumulate for the lifetime of the
//! registration; availability probes rewrite availability and never touch
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Availability;

/// Running status of one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub name: String,
    pub available: bool,

    /// Why the backend is unavailable
    pub error_message: Option<String>,

    pub last_checked: Option<DateTime<Utc>>,
    pub load_attempts: u64,
    pub success_count: u64,
    pub failure_count: u64,

    /// Running mean over every completed attempt (seconds)
    pub average_load_time: f64,
}

impl BackendStatus {
    /// Status at registration: unavailable until probed
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: false,
            error_message: None,
            last_checked: None,
            load_attempts: 0,
            success_count: 0,
            failure_count: 0,
            average_load_time: 0.0,
        }
    }

    /// Apply an availability probe
    pub fn record_availability(&mut self, availability: Availability) {
        self.available = availability.available;
        self.error_message = if availability.available {
            None
        } else {
            availability.reason
        };
        self.last_checked = Some(Utc::now());
    }

    /// Fold one completed load attempt into the counters
    pub fn record_attempt(&mut self, success: bool, load_time_secs: f64) {
        self.load_attempts += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }

        let n = self.load_attempts as f64;
        self.average_load_time = (self.average_load_time * (n - 1.0) + load_time_secs) / n;
    }

    /// Fraction of attempts that succeeded (0 with no attempts)
    pub fn success_rate(&self) -> f64 {
        if self.load_attempts == 0 {
            0.0
        } else {
            self.success_count as f64 / self.load_attempts as f64
        }
    }
}

/// Reporting view of a backend's status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendStatistics {
    pub load_attempts: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
    pub average_load_time: f64,
    pub available: bool,
}

impl From<&BackendStatus> for BackendStatistics {
    fn from(status: &BackendStatus) -> Self {
        Self {
            load_attempts: status.load_attempts,
            success_count: status.success_count,
            failure_count: status.failure_count,
            success_rate: status.success_rate(),
            average_load_time: status.average_load_time,
            available: status.available,
        }
    }
}
