//! Performance recorder
//!
//! The manager brackets every backend operation with `start_operation` and
//! `end_operation`. Elapsed time is measured here and nowhere else.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of completed operations kept in history
pub const DEFAULT_HISTORY_SIZE: usize = 100;

// ─────────────────────────────────────────────────────────────────
// Operation Types
// ─────────────────────────────────────────────────────────────────

/// Kind of timed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Load,
    Generate,
    Unload,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationKind::Load => "load",
            OperationKind::Generate => "generate",
            OperationKind::Unload => "unload",
        };
        write!(f, "{}", s)
    }
}

/// Handle for an operation in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationToken(Uuid);

impl OperationToken {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

/// A completed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationMetric {
    pub id: Uuid,
    pub backend: String,
    pub kind: OperationKind,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregates for one backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendPerfStats {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub loads: u64,
    pub generations: u64,
    pub unloads: u64,
    pub total_duration_secs: f64,
    pub average_duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_memory_mb: Option<u64>,
}

impl BackendPerfStats {
    fn record(&mut self, metric: &OperationMetric) {
        self.total_operations += 1;
        if metric.success {
            self.successful_operations += 1;
        } else {
            self.failed_operations += 1;
        }
        match metric.kind {
            OperationKind::Load => self.loads += 1,
            OperationKind::Generate => self.generations += 1,
            OperationKind::Unload => self.unloads += 1,
        }
        self.total_duration_secs += metric.duration_secs;
        self.average_duration_secs = self.total_duration_secs / self.total_operations as f64;
        if let Some(mb) = metric.memory_usage_mb {
            self.peak_memory_mb = Some(self.peak_memory_mb.map_or(mb, |p| p.max(mb)));
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Recorder
// ─────────────────────────────────────────────────────────────────

struct ActiveOperation {
    backend: String,
    kind: OperationKind,
    started: Instant,
    started_at: DateTime<Utc>,
}

#[derive(Default)]
struct RecorderState {
    active: HashMap<OperationToken, ActiveOperation>,
    history: VecDeque<OperationMetric>,
    stats: HashMap<String, BackendPerfStats>,
}

/// Timed-operation ledger shared between the manager and reporting
pub struct PerformanceRecorder {
    state: Mutex<RecorderState>,
    history_size: usize,
}

impl PerformanceRecorder {
    /// Create a recorder keeping at most `history_size` completed operations
    pub fn new(history_size: usize) -> Self {
        Self {
            state: Mutex::new(RecorderState::default()),
            history_size: history_size.max(1),
        }
    }

    /// Begin timing an operation
    pub fn start_operation(&self, backend: &str, kind: OperationKind) -> OperationToken {
        let token = OperationToken(Uuid::new_v4());
        self.state.lock().active.insert(
            token,
            ActiveOperation {
                backend: backend.to_string(),
                kind,
                started: Instant::now(),
                started_at: Utc::now(),
            },
        );
        tracing::trace!(backend, %kind, id = %token.0, "Operation started");
        token
    }

    /// Finish an operation; `None` for an unknown or already-ended token
    pub fn end_operation(
        &self,
        token: OperationToken,
        success: bool,
        memory_usage_mb: Option<u64>,
        error: Option<String>,
    ) -> Option<OperationMetric> {
        let mut state = self.state.lock();
        let active = state.active.remove(&token)?;

        let metric = OperationMetric {
            id: token.0,
            backend: active.backend,
            kind: active.kind,
            started_at: active.started_at,
            duration_secs: active.started.elapsed().as_secs_f64(),
            success,
            memory_usage_mb,
            error,
        };

        state
            .stats
            .entry(metric.backend.clone())
            .or_default()
            .record(&metric);

        state.history.push_back(metric.clone());
        while state.history.len() > self.history_size {
            state.history.pop_front();
        }

        tracing::debug!(
            backend = %metric.backend,
            kind = %metric.kind,
            success,
            duration_secs = metric.duration_secs,
            "Operation finished"
        );
        Some(metric)
    }

    /// Aggregates per backend
    pub fn get_backend_stats(&self) -> BTreeMap<String, BackendPerfStats> {
        self.state
            .lock()
            .stats
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Most recent completed operations, oldest first
    pub fn get_recent_metrics(&self, limit: usize) -> Vec<OperationMetric> {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Operations started but not yet ended
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }
}

impl Default for PerformanceRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
