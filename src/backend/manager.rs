//! Backend manager
//!
//! Owns every registered backend, their status ledger and the single
//! "current" backend holding a resident model. Selection is hardware-aware;
//! loads without an explicit backend walk the fallback order and stop at
//! the first success.
//!
//! The manager assumes one in-flight load, switch or unload at a time.
//! Callers sharing it across tasks wrap it in a `tokio::sync::Mutex`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::hardware::{HardwareInfo, SharedHardwareProvider};
use crate::loader::CancelToken;
use crate::monitoring::{BackendPerfStats, OperationKind, OperationMetric, PerformanceRecorder};
use crate::system::{SystemMetrics, SystemMonitor};
use crate::types::{GenerationConfig, ModelInfo};

use super::{
    Availability, BackendConfig, BackendFactory, BackendStatistics, BackendStatus, EventBus,
    EventListener, FailureKind, LoadOptions, LoadingResult, ManagerEvent, ModelBackend,
};

/// Default multiplier from file size to required memory
pub const DEFAULT_MEMORY_OVERHEAD: f64 = 1.2;

/// Recent operations included in a monitoring report
const REPORT_RECENT_OPERATIONS: usize = 20;

// ─────────────────────────────────────────────────────────────────
// Selection Policy
// ─────────────────────────────────────────────────────────────────

/// Hardware restriction for backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwarePreference {
    /// Any available backend
    #[default]
    Auto,
    /// Only GPU-enabled backends
    Gpu,
    /// Only backends with GPU disabled
    Cpu,
}

impl FromStr for HardwarePreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" | "" => Ok(HardwarePreference::Auto),
            "gpu" => Ok(HardwarePreference::Gpu),
            "cpu" => Ok(HardwarePreference::Cpu),
            other => Err(Error::config_field_invalid(
                "hardware_preference",
                format!("'{}' is not one of auto, gpu, cpu", other),
            )),
        }
    }
}

impl std::fmt::Display for HardwarePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HardwarePreference::Auto => "auto",
            HardwarePreference::Gpu => "gpu",
            HardwarePreference::Cpu => "cpu",
        };
        write!(f, "{}", s)
    }
}

/// Tunables for selection and sizing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionPolicy {
    pub memory_overhead_factor: f64,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            memory_overhead_factor: DEFAULT_MEMORY_OVERHEAD,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Monitoring Report
// ─────────────────────────────────────────────────────────────────

/// The current backend and the model it holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentBackendInfo {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub model_info: Option<ModelInfo>,
}

/// Everything the manager knows, in one serializable value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub backend_statistics: BTreeMap<String, BackendStatistics>,
    pub performance_stats: BTreeMap<String, BackendPerfStats>,
    pub system_metrics: SystemMetrics,
    pub hardware_info: HardwareInfo,
    pub recent_operations: Vec<OperationMetric>,
    pub current_backend: Option<String>,
    pub current_model_path: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────
// Backend Manager
// ─────────────────────────────────────────────────────────────────

struct BackendSlot {
    config: BackendConfig,
    instance: Option<Box<dyn ModelBackend>>,
}

impl BackendSlot {
    /// The instance, created through the factory on first use
    fn instance(&mut self, hardware: &SharedHardwareProvider) -> &mut Box<dyn ModelBackend> {
        let config = &self.config;
        self.instance
            .get_or_insert_with(|| BackendFactory::create(config, hardware.clone()))
    }
}

/// Registration, selection, fallback and session state for backends
pub struct BackendManager {
    slots: HashMap<String, BackendSlot>,
    registration_order: Vec<String>,
    fallback_order: Vec<String>,
    statuses: HashMap<String, BackendStatus>,
    current: Option<String>,
    current_model_path: Option<PathBuf>,
    hardware: SharedHardwareProvider,
    recorder: Arc<PerformanceRecorder>,
    monitor: SystemMonitor,
    events: EventBus,
    policy: SelectionPolicy,
}

impl BackendManager {
    /// Create an empty manager
    pub fn new(hardware: SharedHardwareProvider, recorder: Arc<PerformanceRecorder>) -> Self {
        Self {
            slots: HashMap::new(),
            registration_order: Vec::new(),
            fallback_order: Vec::new(),
            statuses: HashMap::new(),
            current: None,
            current_model_path: None,
            hardware,
            recorder,
            monitor: SystemMonitor::new(),
            events: EventBus::new(),
            policy: SelectionPolicy::default(),
        }
    }

    /// Build a manager from configuration and probe every backend once
    pub fn from_config(
        config: &LoaderConfig,
        hardware: SharedHardwareProvider,
        recorder: Arc<PerformanceRecorder>,
    ) -> Result<Self> {
        let mut manager = Self::new(hardware, recorder).with_policy(SelectionPolicy {
            memory_overhead_factor: config.selection.memory_overhead_factor,
        });

        for backend in config.backend_configs()? {
            manager.register_backend(backend)?;
        }
        if !config.selection.fallback_order.is_empty() {
            manager.set_fallback_order(config.selection.fallback_order.clone());
        }

        manager.refresh_backend_availability();

        tracing::info!(
            backends = manager.registration_order.len(),
            available = manager.get_available_backends().len(),
            fallback_order = ?manager.fallback_order,
            "Backend manager initialized"
        );
        Ok(manager)
    }

    /// Replace the selection policy
    pub fn with_policy(mut self, policy: SelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &SelectionPolicy {
        &self.policy
    }

    // ─────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────

    /// Register a backend; the instance is created on first use
    pub fn register_backend(&mut self, config: BackendConfig) -> Result<()> {
        self.insert_slot(config, None)
    }

    /// Register a pre-built backend instance (bypasses BackendFactory)
    pub fn register_instance(&mut self, backend: Box<dyn ModelBackend>) -> Result<()> {
        let config = backend.config().clone();
        self.insert_slot(config, Some(backend))
    }

    fn insert_slot(&mut self, config: BackendConfig, instance: Option<Box<dyn ModelBackend>>) -> Result<()> {
        let name = config.name.clone();
        if self.slots.contains_key(&name) {
            return Err(Error::BackendAlreadyRegistered { name });
        }

        tracing::info!(backend = %name, kind = %config.kind, gpu = config.gpu_enabled, "Backend registered");

        self.slots.insert(name.clone(), BackendSlot { config, instance });
        self.statuses.insert(name.clone(), BackendStatus::new(&name));
        self.registration_order.push(name.clone());
        self.fallback_order.push(name);
        Ok(())
    }

    /// Replace the fallback order; unknown names are dropped
    pub fn set_fallback_order(&mut self, order: Vec<String>) {
        let mut resolved = Vec::with_capacity(order.len());
        for name in order {
            if !self.slots.contains_key(&name) {
                tracing::warn!(backend = %name, "Ignoring unknown backend in fallback order");
            } else if !resolved.contains(&name) {
                resolved.push(name);
            }
        }
        self.fallback_order = resolved;
    }

    pub fn fallback_order(&self) -> &[String] {
        &self.fallback_order
    }

    /// Registered backend names, in registration order
    pub fn backend_names(&self) -> &[String] {
        &self.registration_order
    }

    pub fn backend_config(&self, name: &str) -> Option<&BackendConfig> {
        self.slots.get(name).map(|s| &s.config)
    }

    pub fn get_status(&self, name: &str) -> Option<&BackendStatus> {
        self.statuses.get(name)
    }

    // ─────────────────────────────────────────────────────────────
    // Availability
    // ─────────────────────────────────────────────────────────────

    /// Re-probe every backend; attempt counters are kept
    pub fn refresh_backend_availability(&mut self) {
        for name in &self.registration_order {
            let Some(slot) = self.slots.get_mut(name) else {
                continue;
            };

            let availability = if slot.config.enabled {
                slot.instance(&self.hardware).is_available()
            } else {
                Availability::unavailable("disabled in configuration")
            };

            tracing::debug!(
                backend = %name,
                available = availability.available,
                reason = ?availability.reason,
                "Backend probed"
            );

            if let Some(status) = self.statuses.get_mut(name) {
                status.record_availability(availability);
            }
        }
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.statuses.get(name).map(|s| s.available).unwrap_or(false)
    }

    /// Available backends, in registration order
    pub fn get_available_backends(&self) -> Vec<String> {
        self.registration_order
            .iter()
            .filter(|n| self.is_available(n))
            .cloned()
            .collect()
    }

    // ─────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────

    /// Whether the estimated footprint fits the backend's memory pool
    pub fn can_handle_model_size(&self, name: &str, model_size_mb: u64) -> bool {
        let hardware = self.hardware.hardware_info();
        self.fits(name, model_size_mb, &hardware)
    }

    fn fits(&self, name: &str, model_size_mb: u64, hardware: &HardwareInfo) -> bool {
        let Some(slot) = self.slots.get(name) else {
            return false;
        };

        let required = model_size_mb as f64 * self.policy.memory_overhead_factor;
        let capacity = if slot.config.uses_gpu(hardware) {
            hardware.total_vram_mb
        } else {
            hardware.total_ram_mb
        };
        required <= capacity as f64
    }

    /// Pick a backend for a model of the given size
    ///
    /// The snapshot's recommended backend wins when it qualifies; otherwise
    /// the fallback order breaks the tie.
    pub fn get_best_backend(&self, model_size_mb: u64, preference: HardwarePreference) -> Option<String> {
        let hardware = self.hardware.hardware_info();

        let candidates: Vec<&String> = self
            .registration_order
            .iter()
            .filter(|n| self.is_available(n))
            .filter(|n| {
                let gpu = self.slots.get(n.as_str()).map(|s| s.config.gpu_enabled).unwrap_or(false);
                match preference {
                    HardwarePreference::Auto => true,
                    HardwarePreference::Gpu => gpu,
                    HardwarePreference::Cpu => !gpu,
                }
            })
            .filter(|n| self.fits(n, model_size_mb, &hardware))
            .collect();

        if candidates.is_empty() {
            tracing::debug!(model_size_mb, %preference, "No backend can take the model");
            return None;
        }

        if candidates.iter().any(|n| **n == hardware.recommended_backend) {
            return Some(hardware.recommended_backend);
        }

        self.fallback_order
            .iter()
            .find(|n| candidates.contains(n))
            .or_else(|| candidates.first().copied())
            .cloned()
    }

    // ─────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────

    /// Load a model on the named backend, or walk the fallback order
    pub async fn load_model(&mut self, path: &Path, backend_name: Option<&str>) -> LoadingResult {
        self.load_model_with_cancel(path, backend_name, &CancelToken::never())
            .await
    }

    /// Cancellable form of `load_model`
    pub async fn load_model_with_cancel(
        &mut self,
        path: &Path,
        backend_name: Option<&str>,
        cancel: &CancelToken,
    ) -> LoadingResult {
        let requested = backend_name.unwrap_or_default();

        if !path.exists() {
            return LoadingResult::failure(
                requested,
                FailureKind::NotFound,
                Error::ModelNotFound { path: path.to_path_buf() }.to_string(),
            );
        }

        let candidates: Vec<String> = match backend_name {
            Some(name) => {
                if !self.is_available(name) {
                    tracing::warn!(backend = %name, "Requested backend is not available");
                    return LoadingResult::failure(
                        name,
                        FailureKind::Unavailable,
                        format!("Backend '{}' is not available", name),
                    );
                }
                vec![name.to_string()]
            }
            None => self
                .fallback_order
                .iter()
                .filter(|n| self.is_available(n))
                .cloned()
                .collect(),
        };

        if candidates.is_empty() {
            return LoadingResult::failure(requested, FailureKind::Unavailable, "No backend available");
        }

        if cancel.is_cancelled() {
            tracing::info!(path = %path.display(), "Load cancelled before start");
            return LoadingResult::failure(requested, FailureKind::Cancelled, "Load cancelled");
        }

        // one resident model at a time
        if self.current.is_some() {
            self.unload_model().await;
        }

        let total = candidates.len();
        let mut last: Option<LoadingResult> = None;

        for (idx, name) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(backend = %name, "Load cancelled before attempt");
                return LoadingResult::failure(name.as_str(), FailureKind::Cancelled, "Load cancelled");
            }

            self.events.emit(ManagerEvent::LoadingProgress {
                message: format!("Loading with backend '{}'", name),
                percent: (idx * 100 / total) as u8,
            });

            let result = self.attempt(name, path).await;

            if result.success {
                if cancel.is_cancelled() {
                    tracing::info!(backend = %name, "Load cancelled after success; unloading");
                    if let Some(backend) = self.slots.get_mut(name).and_then(|s| s.instance.as_mut()) {
                        backend.unload_model().await;
                    }
                    return LoadingResult::failure(name.as_str(), FailureKind::Cancelled, "Load cancelled");
                }

                self.current = Some(name.clone());
                self.current_model_path = Some(path.to_path_buf());
                self.events.emit(ManagerEvent::BackendChanged {
                    backend: name.clone(),
                    path: path.to_path_buf(),
                });
                return result;
            }

            let error = result.error().to_string();
            if let Some(next) = candidates.get(idx + 1) {
                tracing::warn!(from = %name, to = %next, error = %error, "Falling back to next backend");
                self.events.emit(ManagerEvent::FallbackTriggered {
                    from: name.clone(),
                    to: next.clone(),
                    error,
                });
            }
            last = Some(result);
        }

        let last = match last {
            Some(result) => result,
            None => return LoadingResult::failure(requested, FailureKind::Unavailable, "No backend available"),
        };

        if backend_name.is_some() {
            return last;
        }

        tracing::error!(path = %path.display(), error = %last.error(), "All backends failed");
        LoadingResult::failure(
            last.backend_name.clone(),
            FailureKind::Aggregate,
            format!("All backends failed; last error: {}", last.error()),
        )
        .with_load_time(last.load_time)
    }

    /// One recorded load attempt on one backend
    async fn attempt(&mut self, name: &str, path: &Path) -> LoadingResult {
        let hardware = self.hardware.hardware_info();
        let optimal = self.hardware.optimal_settings();

        let Some(slot) = self.slots.get_mut(name) else {
            return LoadingResult::failure(name, FailureKind::Unavailable, format!("Backend '{}' does not exist", name));
        };
        let options = LoadOptions::resolve(&slot.config, &optimal, hardware, self.policy.memory_overhead_factor);

        tracing::info!(backend = %name, path = %path.display(), use_gpu = options.use_gpu, "Attempting load");

        let token = self.recorder.start_operation(name, OperationKind::Load);
        let result = slot.instance(&self.hardware).load_model(path, &options).await;
        let metric = self.recorder.end_operation(
            token,
            result.success,
            result.memory_usage_mb,
            result.error_message.clone(),
        );

        let elapsed = metric.map(|m| m.duration_secs).unwrap_or(result.load_time);
        if let Some(status) = self.statuses.get_mut(name) {
            status.record_attempt(result.success, elapsed);
        }

        if result.success {
            tracing::info!(backend = %name, hardware = %result.hardware_used, load_time = elapsed, "Load succeeded");
        } else {
            tracing::warn!(backend = %name, error = %result.error(), "Load failed");
        }
        result
    }

    // ─────────────────────────────────────────────────────────────
    // Generation & Unload
    // ─────────────────────────────────────────────────────────────

    /// Generate text on the current backend
    pub async fn generate_text(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let name = self.current.as_deref().ok_or(Error::NoModelLoaded)?;
        let backend = self
            .slots
            .get(name)
            .and_then(|s| s.instance.as_ref())
            .ok_or(Error::NoModelLoaded)?;

        let token = self.recorder.start_operation(name, OperationKind::Generate);
        let result = backend.generate_text(prompt, config).await;
        self.recorder.end_operation(
            token,
            result.is_ok(),
            None,
            result.as_ref().err().map(|e| e.to_string()),
        );
        result
    }

    /// Release the current model; trivially true when nothing is loaded
    pub async fn unload_model(&mut self) -> bool {
        let Some(name) = self.current.take() else {
            return true;
        };
        let path = self.current_model_path.take();

        let Some(backend) = self.slots.get_mut(&name).and_then(|s| s.instance.as_mut()) else {
            return true;
        };

        let token = self.recorder.start_operation(&name, OperationKind::Unload);
        let ok = backend.unload_model().await;
        self.recorder.end_operation(
            token,
            ok,
            None,
            (!ok).then(|| "backend reported unload failure".to_string()),
        );

        tracing::info!(backend = %name, path = ?path, success = ok, "Model unloaded");
        ok
    }

    /// Move to another backend, optionally reloading the current model
    pub async fn switch_backend(&mut self, new_name: &str, reload_model: bool) -> bool {
        if !self.is_available(new_name) {
            tracing::warn!(backend = %new_name, "Cannot switch to unavailable backend");
            return false;
        }

        let previous_path = self.current_model_path.clone();
        self.unload_model().await;

        match previous_path {
            Some(path) if reload_model => self.load_model(&path, Some(new_name)).await.success,
            _ => true,
        }
    }

    /// Unload every instance and drop them; configs and statistics remain
    pub async fn cleanup(&mut self) {
        for (name, slot) in self.slots.iter_mut() {
            if let Some(mut backend) = slot.instance.take() {
                if backend.is_model_loaded() {
                    backend.unload_model().await;
                }
                tracing::debug!(backend = %name, "Backend instance released");
            }
        }
        self.current = None;
        self.current_model_path = None;
    }

    // ─────────────────────────────────────────────────────────────
    // Reporting
    // ─────────────────────────────────────────────────────────────

    pub fn current_backend(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_model_path(&self) -> Option<&Path> {
        self.current_model_path.as_deref()
    }

    /// Current backend, its model path and the backend's model info
    pub fn get_current_backend_info(&self) -> Option<CurrentBackendInfo> {
        let name = self.current.as_deref()?;
        let model_info = self
            .slots
            .get(name)
            .and_then(|slot| slot.instance.as_ref())
            .and_then(|backend| backend.model_info());
        Some(CurrentBackendInfo {
            backend: name.to_string(),
            model_path: self.current_model_path.clone(),
            model_info,
        })
    }

    /// Fresh hardware snapshot
    pub fn get_hardware_info(&self) -> HardwareInfo {
        self.hardware.hardware_info()
    }

    /// Statistics per backend
    pub fn get_statistics(&self) -> BTreeMap<String, BackendStatistics> {
        self.statuses
            .iter()
            .map(|(name, status)| (name.clone(), BackendStatistics::from(status)))
            .collect()
    }

    pub fn get_monitoring_report(&self) -> MonitoringReport {
        MonitoringReport {
            backend_statistics: self.get_statistics(),
            performance_stats: self.recorder.get_backend_stats(),
            system_metrics: self.monitor.sample(),
            hardware_info: self.get_hardware_info(),
            recent_operations: self.recorder.get_recent_metrics(REPORT_RECENT_OPERATIONS),
            current_backend: self.current.clone(),
            current_model_path: self.current_model_path.clone(),
        }
    }

    pub fn recorder(&self) -> &Arc<PerformanceRecorder> {
        &self.recorder
    }

    // ─────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────

    /// Add an event listener
    pub fn subscribe(&mut self, listener: impl EventListener + 'static) {
        self.events.subscribe(listener);
    }

    /// Receive events through an unbounded channel
    pub fn event_channel(&mut self) -> tokio::sync::mpsc::UnboundedReceiver<ManagerEvent> {
        self.events.channel()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendKind, MockBackend, MockConfig, MockCounters};
    use crate::hardware::testing::cuda_gpu;
    use crate::hardware::StaticHardwareProvider;
    use crate::loader::cancel_pair;
    use crate::model::gguf;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    fn provider(info: HardwareInfo) -> SharedHardwareProvider {
        Arc::new(StaticHardwareProvider::new(info))
    }

    fn cpu_box() -> SharedHardwareProvider {
        provider(HardwareInfo::new(Vec::new(), 8, 16384, None))
    }

    fn manager(hardware: SharedHardwareProvider) -> BackendManager {
        BackendManager::new(hardware.clone(), Arc::new(PerformanceRecorder::default()))
    }

    fn add_mock(m: &mut BackendManager, name: &str, mock: MockConfig, gpu: bool) -> MockCounters {
        let config = BackendConfig::new(name, BackendKind::Mock).with_gpu(gpu);
        let backend = MockBackend::with_mock(mock, config, m.hardware.clone());
        let counters = backend.counters();
        m.register_instance(Box::new(backend)).unwrap();
        counters
    }

    fn record_events(m: &mut BackendManager) -> Arc<Mutex<Vec<ManagerEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        m.subscribe(move |e: &ManagerEvent| sink.lock().push(e.clone()));
        seen
    }

    fn assert_ledger_consistent(m: &BackendManager) {
        for (name, stats) in m.get_statistics() {
            assert_eq!(
                stats.success_count + stats.failure_count,
                stats.load_attempts,
                "ledger mismatch for {}",
                name
            );
        }
    }

    #[test]
    fn test_available_backends_in_registration_order() {
        let mut m = manager(cpu_box());
        add_mock(&mut m, "a", MockConfig::default(), false);
        add_mock(&mut m, "b", MockConfig::default(), false);
        add_mock(&mut m, "c", MockConfig::unavailable("not installed"), false);

        assert!(m.get_available_backends().is_empty());
        m.refresh_backend_availability();

        assert_eq!(m.get_available_backends(), vec!["a", "b"]);
        assert_eq!(m.get_status("c").unwrap().error_message.as_deref(), Some("not installed"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut m = manager(cpu_box());
        add_mock(&mut m, "a", MockConfig::default(), false);
        let err = m
            .register_backend(BackendConfig::new("a", BackendKind::Mock))
            .unwrap_err();
        assert!(matches!(err, Error::BackendAlreadyRegistered { .. }));
    }

    #[test]
    fn test_disabled_backend_probes_unavailable() {
        let mut m = manager(cpu_box());
        let config = BackendConfig {
            enabled: false,
            ..BackendConfig::new("off", BackendKind::Mock)
        };
        m.register_backend(config).unwrap();
        m.refresh_backend_availability();

        let status = m.get_status("off").unwrap();
        assert!(!status.available);
        assert_eq!(status.error_message.as_deref(), Some("disabled in configuration"));
    }

    #[test]
    fn test_set_fallback_order_drops_unknown() {
        let mut m = manager(cpu_box());
        add_mock(&mut m, "a", MockConfig::default(), false);
        add_mock(&mut m, "b", MockConfig::default(), false);

        m.set_fallback_order(vec!["b".into(), "ghost".into(), "a".into(), "b".into()]);
        assert_eq!(m.fallback_order(), ["b", "a"]);
    }

    #[test]
    fn test_capacity_scenario() {
        let hw = HardwareInfo::new(vec![cuda_gpu(0, 2048)], 4, 4096, None);
        let mut m = manager(provider(hw));
        add_mock(&mut m, "gpu", MockConfig::default(), true);
        add_mock(&mut m, "cpu", MockConfig::default(), false);

        assert!(!m.can_handle_model_size("gpu", 8192));
        assert!(!m.can_handle_model_size("cpu", 8192));
        // 1500 * 1.2 = 1800 fits 2048 VRAM
        assert!(m.can_handle_model_size("gpu", 1500));
        // 3000 * 1.2 = 3600 fits 4096 RAM but not VRAM
        assert!(m.can_handle_model_size("cpu", 3000));
        assert!(!m.can_handle_model_size("gpu", 3000));
        assert!(!m.can_handle_model_size("ghost", 1));
    }

    #[test]
    fn test_best_backend_respects_preference() {
        let hw = HardwareInfo::new(vec![cuda_gpu(0, 8192)], 8, 16384, Some("none".into()));
        let mut m = manager(provider(hw));
        add_mock(&mut m, "gpu", MockConfig::default(), true);
        add_mock(&mut m, "cpu", MockConfig::default(), false);
        m.refresh_backend_availability();

        assert_eq!(m.get_best_backend(1000, HardwarePreference::Cpu).as_deref(), Some("cpu"));
        assert_eq!(m.get_best_backend(1000, HardwarePreference::Gpu).as_deref(), Some("gpu"));
        assert_eq!(m.get_best_backend(1000, HardwarePreference::Auto).as_deref(), Some("gpu"));

        // too large for VRAM, fits RAM
        assert_eq!(m.get_best_backend(10_000, HardwarePreference::Auto).as_deref(), Some("cpu"));
        assert!(m.get_best_backend(100_000, HardwarePreference::Auto).is_none());
    }

    #[test]
    fn test_best_backend_prefers_recommended_then_fallback_order() {
        let hw = HardwareInfo::new(Vec::new(), 8, 16384, Some("b".into()));
        let mut m = manager(provider(hw));
        add_mock(&mut m, "a", MockConfig::default(), false);
        add_mock(&mut m, "b", MockConfig::default(), false);
        add_mock(&mut m, "c", MockConfig::default(), false);
        m.refresh_backend_availability();

        assert_eq!(m.get_best_backend(100, HardwarePreference::Auto).as_deref(), Some("b"));

        m.hardware = provider(HardwareInfo::new(Vec::new(), 8, 16384, Some("z".into())));
        m.set_fallback_order(vec!["c".into(), "a".into(), "b".into()]);
        assert_eq!(m.get_best_backend(100, HardwarePreference::Auto).as_deref(), Some("c"));
    }

    #[test]
    fn test_best_backend_none_when_nothing_available() {
        let mut m = manager(cpu_box());
        add_mock(&mut m, "a", MockConfig::unavailable("gone"), false);
        m.refresh_backend_availability();
        assert!(m.get_best_backend(1, HardwarePreference::Auto).is_none());
    }

    #[tokio::test]
    async fn test_missing_path_invokes_no_backend() {
        let mut m = manager(cpu_box());
        let counters = add_mock(&mut m, "a", MockConfig::default(), false);
        m.refresh_backend_availability();

        let result = m.load_model(Path::new("/no/such/model.gguf"), None).await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::NotFound));
        assert!(result.error().contains("does not exist"));
        assert_eq!(counters.snapshot().load_model, 0);
        assert_eq!(m.get_status("a").unwrap().load_attempts, 0);
    }

    #[tokio::test]
    async fn test_fallback_to_second_backend() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        add_mock(&mut m, "first", MockConfig::failing("driver crashed"), false);
        add_mock(&mut m, "second", MockConfig::default(), false);
        m.refresh_backend_availability();
        let events = record_events(&mut m);

        let result = m.load_model(&path, None).await;
        assert!(result.success);
        assert_eq!(result.backend_name, "second");
        assert_eq!(m.current_backend(), Some("second"));
        assert_eq!(m.current_model_path(), Some(path.as_path()));

        let fallbacks: Vec<_> = events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ManagerEvent::FallbackTriggered { from, to, error } => {
                    Some((from.clone(), to.clone(), error.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            fallbacks,
            vec![("first".to_string(), "second".to_string(), "driver crashed".to_string())]
        );
        assert!(events.lock().iter().any(|e| matches!(
            e,
            ManagerEvent::BackendChanged { backend, .. } if backend == "second"
        )));

        let stats = m.get_statistics();
        assert_eq!(stats["first"].failure_count, 1);
        assert_eq!(stats["second"].success_count, 1);
        assert_ledger_consistent(&m);
    }

    #[tokio::test]
    async fn test_all_backends_fail() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        add_mock(&mut m, "a", MockConfig::failing("first failure"), false);
        add_mock(&mut m, "b", MockConfig::failing("second failure"), false);
        m.refresh_backend_availability();
        let events = record_events(&mut m);

        let result = m.load_model(&path, None).await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Aggregate));
        let message = result.error().to_lowercase();
        assert!(message.contains("all backends failed"));
        assert!(message.contains("second failure"));
        assert!(m.current_backend().is_none());

        // only one fallback: there is no candidate after the last
        let fallback_count = events
            .lock()
            .iter()
            .filter(|e| matches!(e, ManagerEvent::FallbackTriggered { .. }))
            .count();
        assert_eq!(fallback_count, 1);
        assert_ledger_consistent(&m);
    }

    #[tokio::test]
    async fn test_named_backend_must_be_available() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        let counters = add_mock(&mut m, "off", MockConfig::unavailable("not installed"), false);
        m.refresh_backend_availability();

        let result = m.load_model(&path, Some("off")).await;
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Unavailable));
        assert!(result.error().contains("not available"));
        assert_eq!(counters.snapshot().load_model, 0);

        let result = m.load_model(&path, Some("ghost")).await;
        assert_eq!(result.failure, Some(FailureKind::Unavailable));
    }

    #[tokio::test]
    async fn test_named_backend_failure_is_not_aggregated() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        add_mock(&mut m, "a", MockConfig::failing("nope"), false);
        let b = add_mock(&mut m, "b", MockConfig::default(), false);
        m.refresh_backend_availability();

        let result = m.load_model(&path, Some("a")).await;
        assert_eq!(result.failure, Some(FailureKind::Backend));
        assert_eq!(result.error(), "nope");
        assert_eq!(b.snapshot().load_model, 0);
    }

    #[tokio::test]
    async fn test_load_then_unload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        let counters = add_mock(&mut m, "x", MockConfig::default(), false);
        m.refresh_backend_availability();

        assert!(m.load_model(&path, Some("x")).await.success);
        let info = m.get_current_backend_info().unwrap();
        assert_eq!(info.backend, "x");
        assert_eq!(info.model_path.as_deref(), Some(path.as_path()));
        assert_eq!(info.model_info.unwrap().model_type, "llama");
        assert!(m.unload_model().await);

        assert!(m.current_backend().is_none());
        assert!(m.current_model_path().is_none());
        assert!(m.get_current_backend_info().is_none());
        assert_eq!(m.get_status("x").unwrap().load_attempts, 1);
        assert_eq!(counters.snapshot().unload_model, 1);
    }

    #[tokio::test]
    async fn test_unload_with_nothing_loaded() {
        let mut m = manager(cpu_box());
        let counters = add_mock(&mut m, "x", MockConfig::default(), false);
        m.refresh_backend_availability();

        assert!(m.unload_model().await);
        assert_eq!(counters.snapshot().unload_model, 0);
    }

    #[tokio::test]
    async fn test_new_load_unloads_previous() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        let a = add_mock(&mut m, "a", MockConfig::default(), false);
        add_mock(&mut m, "b", MockConfig::default(), false);
        m.refresh_backend_availability();

        assert!(m.load_model(&path, Some("a")).await.success);
        assert!(m.load_model(&path, Some("b")).await.success);
        assert_eq!(a.snapshot().unload_model, 1);
        assert_eq!(m.current_backend(), Some("b"));
    }

    #[tokio::test]
    async fn test_switch_to_unavailable_keeps_current() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        add_mock(&mut m, "a", MockConfig::default(), false);
        add_mock(&mut m, "down", MockConfig::unavailable("not installed"), false);
        m.refresh_backend_availability();

        assert!(m.load_model(&path, Some("a")).await.success);
        assert!(!m.switch_backend("down", true).await);
        assert_eq!(m.current_backend(), Some("a"));
    }

    #[tokio::test]
    async fn test_switch_with_and_without_reload() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        add_mock(&mut m, "a", MockConfig::default(), false);
        let b = add_mock(&mut m, "b", MockConfig::default(), false);
        m.refresh_backend_availability();

        assert!(m.load_model(&path, Some("a")).await.success);
        assert!(m.switch_backend("b", true).await);
        assert_eq!(m.current_backend(), Some("b"));
        assert_eq!(m.current_model_path(), Some(path.as_path()));

        assert!(m.switch_backend("a", false).await);
        assert!(m.current_backend().is_none());
        assert_eq!(b.snapshot().unload_model, 1);
    }

    #[tokio::test]
    async fn test_generate_requires_current_backend() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        add_mock(
            &mut m,
            "a",
            MockConfig {
                fixed_response: Some("pong".into()),
                ..Default::default()
            },
            false,
        );
        m.refresh_backend_availability();

        let err = m.generate_text("ping", &GenerationConfig::default()).await.unwrap_err();
        assert!(matches!(err, Error::NoModelLoaded));

        assert!(m.load_model(&path, None).await.success);
        let text = m.generate_text("ping", &GenerationConfig::default()).await.unwrap();
        assert_eq!(text, "pong");
        assert_eq!(m.recorder().get_backend_stats()["a"].generations, 1);
    }

    #[tokio::test]
    async fn test_cancel_before_attempt() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        let counters = add_mock(&mut m, "a", MockConfig::default(), false);
        m.refresh_backend_availability();

        let (handle, token) = cancel_pair();
        handle.cancel();

        let result = m.load_model_with_cancel(&path, None, &token).await;
        assert_eq!(result.failure, Some(FailureKind::Cancelled));
        assert!(m.current_backend().is_none());
        assert_eq!(counters.snapshot().load_model, 0);
    }

    #[tokio::test]
    async fn test_cancelled_load_keeps_resident_model() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        let a = add_mock(&mut m, "a", MockConfig::default(), false);
        let b = add_mock(&mut m, "b", MockConfig::default(), false);
        m.refresh_backend_availability();
        assert!(m.load_model(&path, Some("a")).await.success);

        let (handle, token) = cancel_pair();
        handle.cancel();
        let result = m.load_model_with_cancel(&path, Some("b"), &token).await;

        assert_eq!(result.failure, Some(FailureKind::Cancelled));
        assert_eq!(m.current_backend(), Some("a"));
        assert_eq!(m.current_model_path(), Some(path.as_path()));
        assert_eq!(a.snapshot().unload_model, 0);
        assert_eq!(b.snapshot().load_model, 0);
    }

    #[tokio::test]
    async fn test_statistics_recorded_before_fallback_event() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        add_mock(&mut m, "first", MockConfig::failing("driver crashed"), false);
        add_mock(&mut m, "second", MockConfig::default(), false);
        m.refresh_backend_availability();

        // failed operations for `from` as seen at the moment the event arrives
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let recorder = m.recorder().clone();
        m.subscribe(move |e: &ManagerEvent| {
            if let ManagerEvent::FallbackTriggered { from, .. } = e {
                let stats = recorder.get_backend_stats();
                let failed = stats.get(from).map(|s| s.failed_operations).unwrap_or(0);
                let last = recorder.get_recent_metrics(1).first().map(|op| (op.backend.clone(), op.success));
                sink.lock().push((from.clone(), failed, last));
            }
        });

        assert!(m.load_model(&path, None).await.success);
        assert_eq!(
            *seen.lock(),
            vec![("first".to_string(), 1, Some(("first".to_string(), false)))]
        );
        assert_eq!(m.get_statistics()["first"].failure_count, 1);
    }

    #[test]
    fn test_selection_pool_matches_load_options() {
        // offload disabled by layer count: sized against RAM
        let hw = HardwareInfo::new(vec![cuda_gpu(0, 1024)], 4, 8192, None);
        let mut m = manager(provider(hw.clone()));
        let config = BackendConfig {
            gpu_layers: 0,
            ..BackendConfig::new("no_layers", BackendKind::Mock).with_gpu(true)
        };
        m.register_backend(config.clone()).unwrap();
        assert!(m.can_handle_model_size("no_layers", 4000));
        let optimal = crate::hardware::OptimalSettings::for_hardware(&hw, 4);
        assert!(!LoadOptions::resolve(&config, &optimal, hw, 1.2).use_gpu);

        // a declared GPU without VRAM: sized against RAM as well
        let zero_vram = HardwareInfo::new(vec![cuda_gpu(0, 0)], 4, 8192, None);
        let mut m = manager(provider(zero_vram));
        add_mock(&mut m, "gpu", MockConfig::default(), true);
        assert!(m.can_handle_model_size("gpu", 4000));
    }

    #[tokio::test]
    async fn test_zero_vram_gpu_loads_from_ram() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(provider(HardwareInfo::new(vec![cuda_gpu(0, 0)], 4, 8192, None)));
        add_mock(&mut m, "gpu", MockConfig::default(), true);
        m.refresh_backend_availability();

        assert_eq!(m.get_best_backend(0, HardwarePreference::Auto).as_deref(), Some("gpu"));
        let result = m.load_model(&path, None).await;
        assert!(result.success, "{}", result.error());
        assert_eq!(result.hardware_used, "cpu");
    }

    #[tokio::test]
    async fn test_cleanup_releases_instances() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        let counters = add_mock(&mut m, "a", MockConfig::default(), false);
        m.refresh_backend_availability();
        assert!(m.load_model(&path, None).await.success);

        m.cleanup().await;
        assert!(m.current_backend().is_none());
        assert_eq!(counters.snapshot().unload_model, 1);
        assert_eq!(m.get_statistics()["a"].load_attempts, 1);
    }

    #[tokio::test]
    async fn test_monitoring_report() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let mut m = manager(cpu_box());
        add_mock(&mut m, "a", MockConfig::default(), false);
        m.refresh_backend_availability();
        assert!(m.load_model(&path, None).await.success);

        let report = m.get_monitoring_report();
        assert_eq!(report.current_backend.as_deref(), Some("a"));
        assert_eq!(report.recent_operations.len(), 1);
        assert_eq!(report.performance_stats["a"].loads, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["backend_statistics"]["a"]["success_count"], 1);
        assert!(json["system_metrics"].get("system").is_some());
    }

    #[test]
    fn test_hardware_preference_parse() {
        assert_eq!("GPU".parse::<HardwarePreference>().unwrap(), HardwarePreference::Gpu);
        assert_eq!("auto".parse::<HardwarePreference>().unwrap(), HardwarePreference::Auto);
        assert!("tpu".parse::<HardwarePreference>().is_err());
    }
}
