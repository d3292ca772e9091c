//! Background load task
//!
//! A single-shot, cancellable load of one model file. The task runs on the
//! tokio runtime and reports back only through its state watch channel and
//! its event stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendManager, FailureKind, LoadingResult};
use crate::error::{Error, Result};
use crate::model::{self, gguf};
use crate::types::{LoadedModelSummary, ModelMetadata};

use super::cancel::{cancel_pair, CancelHandle, CancelToken};

/// Manager shared between the caller and load tasks
pub type SharedManager = Arc<Mutex<BackendManager>>;

/// Buffered events per task
const EVENT_BUFFER: usize = 16;

// ─────────────────────────────────────────────────────────────────
// State & Events
// ─────────────────────────────────────────────────────────────────

/// Lifecycle of a load task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadTaskState {
    Created,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl LoadTaskState {
    /// No further transitions happen from a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoadTaskState::Succeeded | LoadTaskState::Failed | LoadTaskState::Cancelled
        )
    }
}

impl std::fmt::Display for LoadTaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoadTaskState::Created => "created",
            LoadTaskState::Running => "running",
            LoadTaskState::Succeeded => "succeeded",
            LoadTaskState::Failed => "failed",
            LoadTaskState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// What a running task reports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoadEvent {
    Progress { message: String, percent: u8 },
    Loaded { summary: Box<LoadedModelSummary> },
    Failed { message: String },
    Cancelled,
}

// ─────────────────────────────────────────────────────────────────
// Load Task
// ─────────────────────────────────────────────────────────────────

/// A load that has not been started yet
pub struct LoadTask {
    id: Uuid,
    path: PathBuf,
    backend: Option<String>,
    manager: SharedManager,
}

impl LoadTask {
    /// Create a task that lets the manager pick the backend
    pub fn new(path: impl Into<PathBuf>, manager: SharedManager) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            backend: None,
            manager,
        }
    }

    /// Pin the load to one backend
    pub fn with_backend(mut self, name: impl Into<String>) -> Self {
        self.backend = Some(name.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> LoadTaskState {
        LoadTaskState::Created
    }

    /// Start the task on the tokio runtime
    pub fn spawn(self) -> LoadTaskHandle {
        let (state_tx, state_rx) = watch::channel(LoadTaskState::Created);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (cancel, token) = cancel_pair();
        let id = self.id;

        let join = tokio::spawn(async move {
            let run = TaskRun {
                id: self.id,
                state: state_tx,
                events: event_tx,
                cancel: token,
            };
            run.execute(&self.path, self.backend.as_deref(), &self.manager).await
        });

        LoadTaskHandle {
            id,
            state: state_rx,
            events: event_rx,
            cancel,
            join,
        }
    }
}

/// Caller side of a spawned load task
pub struct LoadTaskHandle {
    pub id: Uuid,
    pub state: watch::Receiver<LoadTaskState>,
    pub events: mpsc::Receiver<LoadEvent>,
    pub cancel: CancelHandle,
    pub join: JoinHandle<Result<LoadedModelSummary>>,
}

impl LoadTaskHandle {
    /// Current state
    pub fn state(&self) -> LoadTaskState {
        *self.state.borrow()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next event; `None` once the task has finished and the stream is drained
    pub async fn next_event(&mut self) -> Option<LoadEvent> {
        self.events.recv().await
    }

    /// Wait for the task to finish
    pub async fn wait(self) -> Result<LoadedModelSummary> {
        self.join
            .await
            .map_err(|e| Error::Internal(format!("Load task panicked: {}", e)))?
    }
}

// ─────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────

struct TaskRun {
    id: Uuid,
    state: watch::Sender<LoadTaskState>,
    events: mpsc::Sender<LoadEvent>,
    cancel: CancelToken,
}

impl TaskRun {
    async fn execute(
        &self,
        path: &Path,
        backend: Option<&str>,
        manager: &SharedManager,
    ) -> Result<LoadedModelSummary> {
        self.state.send_replace(LoadTaskState::Running);
        info!(task_id = %self.id, path = %path.display(), backend = ?backend, "Load task started");

        let outcome = self.run_steps(path, backend, manager).await;

        match &outcome {
            Ok(summary) => {
                info!(task_id = %self.id, backend = %summary.backend, model = %summary.name, "Load task succeeded");
                self.state.send_replace(LoadTaskState::Succeeded);
                self.emit(LoadEvent::Loaded {
                    summary: Box::new(summary.clone()),
                })
                .await;
            }
            Err(Error::Cancelled(_)) => {
                info!(task_id = %self.id, "Load task cancelled");
                self.state.send_replace(LoadTaskState::Cancelled);
                self.emit(LoadEvent::Cancelled).await;
            }
            Err(e) => {
                warn!(task_id = %self.id, error = %e, "Load task failed");
                self.state.send_replace(LoadTaskState::Failed);
                self.emit(LoadEvent::Failed { message: e.to_string() }).await;
            }
        }
        outcome
    }

    async fn run_steps(
        &self,
        path: &Path,
        backend: Option<&str>,
        manager: &SharedManager,
    ) -> Result<LoadedModelSummary> {
        // (a) existence
        self.progress("Checking model file", 10).await;
        let file_size = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                return Err(Error::ModelNotFound {
                    path: path.to_path_buf(),
                })
            }
        };
        self.check_cancelled()?;

        // (b) structure
        self.progress("Validating model header", 30).await;
        let owned = path.to_path_buf();
        let version = blocking(move || gguf::check_magic(&owned)).await?;
        debug!(task_id = %self.id, version, "Header magic accepted");
        self.check_cancelled()?;

        // (c) metadata
        self.progress("Reading model metadata", 50).await;
        let owned = path.to_path_buf();
        let metadata = blocking(move || gguf::read_metadata(&owned)).await?;
        self.check_cancelled()?;

        // (d) backend
        self.progress("Loading model on backend", 90).await;
        let mut guard = manager.lock().await;
        let result = guard.load_model_with_cancel(path, backend, &self.cancel).await;

        if !result.success {
            return Err(failure_to_error(path, result));
        }

        if self.cancel.is_cancelled() {
            guard.unload_model().await;
            return Err(Error::Cancelled("Load cancelled".into()));
        }
        drop(guard);

        Ok(summarize(path, file_size, metadata, result))
    }

    async fn progress(&self, message: &str, percent: u8) {
        debug!(task_id = %self.id, percent, "{}", message);
        self.emit(LoadEvent::Progress {
            message: message.to_string(),
            percent,
        })
        .await;
    }

    async fn emit(&self, event: LoadEvent) {
        // the caller may have dropped the receiver
        let _ = self.events.send(event).await;
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled("Load cancelled".into()))
        } else {
            Ok(())
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("Blocking task failed: {}", e)))?
}

fn failure_to_error(path: &Path, result: LoadingResult) -> Error {
    let message = result.error().to_string();
    match result.failure {
        Some(FailureKind::NotFound) => Error::ModelNotFound {
            path: path.to_path_buf(),
        },
        Some(FailureKind::Cancelled) => Error::Cancelled(message),
        Some(FailureKind::Unavailable) => Error::BackendUnavailable {
            name: result.backend_name,
            reason: message,
        },
        _ => Error::LoadFailed {
            backend: result.backend_name,
            message,
        },
    }
}

fn summarize(path: &Path, file_size: u64, metadata: ModelMetadata, result: LoadingResult) -> LoadedModelSummary {
    let identity = model::identify(path, file_size, &metadata);
    LoadedModelSummary {
        id: identity.id,
        name: identity.name,
        file_path: path.to_path_buf(),
        file_size_mb: model::size_mb(file_size),
        fingerprint: identity.fingerprint,
        backend: result.backend_name,
        hardware_used: result.hardware_used,
        metadata,
        model_info: result.model_info,
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
