//! Subprocess runtime for executable-driven backends
//!
//! The llama.cpp and llamafile variants share everything except the
//! executable they launch and a few leading arguments. Each generation
//! spawns the runtime once, collects stdout and cuts it at the first stop
//! sequence.

use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;

use crate::error::{Error, Result};
use crate::hardware::{HardwareInfo, SharedHardwareProvider};
use crate::types::{GenerationConfig, ModelInfo};

use super::preflight::{self, LoadedModel};
use super::{Availability, BackendConfig, LoadOptions, LoadingResult, ModelBackend};

// ─────────────────────────────────────────────────────────────────
// Runtime Description
// ─────────────────────────────────────────────────────────────────

/// How to launch one runtime family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Runtime {
    /// Executable looked up on PATH when the config has no override
    pub executable: &'static str,

    /// Arguments placed before the model and sampling flags
    pub leading_args: &'static [&'static str],
}

// ─────────────────────────────────────────────────────────────────
// Executable Lookup
// ─────────────────────────────────────────────────────────────────

/// Resolve an executable name or path
///
/// Values containing a path separator are checked directly; bare names are
/// searched for on `PATH`.
pub fn find_executable(program: &Path) -> Option<PathBuf> {
    find_executable_in(program, std::env::var_os("PATH").as_deref())
}

fn find_executable_in(program: &Path, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }

    let path_var = path_var?;
    std::env::split_paths(path_var).find_map(|dir| {
        let direct = dir.join(program);
        if direct.is_file() {
            return Some(direct);
        }

        #[cfg(windows)]
        {
            let with_ext = dir.join(format!("{}.exe", program.display()));
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }

        None
    })
}

// ─────────────────────────────────────────────────────────────────
// Argument Building
// ─────────────────────────────────────────────────────────────────

/// Command-line arguments for one generation
pub fn generation_args(
    runtime: &Runtime,
    model: &LoadedModel,
    prompt: &str,
    config: &GenerationConfig,
) -> Vec<String> {
    let mut args: Vec<String> = runtime.leading_args.iter().map(|a| a.to_string()).collect();

    args.extend([
        "-m".to_string(),
        model.path.display().to_string(),
        "-p".to_string(),
        prompt.to_string(),
        "-n".to_string(),
        config.max_tokens.to_string(),
        "--temp".to_string(),
        config.temperature.to_string(),
        "--top-p".to_string(),
        config.top_p.to_string(),
        "--top-k".to_string(),
        config.top_k.to_string(),
        "--repeat-penalty".to_string(),
        config.repeat_penalty.to_string(),
        "-c".to_string(),
        model.context_size.to_string(),
        "-b".to_string(),
        model.batch_size.to_string(),
        "-t".to_string(),
        model.threads.to_string(),
        "-ngl".to_string(),
        model.gpu_layers.to_string(),
    ]);

    if let Some(seed) = config.seed {
        args.push("-s".to_string());
        args.push(seed.to_string());
    }

    args
}

// ─────────────────────────────────────────────────────────────────
// Process Backend
// ─────────────────────────────────────────────────────────────────

/// Backend driving an external inference runtime
pub struct ProcessBackend {
    runtime: Runtime,
    config: BackendConfig,
    hardware: SharedHardwareProvider,
    loaded: Option<LoadedModel>,
}

impl ProcessBackend {
    /// Create a backend for a runtime family
    pub fn new(runtime: Runtime, config: BackendConfig, hardware: SharedHardwareProvider) -> Self {
        Self {
            runtime,
            config,
            hardware,
            loaded: None,
        }
    }

    /// Executable this backend launches (override or PATH name)
    pub fn program(&self) -> PathBuf {
        self.config
            .executable
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.runtime.executable))
    }

    /// Runtime family
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}

#[async_trait]
impl ModelBackend for ProcessBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn is_available(&self) -> Availability {
        match find_executable(&self.program()) {
            Some(_) => Availability::available(),
            None => Availability::unavailable(format!(
                "{} executable not found",
                self.program().display()
            )),
        }
    }

    async fn load_model(&mut self, path: &Path, options: &LoadOptions) -> LoadingResult {
        let start = Instant::now();

        if find_executable(&self.program()).is_none() {
            return LoadingResult::failure(
                &self.config.name,
                super::FailureKind::Unavailable,
                format!("{} executable not found", self.program().display()),
            );
        }

        let loaded = match preflight::check(path, options).await {
            Ok(loaded) => loaded,
            Err(rejection) => {
                tracing::warn!(backend = %self.config.name, error = %rejection.message, "Load rejected");
                return rejection
                    .into_result(&self.config.name)
                    .with_load_time(start.elapsed().as_secs_f64());
            }
        };

        let info = loaded.model_info();
        let hardware_used = loaded.hardware_used.clone();
        let memory = loaded.required_mb;

        tracing::info!(
            backend = %self.config.name,
            path = %path.display(),
            hardware = %hardware_used,
            gpu_layers = loaded.gpu_layers,
            "Model loaded"
        );

        self.loaded = Some(loaded);
        LoadingResult::success(
            &self.config.name,
            hardware_used,
            start.elapsed().as_secs_f64(),
            Some(memory),
            info,
        )
    }

    async fn generate_text(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let model = self.loaded.as_ref().ok_or(Error::NoModelLoaded)?;
        let program = find_executable(&self.program()).ok_or_else(|| Error::BackendUnavailable {
            name: self.config.name.clone(),
            reason: format!("{} executable not found", self.program().display()),
        })?;

        let args = generation_args(&self.runtime, model, prompt, config);
        tracing::debug!(backend = %self.config.name, program = %program.display(), "Spawning runtime");

        let output = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::generation_failed(&self.config.name, format!("failed to spawn {}: {}", program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no output");
            return Err(Error::generation_failed(
                &self.config.name,
                format!("runtime exited with {}: {}", output.status, detail.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(config.truncate_at_stop(&stdout).trim().to_string())
    }

    async fn unload_model(&mut self) -> bool {
        if let Some(model) = self.loaded.take() {
            tracing::info!(backend = %self.config.name, path = %model.path.display(), "Model unloaded");
        }
        true
    }

    fn hardware_info(&self) -> HardwareInfo {
        let info = self.hardware.hardware_info();
        if self.config.gpu_enabled {
            info
        } else {
            info.cpu_only()
        }
    }

    fn model_info(&self) -> Option<ModelInfo> {
        self.loaded.as_ref().map(|m| m.model_info())
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
