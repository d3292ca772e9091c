//! Load preflight shared by every backend variant
//!
//! Runs before any backend-specific work: the file must exist, its GGUF
//! header must parse, and the estimated footprint must fit the capacity of
//! the hardware the load will use.

use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::hardware::HardwareType;
use crate::model::{self, gguf};
use crate::types::{ModelInfo, ModelMetadata};

use super::{FailureKind, LoadOptions, LoadingResult};

/// Offload count passed to runtimes when the layer count is unknown
const OFFLOAD_ALL: u32 = 999;

/// A preflight failure, converted to a failure result by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub kind: FailureKind,
    pub message: String,
}

impl Rejection {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure result for the named backend
    pub fn into_result(self, backend: &str) -> LoadingResult {
        LoadingResult::failure(backend, self.kind, self.message)
    }
}

/// A model that passed preflight and is ready to hand to a runtime
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel {
    pub path: PathBuf,
    pub metadata: ModelMetadata,
    pub file_size_mb: u64,
    /// Estimated footprint (MB)
    pub required_mb: u64,
    /// "cpu" or the accelerator offloaded to
    pub hardware_used: String,
    /// Layers actually offloaded
    pub gpu_layers: u32,
    pub context_size: u32,
    pub batch_size: u32,
    pub threads: u32,
}

impl LoadedModel {
    /// Structured info reported after a successful load
    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_type: self
                .metadata
                .architecture
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            context_length: self.context_size,
            gpu_layers: self.gpu_layers,
            file_size_mb: self.file_size_mb,
            quantization: self.metadata.quantization,
        }
    }
}

/// Run the shared checks for a load attempt
pub async fn check(path: &Path, options: &LoadOptions) -> Result<LoadedModel, Rejection> {
    let file_meta = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        _ => {
            return Err(Rejection::new(
                FailureKind::NotFound,
                Error::ModelNotFound { path: path.to_path_buf() }.to_string(),
            ))
        }
    };

    let owned = path.to_path_buf();
    let metadata = tokio::task::spawn_blocking(move || gguf::read_metadata(&owned))
        .await
        .map_err(|e| Rejection::new(FailureKind::Backend, format!("Metadata reader panicked: {}", e)))?
        .map_err(|e| Rejection::new(FailureKind::Validation, e.to_string()))?;

    let file_size_mb = model::size_mb(file_meta.len());
    let required_mb = (file_size_mb as f64 * options.memory_overhead_factor).ceil() as u64;

    let (capacity_mb, pool) = if options.use_gpu {
        (options.hardware.total_vram_mb, "VRAM")
    } else {
        (options.hardware.total_ram_mb, "RAM")
    };

    if required_mb > capacity_mb {
        return Err(Rejection::new(
            FailureKind::Capacity,
            format!(
                "Insufficient memory: model needs ~{}MB but only {}MB {} is available",
                required_mb, capacity_mb, pool
            ),
        ));
    }

    let (hardware_used, gpu_layers) = if options.use_gpu {
        let accelerator = options
            .hardware
            .best_accelerator()
            .unwrap_or(HardwareType::Cpu);
        let layers = if options.gpu_layers < 0 {
            metadata.offloadable_layers().unwrap_or(OFFLOAD_ALL)
        } else {
            options.gpu_layers as u32
        };
        (accelerator.as_str().to_string(), layers)
    } else {
        (HardwareType::Cpu.as_str().to_string(), 0)
    };

    tracing::debug!(
        path = %path.display(),
        file_size_mb,
        required_mb,
        hardware = %hardware_used,
        gpu_layers,
        "Preflight passed"
    );

    Ok(LoadedModel {
        path: path.to_path_buf(),
        metadata,
        file_size_mb,
        required_mb,
        hardware_used,
        gpu_layers,
        context_size: options.context_size,
        batch_size: options.batch_size,
        threads: options.threads,
    })
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::testing::cuda_gpu;
    use crate::hardware::HardwareInfo;
    use tempfile::TempDir;

    fn options(hardware: HardwareInfo, use_gpu: bool, factor: f64) -> LoadOptions {
        LoadOptions {
            gpu_layers: if use_gpu { -1 } else { 0 },
            context_size: 2048,
            batch_size: 512,
            threads: 4,
            use_gpu,
            memory_overhead_factor: factor,
            hardware,
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let opts = options(HardwareInfo::new(Vec::new(), 4, 8192, None), false, 1.2);
        let err = check(Path::new("/definitely/not/here.gguf"), &opts).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::NotFound);
        assert!(err.message.contains("does not exist"));
    }

    #[tokio::test]
    async fn test_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let opts = options(HardwareInfo::new(Vec::new(), 4, 8192, None), false, 1.2);
        let err = check(dir.path(), &opts).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::NotFound);
    }

    #[tokio::test]
    async fn test_bad_header_is_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.gguf");
        std::fs::write(&path, b"not a gguf file at all").unwrap();

        let opts = options(HardwareInfo::new(Vec::new(), 4, 8192, None), false, 1.2);
        let err = check(&path, &opts).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Validation);
        assert!(err.message.starts_with("Invalid GGUF file"));
    }

    #[tokio::test]
    async fn test_cpu_load_uses_ram() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let opts = options(HardwareInfo::new(Vec::new(), 4, 8192, None), false, 1.2);
        let loaded = check(&path, &opts).await.unwrap();
        assert_eq!(loaded.hardware_used, "cpu");
        assert_eq!(loaded.gpu_layers, 0);
        assert_eq!(loaded.file_size_mb, 1);
        assert_eq!(loaded.required_mb, 2);
        assert_eq!(loaded.model_info().model_type, "llama");
    }

    #[tokio::test]
    async fn test_gpu_load_resolves_all_layers() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let hw = HardwareInfo::new(vec![cuda_gpu(0, 8192)], 8, 16384, None);
        let loaded = check(&path, &options(hw, true, 1.2)).await.unwrap();
        assert_eq!(loaded.hardware_used, "cuda");
        // four blocks plus the output layer
        assert_eq!(loaded.gpu_layers, 5);
    }

    #[tokio::test]
    async fn test_capacity_rejection() {
        let dir = TempDir::new().unwrap();
        let path = gguf::testing::write_model(dir.path(), "m.gguf");

        let opts = options(HardwareInfo::new(Vec::new(), 4, 1, None), false, 1.2);
        let err = check(&path, &opts).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Capacity);
        assert!(err.message.starts_with("Insufficient memory"));
    }
}
