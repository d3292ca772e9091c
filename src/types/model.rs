//! Model type definitions
//!
//! Defines model metadata, quantization, and the structured info that
//! backends report after a successful load.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────
// Quantization
// ─────────────────────────────────────────────────────────────────

/// Quantization type for GGUF models
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantizationType {
    /// Full precision (F32)
    F32,
    /// Half precision (F16)
    F16,
    /// Brain float (BF16)
    BF16,
    /// 8-bit quantization
    Q8_0,
    /// 6-bit quantization
    Q6_K,
    /// 5-bit quantization
    Q5_0,
    Q5_1,
    Q5_K_M,
    Q5_K_S,
    /// 4-bit quantization (K-quants)
    Q4_K_M,
    Q4_K_S,
    /// 4-bit quantization (legacy)
    Q4_0,
    Q4_1,
    /// 3-bit quantization
    Q3_K_M,
    Q3_K_S,
    Q3_K_L,
    /// 2-bit quantization
    Q2_K,
    /// Unknown quantization
    Unknown,
}

impl QuantizationType {
    /// Get approximate bits per weight
    pub fn bits_per_weight(&self) -> f32 {
        match self {
            QuantizationType::F32 => 32.0,
            QuantizationType::F16 | QuantizationType::BF16 => 16.0,
            QuantizationType::Q8_0 => 8.0,
            QuantizationType::Q6_K => 6.5,
            QuantizationType::Q5_0 | QuantizationType::Q5_1 => 5.0,
            QuantizationType::Q5_K_M | QuantizationType::Q5_K_S => 5.5,
            QuantizationType::Q4_K_M | QuantizationType::Q4_K_S => 4.5,
            QuantizationType::Q4_0 | QuantizationType::Q4_1 => 4.0,
            QuantizationType::Q3_K_M | QuantizationType::Q3_K_S | QuantizationType::Q3_K_L => 3.5,
            QuantizationType::Q2_K => 2.5,
            QuantizationType::Unknown => 4.0,
        }
    }

    /// Map the `general.file_type` id written by llama.cpp converters
    pub fn from_file_type(id: u32) -> Self {
        match id {
            0 => QuantizationType::F32,
            1 => QuantizationType::F16,
            2 => QuantizationType::Q4_0,
            3 => QuantizationType::Q4_1,
            7 => QuantizationType::Q8_0,
            8 => QuantizationType::Q5_0,
            9 => QuantizationType::Q5_1,
            10 => QuantizationType::Q2_K,
            11 => QuantizationType::Q3_K_S,
            12 => QuantizationType::Q3_K_M,
            13 => QuantizationType::Q3_K_L,
            14 => QuantizationType::Q4_K_S,
            15 => QuantizationType::Q4_K_M,
            16 => QuantizationType::Q5_K_S,
            17 => QuantizationType::Q5_K_M,
            18 => QuantizationType::Q6_K,
            32 => QuantizationType::BF16,
            _ => QuantizationType::Unknown,
        }
    }

    /// Display name as used in model file names
    pub fn name(&self) -> &'static str {
        match self {
            QuantizationType::F32 => "F32",
            QuantizationType::F16 => "F16",
            QuantizationType::BF16 => "BF16",
            QuantizationType::Q8_0 => "Q8_0",
            QuantizationType::Q6_K => "Q6_K",
            QuantizationType::Q5_0 => "Q5_0",
            QuantizationType::Q5_1 => "Q5_1",
            QuantizationType::Q5_K_M => "Q5_K_M",
            QuantizationType::Q5_K_S => "Q5_K_S",
            QuantizationType::Q4_K_M => "Q4_K_M",
            QuantizationType::Q4_K_S => "Q4_K_S",
            QuantizationType::Q4_0 => "Q4_0",
            QuantizationType::Q4_1 => "Q4_1",
            QuantizationType::Q3_K_M => "Q3_K_M",
            QuantizationType::Q3_K_S => "Q3_K_S",
            QuantizationType::Q3_K_L => "Q3_K_L",
            QuantizationType::Q2_K => "Q2_K",
            QuantizationType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for QuantizationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ─────────────────────────────────────────────────────────────────
// Model Metadata (from GGUF)
// ─────────────────────────────────────────────────────────────────

/// Metadata extracted from a GGUF model header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// GGUF container version
    pub gguf_version: u32,

    /// Number of tensors declared in the header
    pub tensor_count: u64,

    /// Number of key/value metadata entries
    pub kv_count: u64,

    /// General architecture (e.g. "llama", "qwen2")
    #[serde(default)]
    pub architecture: Option<String>,

    /// Model name from metadata
    #[serde(default)]
    pub name: Option<String>,

    /// Quantization derived from `general.file_type`
    #[serde(default)]
    pub quantization: Option<QuantizationType>,

    /// Trained context length
    #[serde(default)]
    pub context_length: Option<u32>,

    /// Embedding length
    #[serde(default)]
    pub embedding_length: Option<u32>,

    /// Number of attention heads
    #[serde(default)]
    pub head_count: Option<u32>,

    /// Number of transformer blocks
    #[serde(default)]
    pub block_count: Option<u32>,
}

impl ModelMetadata {
    /// Layers a full GPU offload covers (blocks plus the output layer)
    pub fn offloadable_layers(&self) -> Option<u32> {
        self.block_count.map(|b| b + 1)
    }
}

// ─────────────────────────────────────────────────────────────────
// Loaded Model Info
// ─────────────────────────────────────────────────────────────────

/// Structured info a backend reports for a resident model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model type (architecture), e.g. "llama"
    pub model_type: String,

    /// Context window the model was loaded with
    pub context_length: u32,

    /// GPU layers actually applied (0 = CPU only)
    pub gpu_layers: u32,

    /// Model file size (MB)
    pub file_size_mb: u64,

    /// Quantization, when known
    #[serde(default)]
    pub quantization: Option<QuantizationType>,
}

/// Summary of a model loaded through a load task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedModelSummary {
    /// Model identifier (file stem)
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Model file path
    pub file_path: PathBuf,

    /// File size (MB)
    pub file_size_mb: u64,

    /// Short content fingerprint
    pub fingerprint: String,

    /// Backend holding the model
    pub backend: String,

    /// Hardware used ("cpu", "cuda", ...)
    pub hardware_used: String,

    /// Parsed header metadata
    pub metadata: ModelMetadata,

    /// Backend-reported info
    #[serde(default)]
    pub model_info: Option<ModelInfo>,
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
