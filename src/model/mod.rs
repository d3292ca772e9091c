//! Model file handling
//!
//! Validates on-disk model files and derives a stable identity for them.
//! Backends run their own loaders on top of this; nothing here reads
//! tensor data.

pub mod gguf;

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::types::ModelMetadata;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// File size in MB, rounded up so a non-empty file never reports 0
pub fn size_mb(bytes: u64) -> u64 {
    bytes.div_ceil(BYTES_PER_MB)
}

/// Identity of a model file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelIdentity {
    /// File stem
    pub id: String,
    /// `general.name` from metadata, else the file stem
    pub name: String,
    /// First 16 hex chars of a SHA-256 over path, size and header fields
    pub fingerprint: String,
}

/// Derive the identity of a validated model file
pub fn identify(path: &Path, file_size: u64, metadata: &ModelMetadata) -> ModelIdentity {
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model")
        .to_string();

    let name = metadata.name.clone().unwrap_or_else(|| id.clone());

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    hasher.update(file_size.to_le_bytes());
    hasher.update(metadata.gguf_version.to_le_bytes());
    hasher.update(metadata.tensor_count.to_le_bytes());
    hasher.update(metadata.kv_count.to_le_bytes());
    if let Some(ref arch) = metadata.architecture {
        hasher.update(arch.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());

    ModelIdentity {
        id,
        name,
        fingerprint: digest[..16].to_string(),
    }
}
