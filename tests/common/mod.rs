//! Common test utilities and fixtures
//!
//! Writes small GGUF files and configuration files into temp directories.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use tempfile::TempDir;

const GGUF_STRING: u32 = 8;
const GGUF_UINT32: u32 = 4;

/// Builder for a GGUF version 3 header with scalar metadata
pub struct GgufFixture {
    kv: Vec<(String, Value)>,
    padding_bytes: usize,
}

enum Value {
    U32(u32),
    Str(String),
}

impl GgufFixture {
    /// A llama model with a name, context length and block count
    pub fn llama(name: &str) -> Self {
        Self {
            kv: Vec::new(),
            padding_bytes: 0,
        }
        .string("general.architecture", "llama")
        .string("general.name", name)
        .u32("llama.context_length", 4096)
        .u32("llama.block_count", 32)
    }

    pub fn string(mut self, key: &str, value: &str) -> Self {
        self.kv.push((key.to_string(), Value::Str(value.to_string())));
        self
    }

    pub fn u32(mut self, key: &str, value: u32) -> Self {
        self.kv.push((key.to_string(), Value::U32(value)));
        self
    }

    /// Append zero bytes after the header so the file has a given size
    pub fn padded_to_mb(mut self, mb: usize) -> Self {
        self.padding_bytes = mb * 1024 * 1024;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"GGUF");
        buf.write_u32::<LittleEndian>(3).unwrap();
        buf.write_u64::<LittleEndian>(0).unwrap();
        buf.write_u64::<LittleEndian>(self.kv.len() as u64).unwrap();

        for (key, value) in &self.kv {
            write_str(&mut buf, key);
            match value {
                Value::U32(v) => {
                    buf.write_u32::<LittleEndian>(GGUF_UINT32).unwrap();
                    buf.write_u32::<LittleEndian>(*v).unwrap();
                }
                Value::Str(s) => {
                    buf.write_u32::<LittleEndian>(GGUF_STRING).unwrap();
                    write_str(&mut buf, s);
                }
            }
        }

        if buf.len() < self.padding_bytes {
            buf.resize(self.padding_bytes, 0);
        }
        buf
    }

    pub fn write(&self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        fs::write(&path, self.to_bytes()).unwrap();
        path
    }
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    buf.write_u64::<LittleEndian>(s.len() as u64).unwrap();
    buf.extend_from_slice(s.as_bytes());
}

/// Temp directory holding a model file and a config file
pub struct TestEnvironment {
    pub root: TempDir,
    pub model_path: PathBuf,
    pub config_path: PathBuf,
}

impl TestEnvironment {
    /// Environment whose config declares only mock backends and no GPU probing
    pub fn with_mock_backends() -> Self {
        Self::with_config(
            r#"
[logging]
level = "warn"

[selection]
fallback_order = ["primary", "secondary"]

[hardware]
detect = false

[backends.primary]
kind = "mock"
gpu_enabled = false

[backends.secondary]
kind = "mock"
gpu_enabled = false
"#,
        )
    }

    pub fn with_config(config: &str) -> Self {
        let root = TempDir::new().unwrap();
        let model_path = GgufFixture::llama("Fixture Llama").write(root.path(), "fixture-7b.gguf");
        let config_path = root.path().join("llm-loader.toml");
        fs::write(&config_path, config).unwrap();
        Self {
            root,
            model_path,
            config_path,
        }
    }

    pub fn config_arg(&self) -> &str {
        self.config_path.to_str().unwrap()
    }

    pub fn model_arg(&self) -> &str {
        self.model_path.to_str().unwrap()
    }
}
