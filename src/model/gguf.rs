//! GGUF header reader
//!
//! Reads the fixed header and the key/value metadata section of a GGUF
//! file. Tensor data is never touched. Only scalar values are retained;
//! arrays (tokenizer vocabularies and the like) are skipped in place.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

use crate::error::{Error, Result};
use crate::types::{ModelMetadata, QuantizationType};

/// Magic bytes every GGUF file starts with
pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";

/// Oldest and newest container versions understood here
pub const MIN_VERSION: u32 = 1;
pub const MAX_VERSION: u32 = 3;

const MAX_STRING_LEN: u64 = 16 * 1024 * 1024;
const MAX_KV_COUNT: u64 = 1 << 20;
const MAX_ARRAY_LEN: u64 = 1 << 32;
const MAX_ARRAY_DEPTH: u64 = 8;

/// Structural problems found while reading a header
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("unrecognized magic bytes {0:?}")]
    BadMagic([u8; 4]),

    #[error("unsupported GGUF version {0}")]
    UnsupportedVersion(u32),

    #[error("header is truncated")]
    Truncated,

    #[error("{what} length {len} exceeds limit")]
    Oversized { what: &'static str, len: u64 },

    #[error("unknown metadata value type {0}")]
    BadValueType(u32),

    #[error("metadata key is not valid UTF-8")]
    BadUtf8,

    #[error("read failed: {0}")]
    Io(io::Error),
}

impl From<io::Error> for HeaderError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            HeaderError::Truncated
        } else {
            HeaderError::Io(e)
        }
    }
}

/// Scalar metadata value
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Uint(u64),
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Array,
}

impl Value {
    fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Uint(v) => u32::try_from(*v).ok(),
            Value::Int(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// File-level entry points
// ─────────────────────────────────────────────────────────────────

/// Check the magic bytes and version of a file, returning the version
pub fn check_magic(path: &Path) -> Result<u32> {
    let file = File::open(path).map_err(|e| Error::IoRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = BufReader::new(file);

    read_preamble(&mut reader).map_err(|e| Error::model_invalid(path, e.to_string()))
}

/// Read the full metadata section of a GGUF file
pub fn read_metadata(path: &Path) -> Result<ModelMetadata> {
    let file = File::open(path).map_err(|e| Error::IoRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = BufReader::new(file);

    let metadata = parse_header(&mut reader)
        .map_err(|e| Error::model_invalid(path, e.to_string()))?;

    tracing::debug!(
        path = %path.display(),
        version = metadata.gguf_version,
        tensors = metadata.tensor_count,
        architecture = ?metadata.architecture,
        "Parsed GGUF header"
    );

    Ok(metadata)
}

// ─────────────────────────────────────────────────────────────────
// Reader
// ─────────────────────────────────────────────────────────────────

fn read_preamble<R: Read>(reader: &mut R) -> std::result::Result<u32, HeaderError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != GGUF_MAGIC {
        return Err(HeaderError::BadMagic(magic));
    }

    let version = reader.read_u32::<LittleEndian>()?;
    if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
        return Err(HeaderError::UnsupportedVersion(version));
    }
    Ok(version)
}

/// Parse magic, counts and metadata from a reader positioned at byte 0
pub fn parse_header<R: Read>(reader: &mut R) -> std::result::Result<ModelMetadata, HeaderError> {
    let version = read_preamble(reader)?;

    let tensor_count = read_count(reader, version)?;
    let kv_count = read_count(reader, version)?;
    if kv_count > MAX_KV_COUNT {
        return Err(HeaderError::Oversized { what: "metadata", len: kv_count });
    }

    let mut values = HashMap::new();
    for _ in 0..kv_count {
        let key = read_string(reader, version)?;
        let value_type = reader.read_u32::<LittleEndian>()?;
        let value = read_value(reader, version, value_type)?;
        values.insert(key, value);
    }

    let architecture = values
        .get("general.architecture")
        .and_then(Value::as_str)
        .map(str::to_string);

    let arch_u32 = |suffix: &str| -> Option<u32> {
        let arch = architecture.as_deref()?;
        values.get(&format!("{}.{}", arch, suffix)).and_then(Value::as_u32)
    };

    Ok(ModelMetadata {
        gguf_version: version,
        tensor_count,
        kv_count,
        name: values.get("general.name").and_then(Value::as_str).map(str::to_string),
        quantization: values
            .get("general.file_type")
            .and_then(Value::as_u32)
            .map(QuantizationType::from_file_type),
        context_length: arch_u32("context_length"),
        embedding_length: arch_u32("embedding_length"),
        head_count: arch_u32("attention.head_count"),
        block_count: arch_u32("block_count"),
        architecture,
    })
}

/// Version 1 stored counts and lengths as u32, later versions as u64
fn read_count<R: Read>(reader: &mut R, version: u32) -> std::result::Result<u64, HeaderError> {
    if version == 1 {
        Ok(reader.read_u32::<LittleEndian>()? as u64)
    } else {
        Ok(reader.read_u64::<LittleEndian>()?)
    }
}

fn read_string<R: Read>(reader: &mut R, version: u32) -> std::result::Result<String, HeaderError> {
    let len = read_count(reader, version)?;
    if len > MAX_STRING_LEN {
        return Err(HeaderError::Oversized { what: "string", len });
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| HeaderError::BadUtf8)
}

fn skip_string<R: Read>(reader: &mut R, version: u32) -> std::result::Result<(), HeaderError> {
    let len = read_count(reader, version)?;
    if len > MAX_STRING_LEN {
        return Err(HeaderError::Oversized { what: "string", len });
    }
    skip_bytes(reader, len)
}

fn skip_bytes<R: Read>(reader: &mut R, len: u64) -> std::result::Result<(), HeaderError> {
    let copied = io::copy(&mut reader.by_ref().take(len), &mut io::sink())?;
    if copied < len {
        return Err(HeaderError::Truncated);
    }
    Ok(())
}

/// Fixed width of a scalar value type, None for strings and arrays
fn scalar_width(value_type: u32) -> Option<u64> {
    match value_type {
        0 | 1 | 7 => Some(1),
        2 | 3 => Some(2),
        4 | 5 | 6 => Some(4),
        10 | 11 | 12 => Some(8),
        _ => None,
    }
}

fn read_value<R: Read>(
    reader: &mut R,
    version: u32,
    value_type: u32,
) -> std::result::Result<Value, HeaderError> {
    let value = match value_type {
        0 => Value::Uint(reader.read_u8()? as u64),
        1 => Value::Int(reader.read_i8()? as i64),
        2 => Value::Uint(reader.read_u16::<LittleEndian>()? as u64),
        3 => Value::Int(reader.read_i16::<LittleEndian>()? as i64),
        4 => Value::Uint(reader.read_u32::<LittleEndian>()? as u64),
        5 => Value::Int(reader.read_i32::<LittleEndian>()? as i64),
        6 => Value::Float(reader.read_f32::<LittleEndian>()? as f64),
        7 => Value::Bool(reader.read_u8()? != 0),
        8 => Value::Str(read_string(reader, version)?),
        9 => {
            let item_type = reader.read_u32::<LittleEndian>()?;
            let len = read_count(reader, version)?;
            if len > MAX_ARRAY_LEN {
                return Err(HeaderError::Oversized { what: "array", len });
            }
            skip_array(reader, version, item_type, len, 1)?;
            Value::Array
        }
        10 => Value::Uint(reader.read_u64::<LittleEndian>()?),
        11 => Value::Int(reader.read_i64::<LittleEndian>()?),
        12 => Value::Float(reader.read_f64::<LittleEndian>()?),
        other => return Err(HeaderError::BadValueType(other)),
    };
    Ok(value)
}

fn skip_array<R: Read>(
    reader: &mut R,
    version: u32,
    item_type: u32,
    len: u64,
    depth: u64,
) -> std::result::Result<(), HeaderError> {
    if depth > MAX_ARRAY_DEPTH {
        return Err(HeaderError::Oversized { what: "array nesting", len: depth });
    }
    if let Some(width) = scalar_width(item_type) {
        return skip_bytes(reader, width.saturating_mul(len));
    }
    match item_type {
        8 => {
            for _ in 0..len {
                skip_string(reader, version)?;
            }
        }
        9 => {
            for _ in 0..len {
                let nested_type = reader.read_u32::<LittleEndian>()?;
                let nested_len = read_count(reader, version)?;
                if nested_len > MAX_ARRAY_LEN {
                    return Err(HeaderError::Oversized { what: "array", len: nested_len });
                }
                skip_array(reader, version, nested_type, nested_len, depth + 1)?;
            }
        }
        other => return Err(HeaderError::BadValueType(other)),
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Test support
// ─────────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::testing::minimal_header;
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_header() {
        let bytes = minimal_header("llama", "Tiny", 4096, 32);
        let meta = parse_header(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(meta.gguf_version, 3);
        assert_eq!(meta.kv_count, 6);
        assert_eq!(meta.architecture.as_deref(), Some("llama"));
        assert_eq!(meta.name.as_deref(), Some("Tiny"));
        assert_eq!(meta.context_length, Some(4096));
        assert_eq!(meta.block_count, Some(32));
        assert_eq!(meta.quantization, Some(QuantizationType::Q4_K_M));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let err = parse_header(&mut Cursor::new(b"PK\x03\x04rest".to_vec())).unwrap_err();
        assert!(matches!(err, HeaderError::BadMagic(_)));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bytes = GGUF_MAGIC.to_vec();
        bytes.extend_from_slice(&9u32.to_le_bytes());
        let err = parse_header(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, HeaderError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let bytes = minimal_header("llama", "Tiny", 4096, 32);
        let cut = bytes[..bytes.len() - 6].to_vec();
        let err = parse_header(&mut Cursor::new(cut)).unwrap_err();
        assert!(matches!(err, HeaderError::Truncated));
    }

    /// Header with one key whose value is `levels` arrays nested one inside the next
    fn nested_array_header(levels: usize) -> Vec<u8> {
        let mut bytes = GGUF_MAGIC.to_vec();
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());

        let key = b"tokenizer.nested";
        bytes.extend_from_slice(&(key.len() as u64).to_le_bytes());
        bytes.extend_from_slice(key);
        bytes.extend_from_slice(&9u32.to_le_bytes());
        for _ in 0..levels {
            bytes.extend_from_slice(&9u32.to_le_bytes());
            bytes.extend_from_slice(&1u64.to_le_bytes());
        }
        // innermost: one u8
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.push(7);
        bytes
    }

    #[test]
    fn test_shallow_nested_arrays_accepted() {
        let meta = parse_header(&mut Cursor::new(nested_array_header(3))).unwrap();
        assert_eq!(meta.kv_count, 1);
    }

    #[test]
    fn test_deeply_nested_arrays_rejected() {
        let err = parse_header(&mut Cursor::new(nested_array_header(400_000))).unwrap_err();
        assert!(
            matches!(err, HeaderError::Oversized { what: "array nesting", .. }),
            "unexpected error: {:?}",
            err
        );
    }

    #[test]
    fn test_deeply_nested_arrays_fail_on_blocking_thread() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested.gguf");
        std::fs::write(&path, nested_array_header(400_000)).unwrap();

        let result = tokio_test::block_on(async move {
            tokio::task::spawn_blocking(move || read_metadata(&path)).await
        });
        let err = result.unwrap().unwrap_err();
        assert!(err.to_string().contains("Invalid GGUF file"));
    }

    #[test]
    fn test_oversized_nested_array_len_rejected() {
        let mut bytes = nested_array_header(0);
        // rewrite the outer array as nested with an impossible inner length
        let tail = bytes.len() - (4 + 8 + 1);
        bytes.truncate(tail);
        bytes.extend_from_slice(&9u32.to_le_bytes());
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());

        let err = parse_header(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, HeaderError::Oversized { what: "array", .. }));
    }

    #[test]
    fn test_magic_only_file_fails_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stub.gguf");
        std::fs::write(&path, b"GGUF").unwrap();

        let err = read_metadata(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid GGUF file"));
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_check_magic_on_file() {
        let dir = TempDir::new().unwrap();
        let path = testing::write_model(dir.path(), "m.gguf");
        assert_eq!(check_magic(&path).unwrap(), 3);

        let bad = dir.path().join("bad.bin");
        std::fs::write(&bad, b"not a model at all").unwrap();
        assert!(check_magic(&bad).is_err());
    }
}
