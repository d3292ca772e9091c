//! Error types for the model loader
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI
//!
//! Load and selection outcomes are reported as data (`LoadingResult`,
//! `Option`, `bool`). This type covers configuration, IO, and the
//! programming-contract violations that have no data shape.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Model file errors (3xx)
    ModelNotFound = 300,
    ModelInvalid = 301,

    // Backend errors (4xx)
    BackendNotFound = 400,
    BackendDuplicate = 401,
    BackendUnavailable = 402,
    NoModelLoaded = 403,
    LoadFailed = 404,

    // Generation errors (5xx)
    GenerationFailed = 500,
    Cancelled = 501,

    // Internal errors (9xx)
    InternalError = 900,
    NotSupported = 902,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Model file errors
            400..=499 => 40, // Backend errors
            500..=599 => 50, // Generation errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the loader
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Model File Errors
    // ─────────────────────────────────────────────────────────────

    /// Model file missing
    #[error("Model file does not exist: {path}")]
    ModelNotFound { path: PathBuf },

    /// Model file present but structurally invalid
    #[error("Invalid GGUF file {path}: {message}")]
    ModelInvalid { path: PathBuf, message: String },

    // ─────────────────────────────────────────────────────────────
    // Backend Errors
    // ─────────────────────────────────────────────────────────────

    /// Backend name not registered
    #[error("Backend '{name}' does not exist")]
    BackendNotFound { name: String },

    /// Backend name registered twice
    #[error("Backend '{name}' is already registered")]
    BackendAlreadyRegistered { name: String },

    /// Backend registered but not usable
    #[error("Backend '{name}' is not available: {reason}")]
    BackendUnavailable { name: String, reason: String },

    /// No backend could load the model
    #[error("Load failed on backend '{backend}': {message}")]
    LoadFailed { backend: String, message: String },

    /// Generation requested with nothing resident
    #[error("No model is currently loaded")]
    NoModelLoaded,

    // ─────────────────────────────────────────────────────────────
    // Generation Errors
    // ─────────────────────────────────────────────────────────────

    /// Backend reported a generation failure
    #[error("Generation failed on backend '{backend}': {message}")]
    GenerationFailed { backend: String, message: String },

    /// Operation cancelled by the caller
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Feature not supported
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::IoWrite,

            Error::ModelNotFound { .. } => ErrorCode::ModelNotFound,
            Error::ModelInvalid { .. } => ErrorCode::ModelInvalid,

            Error::BackendNotFound { .. } => ErrorCode::BackendNotFound,
            Error::BackendAlreadyRegistered { .. } => ErrorCode::BackendDuplicate,
            Error::BackendUnavailable { .. } => ErrorCode::BackendUnavailable,
            Error::NoModelLoaded => ErrorCode::NoModelLoaded,
            Error::LoadFailed { .. } => ErrorCode::LoadFailed,

            Error::GenerationFailed { .. } => ErrorCode::GenerationFailed,
            Error::Cancelled(_) => ErrorCode::Cancelled,

            Error::NotSupported(_) => ErrorCode::NotSupported,
            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::IoRead { .. }
                | Error::GenerationFailed { .. }
                | Error::BackendUnavailable { .. }
        )
    }

    /// Check if the error is fatal (process should exit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Check the --config path, or omit it to use the default search locations."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'llm-loader config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values. Run 'llm-loader config show' to see effective values."
            ),

            Error::ModelNotFound { .. } => Some(
                "Verify the model path. Relative paths are resolved from the current directory."
            ),
            Error::ModelInvalid { .. } => Some(
                "The file is not a readable GGUF model. It may be truncated; try re-downloading it."
            ),

            Error::BackendNotFound { .. } => Some(
                "Run 'llm-loader backends' to list the configured backends."
            ),
            Error::BackendUnavailable { .. } => Some(
                "Install the backend runtime or set its 'executable' path in the configuration."
            ),
            Error::NoModelLoaded => Some(
                "Load a model before requesting generation."
            ),
            Error::LoadFailed { .. } => Some(
                "Run 'llm-loader backends' to check availability, or pick another backend with --backend."
            ),
            Error::GenerationFailed { .. } => Some(
                "Run with -v to see the backend's output, or try another backend with --backend."
            ),

            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound { path: path.into() }
    }

    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an invalid model file error
    pub fn model_invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::ModelInvalid {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a generation failure for a backend
    pub fn generation_failed(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::GenerationFailed {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::BackendNotFound.as_str(), "E400");
        assert_eq!(ErrorCode::InternalError.as_str(), "E900");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::ConfigNotFound.exit_code(), 10);
        assert_eq!(ErrorCode::IoRead.exit_code(), 20);
        assert_eq!(ErrorCode::ModelInvalid.exit_code(), 30);
        assert_eq!(ErrorCode::NoModelLoaded.exit_code(), 40);
        assert_eq!(ErrorCode::GenerationFailed.exit_code(), 50);
        assert_eq!(ErrorCode::InternalError.exit_code(), 90);
    }

    #[test]
    fn test_no_model_loaded_message() {
        let err = Error::NoModelLoaded;
        assert_eq!(err.to_string(), "No model is currently loaded");
        assert_eq!(err.code(), ErrorCode::NoModelLoaded);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_backend_error_messages() {
        let err = Error::BackendNotFound { name: "ghost".into() };
        assert!(err.to_string().contains("does not exist"));

        let err = Error::BackendUnavailable {
            name: "llamafile".into(),
            reason: "not installed".into(),
        };
        assert!(err.to_string().contains("not available"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_fatal() {
        assert!(Error::config_not_found("/test").is_fatal());
        assert!(Error::config_validation("bad").is_fatal());
        assert!(!Error::NoModelLoaded.is_fatal());
    }

    #[test]
    fn test_error_suggestions() {
        let err = Error::config_parse("unexpected token");
        assert!(err.suggestion().unwrap().contains("config validate"));

        let err = Error::Internal("boom".into());
        assert!(err.suggestion().is_none());
    }

    #[test]
    fn test_format_for_terminal() {
        let err = Error::config_not_found("/test/config.toml");
        let formatted = err.format_for_terminal();

        assert!(formatted.contains("E100"));
        assert!(formatted.contains("\x1b[31m"));
        assert!(formatted.contains("Hint"));
    }

    #[test]
    fn test_format_for_log() {
        let err = Error::model_invalid("/models/x.gguf", "bad magic");
        let formatted = err.format_for_log();

        assert!(formatted.contains("[E301]"));
        assert!(formatted.contains("Invalid GGUF file"));
        assert!(!formatted.contains("\x1b["));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        assert_eq!(err.code(), ErrorCode::IoNotFound);
    }
}
