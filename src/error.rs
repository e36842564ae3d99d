//! Error types for the container signature engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SignatureError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignatureError {
    /// A binary pattern expression could not be compiled.
    #[error("Pattern syntax error at position {position}: {message}")]
    PatternSyntax { position: usize, message: String },

    /// A signature definition is structurally invalid.
    #[error("Invalid signature definition: {0}")]
    Definition(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),

    #[error("IO error: {0}")]
    IoError(String),

    /// The container does not hold the requested entry.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// An entry exists but its content could not be read.
    #[error("Failed to read entry {entry}: {message}")]
    EntryRead { entry: String, message: String },

    /// The container itself could not be decoded.
    #[error("Container error: {0}")]
    Container(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Identification timeout exceeded")]
    Timeout,
}

impl SignatureError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        SignatureError::PatternSyntax {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn entry_read(entry: &str, err: impl std::fmt::Display) -> Self {
        SignatureError::EntryRead {
            entry: entry.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for SignatureError {
    fn from(err: std::io::Error) -> Self {
        SignatureError::IoError(err.to_string())
    }
}

impl From<serde_yaml::Error> for SignatureError {
    fn from(err: serde_yaml::Error) -> Self {
        SignatureError::YamlError(err.to_string())
    }
}

impl From<serde_json::Error> for SignatureError {
    fn from(err: serde_json::Error) -> Self {
        SignatureError::JsonError(err.to_string())
    }
}
