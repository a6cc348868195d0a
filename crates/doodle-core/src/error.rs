//! Error types for Doodle

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for Doodle operations
#[derive(Debug, Error)]
pub enum DoodleError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Script parse error: {0}")]
    ScriptParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("TOML serialization error: {0}")]
    TomlSer(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Cache IO error: {0}")]
    CacheIo(String),

    #[error("Hardware probe error: {0}")]
    HardwareProbe(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),
}

impl DoodleError {
    /// Whether this error means the input script itself is unusable
    pub fn is_validation(&self) -> bool {
        matches!(self, DoodleError::Validation(_) | DoodleError::ScriptParse(_))
    }
}

/// Result type alias for Doodle operations
pub type Result<T> = std::result::Result<T, DoodleError>;

impl From<toml::de::Error> for DoodleError {
    fn from(err: toml::de::Error) -> Self {
        DoodleError::TomlParse(err.to_string())
    }
}

impl From<toml::ser::Error> for DoodleError {
    fn from(err: toml::ser::Error) -> Self {
        DoodleError::TomlSer(err.to_string())
    }
}

/// Failure categories reported by the image and speech capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    ModelLoadFailure,
    OutOfMemory,
    InvalidInput,
    UnsupportedLanguage,
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationErrorKind::ModelLoadFailure => write!(f, "model_load_failure"),
            GenerationErrorKind::OutOfMemory => write!(f, "out_of_memory"),
            GenerationErrorKind::InvalidInput => write!(f, "invalid_input"),
            GenerationErrorKind::UnsupportedLanguage => write!(f, "unsupported_language"),
        }
    }
}

/// A capability failure. Recorded per artifact rather than propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn model_load(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::ModelLoadFailure, message)
    }

    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::OutOfMemory, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::InvalidInput, message)
    }

    pub fn unsupported_language(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::UnsupportedLanguage, message)
    }
}

/// Why an artifact could not be produced for a scene
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ArtifactFailure {
    #[error("{0}")]
    Generation(GenerationError),

    #[error("cancelled")]
    Cancelled,

    /// The producing worker stopped without reporting a result
    #[error("interrupted: {message}")]
    Interrupted { message: String },
}

impl From<GenerationError> for ArtifactFailure {
    fn from(err: GenerationError) -> Self {
        ArtifactFailure::Generation(err)
    }
}
