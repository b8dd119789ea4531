//! Error taxonomy shared by every dirk crate.

use crate::engine::EngineError;
use crate::secrets::SecretAccessError;

/// Errors raised while parsing env files or project metadata.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// A record without a `=` separator. The record itself is not echoed
    /// because env files may carry secrets.
    #[error("{source_name}:{line}: malformed record, expected KEY=VALUE")]
    MalformedRecord { source_name: String, line: usize },

    #[error("{source_name}:{line}: record has an empty key")]
    EmptyKey { source_name: String, line: usize },

    #[error("unexpected project version layout in {path}: {reason}")]
    ProjectVersion { path: String, reason: String },
}

/// dirk errors.
#[derive(Debug, thiserror::Error)]
pub enum DirkError {
    #[error("invalid run configuration: {field} {reason}")]
    ConfigValidation { field: &'static str, reason: String },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    SecretAccess(#[from] SecretAccessError),

    #[error("step '{step}' exited with code {exit_code}")]
    Execution { step: String, exit_code: i32 },

    #[error("result transform failed: {0}")]
    Transform(String),

    #[error("engine error: {0}")]
    Engine(EngineError),
}

impl DirkError {
    /// Shorthand for a missing required configuration field.
    pub fn missing(field: &'static str) -> Self {
        DirkError::ConfigValidation {
            field,
            reason: "is required".to_string(),
        }
    }
}

impl From<EngineError> for DirkError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Secret(e) => DirkError::SecretAccess(e),
            other => DirkError::Engine(other),
        }
    }
}

/// Result type for dirk operations.
pub type Result<T> = std::result::Result<T, DirkError>;
