//! Error types for dirk-docker

use thiserror::Error;

use dirk_core::EngineError;

/// Errors from driving the docker CLI
#[derive(Error, Debug)]
pub enum DockerError {
    /// Docker binary not found
    #[error("docker is not installed or not in PATH")]
    DockerNotFound,

    /// A docker subcommand exited non-zero
    #[error("docker {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Host path does not exist
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// A pipe between processes could not be set up
    #[error("pipe setup failed: {0}")]
    Pipe(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DockerError> for EngineError {
    fn from(err: DockerError) -> Self {
        match err {
            DockerError::PathNotFound(path) => EngineError::NotFound { path },
            DockerError::Io(e) => EngineError::Io(e),
            other => EngineError::Backend(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DockerError>;
