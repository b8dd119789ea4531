//! Execution engine capability.
//!
//! The engine runs argument vectors inside environments and moves files and
//! directories between the host and those environments. Everything that is
//! pure description (exclusions, mounts, variables) lives on the value types
//! in [`crate::handle`]; the trait only carries operations with side effects.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::handle::{CacheVolume, Directory, Environment, FileRef};
use crate::image::ImageRef;
use crate::invocation::Invocation;
use crate::secrets::SecretAccessError;

/// Errors produced by an execution engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("command exited with code {exit_code}: {stderr}")]
    NonZeroExit { exit_code: i32, stderr: String },

    #[error(transparent)]
    Secret(#[from] SecretAccessError),

    #[error("engine backend failure: {0}")]
    Backend(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// How an execution treats the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expect {
    /// A non-zero exit is an [`EngineError::NonZeroExit`].
    #[default]
    Success,
    /// Any exit status is returned as output.
    Any,
}

/// Captured result of one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Sandbox/container engine.
///
/// Calls are blocking from the pipeline's point of view and carry no
/// internal timeout; dropping the returned future cancels the call.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Snapshot a host directory.
    async fn snapshot(&self, path: &Path) -> EngineResult<Directory>;

    /// Reference a host file.
    fn host_file(&self, path: &Path) -> FileRef {
        FileRef::Host(path.to_path_buf())
    }

    /// Read a file to a string. Missing files yield [`EngineError::NotFound`].
    async fn contents(&self, file: &FileRef) -> EngineResult<String>;

    /// Reference a persistent cache volume by name.
    fn mount_cache(&self, name: &str) -> CacheVolume {
        CacheVolume::new(name)
    }

    /// A fresh environment from an image.
    async fn new_environment(&self, image: &ImageRef) -> EngineResult<Environment>;

    /// Run an argument vector and return the derived environment.
    async fn exec(
        &self,
        env: &Environment,
        invocation: &Invocation,
        expect: Expect,
    ) -> EngineResult<(Environment, ExecOutput)>;

    /// Reference a directory inside a finished environment.
    async fn read_directory(&self, env: &Environment, path: &str) -> EngineResult<Directory>;

    /// Copy a directory to a host path.
    async fn export(&self, dir: &Directory, dest: &Path) -> EngineResult<()>;
}
