//! dirk core - capabilities and configuration for containerised Unity runs
//!
//! Provides the pieces the pipeline crates build on:
//! - Capability traits for the execution engine, secret store and image source
//! - Immutable value types for directories, files, environments and commands
//! - Layered configuration resolution into a validated [`RunConfiguration`]
//! - The shared error taxonomy and tracing initialisation

pub mod config;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod handle;
pub mod image;
pub mod invocation;
pub mod secrets;
pub mod telemetry;

pub use config::{
    keys, parse_env_file, parse_project_version, resolve_layers, validate, ConfigLayer,
    ConfigResolver, Credentials, EnvFileNames, EnvFiles, RunConfiguration, RunKind, RunTarget,
    PROJECT_VERSION_PATH,
};
pub use engine::{EngineError, EngineResult, ExecOutput, ExecutionEngine, Expect};
pub use error::{DirkError, ParseError, Result};
pub use handle::{
    join_env_path, CacheVolume, Directory, DirectoryOrigin, Environment, FileRef, SessionId,
};
pub use image::{HostedRegistry, ImageRef, ImageSource, ImageSpec, LocalRegistry};
pub use invocation::{Arg, Invocation};
pub use secrets::{MemorySecretStore, SecretAccessError, SecretRef, SecretScope, SecretStore};
pub use telemetry::init_tracing;
