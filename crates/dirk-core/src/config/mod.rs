//! Layered run configuration.
//!
//! Three layers are merged, lowest first: built-in defaults, the project's
//! env files, explicit call arguments. A present value in a higher layer
//! replaces the lower one; an empty or absent value never erases anything.
//! The merged layer is then validated into an immutable [`RunConfiguration`].

pub mod env_file;
pub mod keys;
pub mod layer;
pub mod project_version;
pub mod resolver;
pub mod run_config;

pub use env_file::{parse_env_file, EnvFileNames, EnvFiles};
pub use layer::{resolve_layers, ConfigLayer};
pub use project_version::{parse_project_version, read_project_version, PROJECT_VERSION_PATH};
pub use resolver::{validate, ConfigResolver};
pub use run_config::{Credentials, RunConfiguration, RunKind, RunTarget};
