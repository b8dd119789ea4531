//! dirk docker - execution engine backed by the docker CLI
//!
//! Runs every environment in a long-lived local container and shells out
//! to `docker` and `tar` through `tokio::process`.

pub mod args;
pub mod engine;
pub mod error;

pub use engine::DockerEngine;
pub use error::{DockerError, Result};
