//! dirk CI - licensed Unity build and test runs
//!
//! Provides the run pipeline on top of `dirk-core`:
//! - License strategy selection, acquisition and guaranteed return
//! - Toolchain command assembly for build and test runs
//! - Sequential orchestration with a run report
//! - NUnit to JUnit result transformation and output extraction

pub mod check;
pub mod command;
pub mod extract;
pub mod license;
pub mod pipeline;
pub mod report;
pub mod service;
pub mod transform;

// Re-export key types
pub use check::{AcceptAnyExit, ErrorCheck, RequireZeroExit};
pub use extract::{extract, output_dir};
pub use license::{plan_grants, LicenseGrant, LicenseManager};
pub use pipeline::{Orchestrator, RunFailure, RunOutput, RunResult, CACHEBUSTER, TRANSIENT_PATHS};
pub use report::{ReleaseStatus, RunPhase, RunReport, StepKind, StepRecord, TransformStatus};
pub use service::Dirk;
pub use transform::{ResultTransform, SaxonTransform};
