//! Post-run error check hook.
//!
//! The last point at which a run is declared failed. The default accepts
//! any toolchain exit status, since several editor exit paths are non-zero
//! without anything being wrong.

use tracing::debug;

use dirk_core::{DirkError, Result};

use crate::report::{RunReport, StepKind};

pub trait ErrorCheck: Send + Sync {
    fn check(&self, report: &RunReport) -> Result<()>;
}

/// Never fails a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyExit;

impl ErrorCheck for AcceptAnyExit {
    fn check(&self, _report: &RunReport) -> Result<()> {
        Ok(())
    }
}

/// Fails the run on the first grant or main step that exited non-zero.
/// The release step is not considered.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireZeroExit;

impl ErrorCheck for RequireZeroExit {
    fn check(&self, report: &RunReport) -> Result<()> {
        let failed = report
            .steps
            .iter()
            .filter(|s| s.kind != StepKind::Release)
            .find(|s| !s.passed());
        match failed {
            Some(step) => {
                debug!(step = ?step.kind, exit_code = step.exit_code, "Strict check rejected run");
                Err(DirkError::Execution {
                    step: step.kind.to_string(),
                    exit_code: step.exit_code,
                })
            }
            None => Ok(()),
        }
    }
}
