//! Run report: what a run did, step by step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dirk_core::RunKind;

use crate::license::LicenseGrant;

/// Pipeline state. Runs move strictly forward; `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Resolving,
    Preparing,
    Acquiring,
    Executing,
    Transforming,
    Releasing,
    Extracting,
    Done,
    Failed,
}

/// What an executed step was for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "step", content = "grant")]
pub enum StepKind {
    Grant(LicenseGrant),
    Build,
    Test,
    Release,
}

/// One toolchain execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub kind: StepKind,

    /// Argument vector with secrets rendered as `***`.
    pub argv: Vec<String>,

    pub exit_code: i32,

    pub duration_ms: u64,
}

impl StepRecord {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ReleaseStatus {
    /// No release attempted (the run ended before an environment existed).
    Pending,
    Returned { exit_code: i32 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TransformStatus {
    NotRequested,
    Produced { file: String },
    Failed { reason: String },
}

/// Summary of one run, returned with the artifact handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub kind: RunKind,

    /// Digest of the non-secret configuration fields.
    pub config_digest: String,

    pub image: String,
    pub phases: Vec<RunPhase>,
    pub grants: Vec<LicenseGrant>,
    pub steps: Vec<StepRecord>,
    pub release: ReleaseStatus,
    pub transform: TransformStatus,

    /// Error that ended the run, if any.
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new(kind: RunKind, config_digest: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            kind,
            config_digest: config_digest.into(),
            image: String::new(),
            phases: vec![RunPhase::Resolving],
            grants: Vec::new(),
            steps: Vec::new(),
            release: ReleaseStatus::Pending,
            transform: TransformStatus::NotRequested,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn enter(&mut self, phase: RunPhase) {
        self.phases.push(phase);
    }

    pub fn phase(&self) -> RunPhase {
        self.phases.last().copied().unwrap_or(RunPhase::Resolving)
    }

    /// The build or test step, once it ran.
    pub fn main_step(&self) -> Option<&StepRecord> {
        self.steps
            .iter()
            .find(|s| matches!(s.kind, StepKind::Build | StepKind::Test))
    }

    pub fn succeeded(&self) -> bool {
        self.phase() == RunPhase::Done
    }

    pub(crate) fn finish(&mut self, error: Option<String>) {
        self.enter(if error.is_some() {
            RunPhase::Failed
        } else {
            RunPhase::Done
        });
        self.error = error;
        self.finished_at = Some(Utc::now());
    }

    /// Multi-line human readable rendering.
    pub fn render(&self) -> String {
        let mut out = format!(
            "run {} ({}) {}\n  image:   {}\n  digest:  {}\n",
            self.run_id,
            self.kind,
            if self.succeeded() { "succeeded" } else { "failed" },
            self.image,
            &self.config_digest[..self.config_digest.len().min(12)],
        );
        for step in &self.steps {
            out.push_str(&format!(
                "  step:    {:<8} exit={} ({}ms)\n",
                step.kind.to_string(),
                step.exit_code,
                step.duration_ms
            ));
        }
        out.push_str(&format!("  release: {}\n", self.release.label()));
        if self.kind == RunKind::Test {
            out.push_str(&format!("  junit:   {}\n", self.transform.label()));
        }
        if let Some(error) = &self.error {
            out.push_str(&format!("  error:   {}\n", error));
        }
        out
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Grant(g) => write!(f, "{}", g),
            StepKind::Build => write!(f, "build"),
            StepKind::Test => write!(f, "test"),
            StepKind::Release => write!(f, "release"),
        }
    }
}

impl ReleaseStatus {
    fn label(&self) -> String {
        match self {
            ReleaseStatus::Pending => "not attempted".to_string(),
            ReleaseStatus::Returned { exit_code } => format!("returned (exit={})", exit_code),
            ReleaseStatus::Failed { reason } => format!("failed: {}", reason),
        }
    }
}

impl TransformStatus {
    fn label(&self) -> String {
        match self {
            TransformStatus::NotRequested => "not requested".to_string(),
            TransformStatus::Produced { file } => file.clone(),
            TransformStatus::Failed { reason } => format!("failed: {}", reason),
        }
    }
}
