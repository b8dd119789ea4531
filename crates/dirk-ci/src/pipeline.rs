//! Run orchestration.
//!
//! One run moves strictly forward through
//! `Resolving → Preparing → Acquiring → Executing → [Transforming] →
//! Releasing → Extracting → Done`, or ends in `Failed`. Once an environment
//! exists the license release step runs exactly once, whatever happened in
//! between.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use dirk_core::{
    DirkError, EnvFileNames, Environment, ExecutionEngine, Expect, HostedRegistry, ImageSource,
    RunConfiguration, RunKind, RunTarget, SecretStore,
};

use crate::check::{AcceptAnyExit, ErrorCheck};
use crate::command::{
    build_command, junit_results_file, results_file, test_command, LIBRARY_CACHE_MOUNT,
    SOURCE_MOUNT,
};
use crate::extract::extract;
use crate::license::{plan_grants, LicenseManager};
use crate::report::{ReleaseStatus, RunPhase, RunReport, StepKind, StepRecord, TransformStatus};
use crate::transform::{ResultTransform, SaxonTransform};

/// Cache volume mounted at the editor's `Library` folder.
pub const DEFAULT_CACHE_VOLUME: &str = "lib";

/// Set on test runs to the run start time.
pub const CACHEBUSTER: &str = "CACHEBUSTER";

/// Paths stripped from project sources before they enter an environment.
pub const TRANSIENT_PATHS: &[&str] = &[
    ".git",
    ".vscode",
    ".idea",
    ".gitignore",
    ".gitmodules",
    ".DS_Store",
    "LICENSE",
    "README.md",
];

/// A finished run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// `/builds` or `/results` of the finished environment.
    pub artifact: dirk_core::Directory,
    pub report: RunReport,
}

/// A run that ended in `Failed`, with everything recorded up to that point.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: DirkError,
    pub report: Box<RunReport>,
}

impl RunFailure {
    fn new(mut report: RunReport, error: DirkError) -> Self {
        error!(run_id = %report.run_id, kind = %report.kind, error = %error, "Run failed");
        report.finish(Some(error.to_string()));
        Self {
            error,
            report: Box::new(report),
        }
    }

    /// A failure before any configuration existed.
    pub fn resolving(kind: RunKind, error: DirkError) -> Self {
        Self::new(RunReport::new(kind, ""), error)
    }
}

pub type RunResult<T> = std::result::Result<T, RunFailure>;

/// Drives one run at a time over the engine. Holds no per-run state, so a
/// single orchestrator can serve concurrent runs.
pub struct Orchestrator {
    engine: Arc<dyn ExecutionEngine>,
    images: Arc<dyn ImageSource>,
    licenses: LicenseManager,
    transform: Arc<dyn ResultTransform>,
    check: Arc<dyn ErrorCheck>,
    cache_volume: String,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn ExecutionEngine>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            images: Arc::new(HostedRegistry::default()),
            licenses: LicenseManager::new(engine.clone(), secrets),
            transform: Arc::new(SaxonTransform::new(engine.clone())),
            check: Arc::new(AcceptAnyExit),
            cache_volume: DEFAULT_CACHE_VOLUME.to_string(),
            engine,
        }
    }

    pub fn with_image_source(mut self, images: Arc<dyn ImageSource>) -> Self {
        self.images = images;
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn ResultTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_error_check(mut self, check: Arc<dyn ErrorCheck>) -> Self {
        self.check = check;
        self
    }

    pub fn with_cache_volume(mut self, name: impl Into<String>) -> Self {
        self.cache_volume = name.into();
        self
    }

    /// Build and return the `/builds` directory.
    pub async fn run_build(&self, config: &RunConfiguration) -> RunResult<RunOutput> {
        self.expect_kind(config, RunKind::Build)?;
        self.run(config).await
    }

    /// Test and return the `/results` directory.
    pub async fn run_test(&self, config: &RunConfiguration) -> RunResult<RunOutput> {
        self.expect_kind(config, RunKind::Test)?;
        self.run(config).await
    }

    fn expect_kind(&self, config: &RunConfiguration, kind: RunKind) -> RunResult<()> {
        if config.kind() == kind {
            return Ok(());
        }
        Err(RunFailure::resolving(
            kind,
            DirkError::ConfigValidation {
                field: "kind",
                reason: format!("configuration was resolved for a {} run", config.kind()),
            },
        ))
    }

    async fn run(&self, config: &RunConfiguration) -> RunResult<RunOutput> {
        let kind = config.kind();
        let mut report = RunReport::new(kind, config.digest());
        info!(run_id = %report.run_id, kind = %kind, "Starting run");

        report.enter(RunPhase::Preparing);
        let env = match self.prepare(config, &mut report).await {
            Ok(env) => env,
            Err(e) => return Err(RunFailure::new(report, e)),
        };

        let (env, outcome) = self.licensed(env, config, &mut report).await;
        let env = self.release(env, &mut report).await;
        if let Err(e) = outcome {
            return Err(RunFailure::new(report, e));
        }

        if let Err(e) = self.check.check(&report) {
            return Err(RunFailure::new(report, e));
        }

        report.enter(RunPhase::Extracting);
        let artifact = match extract(self.engine.as_ref(), &env, kind).await {
            Ok(dir) => dir,
            Err(e) => return Err(RunFailure::new(report, e)),
        };

        report.finish(None);
        info!(
            run_id = %report.run_id,
            steps = report.steps.len(),
            "Run finished"
        );
        Ok(RunOutput { artifact, report })
    }

    /// Image, stripped sources, cache and variables.
    async fn prepare(
        &self,
        config: &RunConfiguration,
        report: &mut RunReport,
    ) -> dirk_core::Result<Environment> {
        let image = self.images.editor_image(&config.image_spec())?;
        report.image = image.to_string();
        info!(image = %image, "Preparing environment");

        let source = config
            .source
            .clone()
            .without_all(TRANSIENT_PATHS.iter().copied())
            .without_all(EnvFileNames::all_secret_files());

        let mut env = self.engine.new_environment(&image).await?;
        for (key, value) in &config.plain_env {
            env = env.with_env_variable(key.as_str(), value.as_str());
        }
        for (key, secret) in &config.secret_env {
            env = env.with_secret_variable(key.as_str(), secret.clone());
        }
        if config.kind() == RunKind::Test {
            env = env.with_env_variable(CACHEBUSTER, report.started_at.to_rfc3339());
        }

        let cache = self.engine.mount_cache(&self.cache_volume);
        Ok(env
            .with_directory(SOURCE_MOUNT, source)
            .with_mounted_cache(LIBRARY_CACHE_MOUNT, cache))
    }

    /// Grants, the main step and the optional transform. Always hands back
    /// the latest environment so the license can be returned from it.
    async fn licensed(
        &self,
        mut env: Environment,
        config: &RunConfiguration,
        report: &mut RunReport,
    ) -> (Environment, dirk_core::Result<()>) {
        report.enter(RunPhase::Acquiring);
        for grant in plan_grants(&config.credentials) {
            match self.licenses.apply(&env, grant, &config.credentials).await {
                Ok((next, step)) => {
                    env = next;
                    report.grants.push(grant);
                    report.steps.push(step);
                }
                Err(e) => return (env, Err(e)),
            }
        }

        report.enter(RunPhase::Executing);
        let (cmd, step_kind) = match &config.target {
            RunTarget::Build {
                build_target,
                build_name,
            } => (build_command(build_target, build_name), StepKind::Build),
            RunTarget::Test {
                testing_platform, ..
            } => (test_command(testing_platform), StepKind::Test),
        };
        info!(step = %step_kind, "Invoking toolchain");
        let start = Instant::now();
        match self.engine.exec(&env, &cmd, Expect::Any).await {
            Ok((next, output)) => {
                env = next;
                if !output.success() {
                    warn!(
                        step = %step_kind,
                        exit_code = output.exit_code,
                        "Toolchain exited non-zero"
                    );
                }
                report.steps.push(StepRecord {
                    kind: step_kind,
                    argv: cmd.redacted(),
                    exit_code: output.exit_code,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
            Err(e) => return (env, Err(e.into())),
        }

        if let RunTarget::Test {
            testing_platform,
            junit_transform: Some(definition),
        } = &config.target
        {
            report.enter(RunPhase::Transforming);
            let results = env.file(results_file(testing_platform));
            match self
                .transform
                .transform(&results, definition, testing_platform)
                .await
            {
                Ok(file) => {
                    let path = junit_results_file(testing_platform);
                    env = env.with_file(path.clone(), file);
                    report.transform = TransformStatus::Produced { file: path };
                }
                Err(e) => {
                    warn!(error = %e, "Result transform failed, keeping raw results only");
                    report.transform = TransformStatus::Failed {
                        reason: e.to_string(),
                    };
                }
            }
        }

        (env, Ok(()))
    }

    /// Return the license. A failure is recorded and logged, never raised.
    async fn release(&self, env: Environment, report: &mut RunReport) -> Environment {
        report.enter(RunPhase::Releasing);
        match self.licenses.release(&env).await {
            Ok((next, step)) => {
                if !step.passed() {
                    warn!(exit_code = step.exit_code, "License return exited non-zero");
                }
                report.release = ReleaseStatus::Returned {
                    exit_code: step.exit_code,
                };
                report.steps.push(step);
                next
            }
            Err(e) => {
                warn!(error = %e, "License return failed");
                report.release = ReleaseStatus::Failed {
                    reason: e.to_string(),
                };
                env
            }
        }
    }
}
