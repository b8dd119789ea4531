//! Entry point for the two operations: resolve a configuration from a
//! project directory, then hand it to the [`Orchestrator`].

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use dirk_core::{ConfigLayer, ConfigResolver, ExecutionEngine, RunKind, SecretStore};

use crate::pipeline::{Orchestrator, RunFailure, RunOutput, RunResult};

pub struct Dirk {
    engine: Arc<dyn ExecutionEngine>,
    resolver: ConfigResolver,
    orchestrator: Orchestrator,
}

impl Dirk {
    pub fn new(engine: Arc<dyn ExecutionEngine>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            resolver: ConfigResolver::new(engine.clone(), secrets.clone()),
            orchestrator: Orchestrator::new(engine.clone(), secrets),
            engine,
        }
    }

    /// Adjust the orchestrator (image source, error check, transform).
    pub fn configure(mut self, f: impl FnOnce(Orchestrator) -> Orchestrator) -> Self {
        self.orchestrator = f(self.orchestrator);
        self
    }

    pub fn with_defaults(mut self, defaults: ConfigLayer) -> Self {
        self.resolver = self.resolver.with_defaults(defaults);
        self
    }

    /// Build the project at `source_dir`. `args` is the call-argument layer.
    pub async fn build(&self, source_dir: &Path, args: &ConfigLayer) -> RunResult<RunOutput> {
        self.run(source_dir, args, RunKind::Build).await
    }

    /// Test the project at `source_dir`.
    pub async fn test(&self, source_dir: &Path, args: &ConfigLayer) -> RunResult<RunOutput> {
        self.run(source_dir, args, RunKind::Test).await
    }

    async fn run(
        &self,
        source_dir: &Path,
        args: &ConfigLayer,
        kind: RunKind,
    ) -> RunResult<RunOutput> {
        info!(source = %source_dir.display(), kind = %kind, "Resolving configuration");
        let source = self
            .engine
            .snapshot(source_dir)
            .await
            .map_err(|e| RunFailure::resolving(kind, e.into()))?;
        let config = self
            .resolver
            .resolve(source, args, kind)
            .await
            .map_err(|e| RunFailure::resolving(kind, e))?;

        match kind {
            RunKind::Build => self.orchestrator.run_build(&config).await,
            RunKind::Test => self.orchestrator.run_test(&config).await,
        }
    }
}
