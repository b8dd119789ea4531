//! dirk - containerised Unity builds and tests
//!
//! The `dirk` command runs one build or test of a Unity project inside a
//! local docker container, acquiring and returning the editor license
//! around it.
//!
//! ## Commands
//!
//! - `build`: Build the project and export `/builds`
//! - `test`: Run the project's tests and export `/results`
//!
//! Every option can also be given as a `DIRK_`-prefixed environment
//! variable. Values in the project's `unity*.env` files sit below both.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use dirk_ci::{Dirk, RequireZeroExit, RunReport};
use dirk_core::{
    keys, ConfigLayer, ExecutionEngine, FileRef, LocalRegistry, MemorySecretStore, RunKind,
    SecretScope, SecretStore,
};
use dirk_docker::DockerEngine;

#[derive(Parser)]
#[command(name = "dirk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Containerised Unity build and test runner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and a JSON run report
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Run the project's tests
    Test {
        #[command(flatten)]
        run: RunArgs,

        /// Test mode: editmode or playmode
        #[arg(long, env = "DIRK_TESTING_PLATFORM")]
        testing_platform: Option<String>,

        /// XSLT converting NUnit results to JUnit
        #[arg(long, env = "DIRK_JUNIT_TRANSFORM")]
        junit_transform: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Project directory
    #[arg(default_value = ".")]
    source: PathBuf,

    /// Unity account user name
    #[arg(long, env = "DIRK_USER")]
    user: Option<String>,

    /// Unity account password
    #[arg(long, env = "DIRK_PASS", hide_env_values = true)]
    pass: Option<String>,

    /// License serial
    #[arg(long, env = "DIRK_SERIAL", hide_env_values = true)]
    serial: Option<String>,

    /// Personal license file (.ulf)
    #[arg(long, env = "DIRK_ULF")]
    ulf: Option<PathBuf>,

    /// Floating license server services-config.json
    #[arg(long, env = "DIRK_SERVICE_CONFIG")]
    service_config: Option<PathBuf>,

    /// Image operating system (default: ubuntu)
    #[arg(long, env = "DIRK_OS")]
    os: Option<String>,

    /// Image platform module, e.g. windows-mono
    #[arg(long, env = "DIRK_PLATFORM")]
    platform: Option<String>,

    /// Unity build target, e.g. StandaloneWindows64
    #[arg(long, env = "DIRK_BUILD_TARGET")]
    build_target: Option<String>,

    /// Name of the built player
    #[arg(long, env = "DIRK_BUILD_NAME")]
    build_name: Option<String>,

    /// Editor version (read from ProjectSettings/ProjectVersion.txt if omitted)
    #[arg(long, env = "DIRK_UNITY_VERSION")]
    unity_version: Option<String>,

    /// GameCI image version (default: 3)
    #[arg(long, env = "DIRK_GAMECI_VERSION")]
    gameci_version: Option<String>,

    /// Pull editor images from a local registry, e.g. localhost:5000
    #[arg(long, env = "DIRK_REGISTRY")]
    registry: Option<String>,

    /// Fail the run when any license or toolchain step exits non-zero
    #[arg(long)]
    strict: bool,

    /// Where to export the output (default: ./builds or ./results)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl RunArgs {
    /// The call-argument configuration layer. Secrets go into `secrets`
    /// under names unique to this invocation.
    fn layer(&self, secrets: &dyn SecretStore) -> ConfigLayer {
        let scope = SecretScope::new("arg");
        let secret = |key: &str, value: &Option<String>| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| scope.register(secrets, key, v))
        };
        ConfigLayer {
            user: self.user.clone(),
            password: secret(keys::PASS, &self.pass),
            serial: secret(keys::SERIAL, &self.serial),
            license_file: self.ulf.clone().map(FileRef::Host),
            service_config: self.service_config.clone().map(FileRef::Host),
            target_os: self.os.clone(),
            platform: self.platform.clone(),
            build_target: self.build_target.clone(),
            build_name: self.build_name.clone(),
            unity_version: self.unity_version.clone(),
            gameci_version: self.gameci_version.clone(),
            testing_platform: None,
            junit_transform: None,
        }
    }
}

fn default_output(kind: RunKind) -> PathBuf {
    match kind {
        RunKind::Build => PathBuf::from("./builds"),
        RunKind::Test => PathBuf::from("./results"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dirk_core::init_tracing(cli.json, dirk_core::telemetry::level_for(cli.verbose));

    let secrets = Arc::new(MemorySecretStore::new());
    let engine = Arc::new(DockerEngine::new(secrets.clone()));

    let result = match &cli.command {
        Commands::Build { run } => {
            let layer = run.layer(secrets.as_ref());
            cmd_run(&engine, secrets.clone(), RunKind::Build, run, layer, cli.json).await
        }
        Commands::Test {
            run,
            testing_platform,
            junit_transform,
        } => {
            let mut layer = run.layer(secrets.as_ref());
            layer.testing_platform = testing_platform.clone();
            layer.junit_transform = junit_transform.clone().map(FileRef::Host);
            cmd_run(&engine, secrets.clone(), RunKind::Test, run, layer, cli.json).await
        }
    };

    if let Err(e) = engine.shutdown().await {
        warn!(error = %e, "Failed to remove containers");
    }
    result
}

async fn cmd_run(
    engine: &Arc<DockerEngine>,
    secrets: Arc<MemorySecretStore>,
    kind: RunKind,
    run: &RunArgs,
    layer: ConfigLayer,
    json: bool,
) -> Result<()> {
    let mut dirk = Dirk::new(engine.clone(), secrets);
    if let Some(host) = &run.registry {
        let registry = Arc::new(LocalRegistry::new(host.clone()));
        dirk = dirk.configure(|o| o.with_image_source(registry));
    }
    if run.strict {
        dirk = dirk.configure(|o| o.with_error_check(Arc::new(RequireZeroExit)));
    }

    let source = run
        .source
        .canonicalize()
        .with_context(|| format!("Project directory {:?} not found", run.source))?;

    let outcome = match kind {
        RunKind::Build => dirk.build(&source, &layer).await,
        RunKind::Test => dirk.test(&source, &layer).await,
    };

    match outcome {
        Ok(out) => {
            let dest = run.output.clone().unwrap_or_else(|| default_output(kind));
            export(engine.as_ref(), &out.artifact, &dest).await?;
            print_report(&out.report, json)?;
            if !json {
                println!("Exported {} output to {:?}", kind, dest);
            }
            Ok(())
        }
        Err(failure) => {
            print_report(&failure.report, json)?;
            Err(anyhow::Error::new(failure.error).context(format!("{} run failed", kind)))
        }
    }
}

async fn export(engine: &DockerEngine, dir: &dirk_core::Directory, dest: &Path) -> Result<()> {
    info!(dest = %dest.display(), "Exporting run output");
    engine
        .export(dir, dest)
        .await
        .with_context(|| format!("Failed to export output to {:?}", dest))
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize run report")?
        );
    } else {
        print!("{}", report.render());
    }
    Ok(())
}
