//! [`ExecutionEngine`] over the docker CLI.
//!
//! Environments are descriptions until their first execution. At that
//! point one container is started per environment lineage and kept alive
//! with `sleep infinity`; mounts and files are applied incrementally before
//! each call. Variables travel per call through a temporary `--env-file`.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use dirk_core::{
    join_env_path, Arg, Directory, DirectoryOrigin, EngineError, EngineResult, Environment,
    ExecOutput, ExecutionEngine, Expect, FileRef, ImageRef, Invocation, SecretStore, SessionId,
};

use crate::args::{
    cat_args, container_name, env_file_contents, exec_args, mkdir_args, parent_dir, run_args,
    tar_args,
};
use crate::error::{DockerError, Result};

/// What has already been applied to a running container.
#[derive(Debug, Clone, Default)]
struct ContainerState {
    name: String,
    directories: Vec<(String, Directory)>,
    files: HashMap<String, FileRef>,
}

pub struct DockerEngine {
    binary: String,
    secrets: Arc<dyn SecretStore>,
    containers: Mutex<HashMap<SessionId, ContainerState>>,
}

impl DockerEngine {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            binary: "docker".to_string(),
            secrets,
            containers: Mutex::new(HashMap::new()),
        }
    }

    /// Use another docker-compatible binary (e.g. `podman`).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Remove every container this engine started.
    pub async fn shutdown(&self) -> Result<()> {
        let names: Vec<String> = self
            .lock()
            .drain()
            .map(|(_, state)| state.name)
            .collect();
        if names.is_empty() {
            return Ok(());
        }
        info!(count = names.len(), "Removing containers");
        let mut args = vec!["rm".to_string(), "-f".to_string()];
        args.extend(names);
        self.checked(&args).await.map(|_| ())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, ContainerState>> {
        self.containers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn container(&self, session: SessionId) -> Option<ContainerState> {
        self.lock().get(&session).cloned()
    }

    async fn docker(&self, args: &[String]) -> Result<Output> {
        Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => DockerError::DockerNotFound,
                _ => DockerError::Io(e),
            })
    }

    /// Run docker and fail on a non-zero exit. Returns stdout.
    async fn checked(&self, args: &[String]) -> Result<String> {
        let output = self.docker(args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(DockerError::CommandFailed {
                command: args.first().cloned().unwrap_or_default(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Start the container of `env` if needed, then apply pending mounts and
    /// files. Returns the container name.
    async fn materialize(&self, env: &Environment) -> EngineResult<String> {
        let mut state = match self.container(env.session()) {
            Some(state) => state,
            None => self.start(env).await?,
        };

        for (mount, dir) in env.directories() {
            if state.directories.iter().any(|(m, d)| m == mount && d == dir) {
                continue;
            }
            self.copy_directory(&state.name, mount, dir).await?;
            state.directories.push((mount.clone(), dir.clone()));
        }

        for (path, file) in env.files() {
            if state.files.get(path) == Some(file) {
                continue;
            }
            self.copy_file(&state.name, path, file).await?;
            state.files.insert(path.clone(), file.clone());
        }

        let name = state.name.clone();
        self.lock().insert(env.session(), state);
        Ok(name)
    }

    async fn start(&self, env: &Environment) -> EngineResult<ContainerState> {
        let name = container_name(env.session());
        info!(container = %name, image = %env.image(), "Starting container");
        self.checked(&run_args(&name, &env.image().to_string(), env.caches()))
            .await?;
        let state = ContainerState {
            name,
            ..Default::default()
        };
        self.lock().insert(env.session(), state.clone());
        Ok(state)
    }

    async fn copy_directory(&self, name: &str, mount: &str, dir: &Directory) -> EngineResult<()> {
        debug!(container = %name, mount, "Copying directory");
        self.checked(&mkdir_args(name, mount)).await?;
        let target = format!("{}:{}", name, mount);

        let mut producer = match dir.origin() {
            DirectoryOrigin::Host(root) => {
                if !tokio::fs::metadata(root).await.map(|m| m.is_dir()).unwrap_or(false) {
                    return Err(DockerError::PathNotFound(root.display().to_string()).into());
                }
                let mut cmd = Command::new("tar");
                cmd.args(tar_args(root, dir.excluded()));
                cmd
            }
            DirectoryOrigin::Environment { session, path } => {
                let source = self
                    .container(*session)
                    .ok_or_else(|| EngineError::NotFound { path: path.clone() })?;
                let mut cmd = Command::new(&self.binary);
                cmd.args(["cp", &format!("{}:{}/.", source.name, path.trim_end_matches('/')), "-"]);
                cmd
            }
        };
        let mut producer = producer
            .kill_on_drop(true)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(DockerError::from)?;
        let stream: Stdio = producer
            .stdout
            .take()
            .ok_or_else(|| DockerError::Pipe("producer stdout not captured".to_string()))?
            .try_into()
            .map_err(DockerError::from)?;

        let consumer = Command::new(&self.binary)
            .args(["cp", "-", &target])
            .kill_on_drop(true)
            .stdin(stream)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(DockerError::from)?;
        let produced = producer.wait_with_output().await.map_err(DockerError::from)?;

        if !produced.status.success() {
            return Err(DockerError::CommandFailed {
                command: "tar".to_string(),
                stderr: String::from_utf8_lossy(&produced.stderr).trim().to_string(),
            }
            .into());
        }
        if !consumer.status.success() {
            return Err(DockerError::CommandFailed {
                command: "cp".to_string(),
                stderr: String::from_utf8_lossy(&consumer.stderr).trim().to_string(),
            }
            .into());
        }

        if let DirectoryOrigin::Environment { .. } = dir.origin() {
            for rel in dir.excluded() {
                let args: Vec<String> = ["exec", name, "rm", "-rf"]
                    .iter()
                    .map(|s| s.to_string())
                    .chain(std::iter::once(join_env_path(mount, rel)))
                    .collect();
                self.checked(&args).await?;
            }
        }
        Ok(())
    }

    async fn copy_file(&self, name: &str, path: &str, file: &FileRef) -> EngineResult<()> {
        debug!(container = %name, path, source = %file.display_name(), "Copying file");
        self.checked(&mkdir_args(name, parent_dir(path))).await?;
        let target = format!("{}:{}", name, path);

        let host_path = match file {
            FileRef::Host(p) => Some(p.clone()),
            FileRef::InDirectory { dir, path: rel } => match dir.origin() {
                DirectoryOrigin::Host(root) if !dir.is_excluded(rel) => Some(root.join(rel)),
                _ => None,
            },
            _ => None,
        };

        match host_path {
            Some(src) => {
                if tokio::fs::metadata(&src).await.is_err() {
                    return Err(EngineError::NotFound {
                        path: src.display().to_string(),
                    });
                }
                self.checked(&["cp".to_string(), src.display().to_string(), target])
                    .await?;
            }
            None => {
                let contents = self.contents(file).await?;
                let mut staged = tempfile::NamedTempFile::new()?;
                staged.write_all(contents.as_bytes())?;
                staged.flush()?;
                self.checked(&[
                    "cp".to_string(),
                    staged.path().display().to_string(),
                    target,
                ])
                .await?;
            }
        }
        Ok(())
    }

    async fn read_in_container(&self, session: SessionId, path: &str) -> EngineResult<String> {
        let state = self.container(session).ok_or_else(|| EngineError::NotFound {
            path: path.to_string(),
        })?;
        let output = self.docker(&cat_args(&state.name, path)).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(EngineError::NotFound {
                path: path.to_string(),
            })
        }
    }

    /// Plain variables first, then secrets in plaintext.
    async fn env_file(&self, env: &Environment) -> EngineResult<tempfile::NamedTempFile> {
        let mut secrets = Vec::with_capacity(env.secret_env().len());
        for (key, secret) in env.secret_env() {
            secrets.push((key.as_str(), self.secrets.plaintext(secret).await?));
        }
        let body = env_file_contents(
            env.env()
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .chain(secrets.iter().map(|(k, v)| (*k, v.as_str()))),
        );
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(body.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

async fn read_host(path: &Path) -> EngineResult<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => EngineError::NotFound {
            path: path.display().to_string(),
        },
        _ => EngineError::Io(e),
    })
}

/// Copy a host tree, skipping excluded relative paths.
async fn copy_host_tree(root: &Path, dir: &Directory, dest: &Path) -> EngineResult<()> {
    let mut pending: Vec<PathBuf> = vec![PathBuf::new()];
    while let Some(rel) = pending.pop() {
        tokio::fs::create_dir_all(dest.join(&rel)).await?;
        let mut entries = tokio::fs::read_dir(root.join(&rel)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let child = rel.join(entry.file_name());
            if dir.is_excluded(&child.to_string_lossy()) {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                pending.push(child);
            } else {
                tokio::fs::copy(root.join(&child), dest.join(&child)).await?;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl ExecutionEngine for DockerEngine {
    async fn snapshot(&self, path: &Path) -> EngineResult<Directory> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => Ok(Directory::host(path)),
            _ => Err(EngineError::NotFound {
                path: path.display().to_string(),
            }),
        }
    }

    async fn contents(&self, file: &FileRef) -> EngineResult<String> {
        match file {
            FileRef::Host(p) => read_host(p).await,
            FileRef::InDirectory { dir, path } => {
                if dir.is_excluded(path) {
                    return Err(EngineError::NotFound { path: path.clone() });
                }
                match dir.origin() {
                    DirectoryOrigin::Host(root) => read_host(&root.join(path)).await,
                    DirectoryOrigin::Environment {
                        session,
                        path: base,
                    } => {
                        self.read_in_container(*session, &join_env_path(base, path))
                            .await
                    }
                }
            }
            FileRef::InEnvironment { session, path } => {
                self.read_in_container(*session, path).await
            }
            FileRef::Inline { contents, .. } => Ok(contents.clone()),
        }
    }

    async fn new_environment(&self, image: &ImageRef) -> EngineResult<Environment> {
        let env = Environment::new(image.clone());
        debug!(session = %env.session(), image = %image, "New environment");
        Ok(env)
    }

    async fn exec(
        &self,
        env: &Environment,
        invocation: &Invocation,
        expect: Expect,
    ) -> EngineResult<(Environment, ExecOutput)> {
        let mut argv = Vec::with_capacity(invocation.as_args().len());
        for arg in invocation.as_args() {
            match arg {
                Arg::Plain(s) => argv.push(s.clone()),
                Arg::Secret(secret) => argv.push(self.secrets.plaintext(secret).await?),
            }
        }

        let name = self.materialize(env).await?;
        let env_file = self.env_file(env).await?;
        info!(container = %name, command = %invocation, "Executing");

        let output = self.docker(&exec_args(&name, env_file.path(), &argv)).await?;
        let result = ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(
            exit_code = result.exit_code,
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            "Execution finished"
        );

        if expect == Expect::Success && !result.success() {
            return Err(EngineError::NonZeroExit {
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }
        Ok((env.next_generation(), result))
    }

    async fn read_directory(&self, env: &Environment, path: &str) -> EngineResult<Directory> {
        self.materialize(env).await?;
        Ok(Directory::in_environment(env.session(), path))
    }

    async fn export(&self, dir: &Directory, dest: &Path) -> EngineResult<()> {
        info!(dest = %dest.display(), "Exporting directory");
        match dir.origin() {
            DirectoryOrigin::Host(root) => copy_host_tree(root, dir, dest).await,
            DirectoryOrigin::Environment { session, path } => {
                let state = self
                    .container(*session)
                    .ok_or_else(|| EngineError::NotFound { path: path.clone() })?;
                tokio::fs::create_dir_all(dest).await?;
                self.checked(&[
                    "cp".to_string(),
                    format!("{}:{}/.", state.name, path.trim_end_matches('/')),
                    dest.display().to_string(),
                ])
                .await?;
                for rel in dir.excluded() {
                    let target = dest.join(rel);
                    match tokio::fs::metadata(&target).await {
                        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&target).await?,
                        Ok(_) => tokio::fs::remove_file(&target).await?,
                        Err(_) => warn!(path = %rel, "Excluded path not present in export"),
                    }
                }
                Ok(())
            }
        }
    }
}
