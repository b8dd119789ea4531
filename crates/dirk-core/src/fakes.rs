//! In-memory fakes for the engine capability (testing only)
//!
//! [`MemoryEngine`] keeps host files, environment filesystems and every call
//! it receives in memory, so pipeline tests can assert on the exact sequence
//! of executions without a container runtime.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::engine::{EngineError, EngineResult, ExecOutput, ExecutionEngine, Expect};
use crate::handle::{join_env_path, Directory, DirectoryOrigin, Environment, FileRef, SessionId};
use crate::image::ImageRef;
use crate::invocation::{Arg, Invocation};
use crate::secrets::SecretStore;

/// One observable engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    NewEnvironment { image: String },
    Exec {
        image: String,
        argv: Vec<String>,
        exit_code: i32,
    },
    ReadDirectory { path: String },
    Export { dest: PathBuf },
}

/// Scripted behaviour for executions whose arguments contain `needle`.
#[derive(Debug, Clone, Default)]
pub struct ExecRule {
    needle: String,
    exit_code: i32,
    produces: Vec<(String, String)>,
    backend_failure: Option<String>,
}

impl ExecRule {
    pub fn matching(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            ..Default::default()
        }
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Write a file into the environment when the rule fires.
    pub fn produces(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.produces.push((path.into(), contents.into()));
        self
    }

    /// Fail the call itself instead of returning an exit status.
    pub fn backend_failure(mut self, reason: impl Into<String>) -> Self {
        self.backend_failure = Some(reason.into());
        self
    }

    fn matches(&self, invocation: &Invocation) -> bool {
        invocation
            .as_args()
            .iter()
            .any(|a| matches!(a, Arg::Plain(s) if s.contains(self.needle.as_str())))
    }
}

#[derive(Debug, Default)]
struct FakeState {
    host_files: HashMap<PathBuf, String>,
    host_dirs: HashMap<PathBuf, BTreeMap<String, String>>,
    sessions: HashMap<SessionId, BTreeMap<String, String>>,
    rules: Vec<ExecRule>,
    events: Vec<EngineEvent>,
    resolved: Vec<Vec<String>>,
    exports: HashMap<PathBuf, BTreeMap<String, String>>,
}

/// Recording in-memory engine.
pub struct MemoryEngine {
    state: Mutex<FakeState>,
    secrets: Arc<dyn SecretStore>,
}

impl MemoryEngine {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            secrets,
        }
    }

    /// Seed a host directory with `(relative path, contents)` files.
    pub fn with_host_dir(self, path: impl Into<PathBuf>, files: &[(&str, &str)]) -> Self {
        {
            let mut state = self.lock();
            let dir = state.host_dirs.entry(path.into()).or_default();
            for (p, c) in files {
                dir.insert(p.to_string(), c.to_string());
            }
        }
        self
    }

    pub fn with_host_file(self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.lock().host_files.insert(path.into(), contents.into());
        self
    }

    pub fn on_exec(self, rule: ExecRule) -> Self {
        self.lock().rules.push(rule);
        self
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.lock().events.clone()
    }

    /// Redacted argument vectors of every execution, in order.
    pub fn exec_argvs(&self) -> Vec<Vec<String>> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Exec { argv, .. } => Some(argv.clone()),
                _ => None,
            })
            .collect()
    }

    /// Argument vectors with secrets resolved, as a real engine would run them.
    pub fn resolved_argvs(&self) -> Vec<Vec<String>> {
        self.lock().resolved.clone()
    }

    /// Relative paths of every file visible in `dir`.
    pub fn list(&self, dir: &Directory) -> Vec<String> {
        list_in(&self.lock(), dir).into_keys().collect()
    }

    pub fn exported(&self, dest: &Path) -> Option<BTreeMap<String, String>> {
        self.lock().exports.get(dest).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn lookup(state: &FakeState, file: &FileRef) -> EngineResult<String> {
    let not_found = || EngineError::NotFound {
        path: file.display_name(),
    };
    match file {
        FileRef::Host(p) => state.host_files.get(p).cloned().ok_or_else(not_found),
        FileRef::InDirectory { dir, path } => {
            if dir.is_excluded(path) {
                return Err(not_found());
            }
            match dir.origin() {
                DirectoryOrigin::Host(root) => state
                    .host_dirs
                    .get(root)
                    .and_then(|files| files.get(path))
                    .cloned()
                    .ok_or_else(not_found),
                DirectoryOrigin::Environment {
                    session,
                    path: base,
                } => state
                    .sessions
                    .get(session)
                    .and_then(|fs| fs.get(&join_env_path(base, path)))
                    .cloned()
                    .ok_or_else(not_found),
            }
        }
        FileRef::InEnvironment { session, path } => state
            .sessions
            .get(session)
            .and_then(|fs| fs.get(path))
            .cloned()
            .ok_or_else(not_found),
        FileRef::Inline { contents, .. } => Ok(contents.clone()),
    }
}

fn list_in(state: &FakeState, dir: &Directory) -> BTreeMap<String, String> {
    match dir.origin() {
        DirectoryOrigin::Host(root) => state
            .host_dirs
            .get(root)
            .map(|files| {
                files
                    .iter()
                    .filter(|(p, _)| !dir.is_excluded(p))
                    .map(|(p, c)| (p.clone(), c.clone()))
                    .collect()
            })
            .unwrap_or_default(),
        DirectoryOrigin::Environment { session, path } => {
            let prefix = format!("{}/", path.trim_end_matches('/'));
            state
                .sessions
                .get(session)
                .map(|fs| {
                    fs.iter()
                        .filter_map(|(p, c)| {
                            p.strip_prefix(prefix.as_str())
                                .filter(|rel| !dir.is_excluded(rel))
                                .map(|rel| (rel.to_string(), c.clone()))
                        })
                        .collect()
                })
                .unwrap_or_default()
        }
    }
}

/// Apply an environment's directories and files to its session filesystem.
fn materialize(state: &mut FakeState, env: &Environment) -> EngineResult<()> {
    let mut staged = Vec::new();
    for (mount, dir) in env.directories() {
        for (rel, contents) in list_in(state, dir) {
            staged.push((join_env_path(mount, &rel), contents));
        }
    }
    for (path, file) in env.files() {
        staged.push((path.clone(), lookup(state, file)?));
    }
    let fs = state.sessions.entry(env.session()).or_default();
    for (path, contents) in staged {
        fs.insert(path, contents);
    }
    Ok(())
}

#[async_trait]
impl ExecutionEngine for MemoryEngine {
    async fn snapshot(&self, path: &Path) -> EngineResult<Directory> {
        if self.lock().host_dirs.contains_key(path) {
            Ok(Directory::host(path))
        } else {
            Err(EngineError::NotFound {
                path: path.display().to_string(),
            })
        }
    }

    async fn contents(&self, file: &FileRef) -> EngineResult<String> {
        lookup(&self.lock(), file)
    }

    async fn new_environment(&self, image: &ImageRef) -> EngineResult<Environment> {
        let env = Environment::new(image.clone());
        let mut state = self.lock();
        state.sessions.insert(env.session(), BTreeMap::new());
        state.events.push(EngineEvent::NewEnvironment {
            image: image.to_string(),
        });
        Ok(env)
    }

    async fn exec(
        &self,
        env: &Environment,
        invocation: &Invocation,
        expect: Expect,
    ) -> EngineResult<(Environment, ExecOutput)> {
        let mut resolved = Vec::with_capacity(invocation.as_args().len());
        for arg in invocation.as_args() {
            match arg {
                Arg::Plain(s) => resolved.push(s.clone()),
                Arg::Secret(secret) => resolved.push(self.secrets.plaintext(secret).await?),
            }
        }
        for secret in env.secret_env().values() {
            self.secrets.plaintext(secret).await?;
        }

        let mut state = self.lock();
        materialize(&mut state, env)?;

        let rule = state.rules.iter().find(|r| r.matches(invocation)).cloned();
        let exit_code = rule.as_ref().map_or(0, |r| r.exit_code);
        state.events.push(EngineEvent::Exec {
            image: env.image().to_string(),
            argv: invocation.redacted(),
            exit_code,
        });
        state.resolved.push(resolved);

        if let Some(rule) = rule {
            if let Some(reason) = rule.backend_failure {
                return Err(EngineError::Backend(reason));
            }
            let fs = state.sessions.entry(env.session()).or_default();
            for (path, contents) in rule.produces {
                fs.insert(path, contents);
            }
        }

        let output = ExecOutput {
            exit_code,
            stdout: String::new(),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                format!("scripted exit {}", exit_code)
            },
        };
        if expect == Expect::Success && exit_code != 0 {
            return Err(EngineError::NonZeroExit {
                exit_code,
                stderr: output.stderr,
            });
        }
        Ok((env.next_generation(), output))
    }

    async fn read_directory(&self, env: &Environment, path: &str) -> EngineResult<Directory> {
        let mut state = self.lock();
        materialize(&mut state, env)?;
        state.events.push(EngineEvent::ReadDirectory {
            path: path.to_string(),
        });
        Ok(Directory::in_environment(env.session(), path))
    }

    async fn export(&self, dir: &Directory, dest: &Path) -> EngineResult<()> {
        let mut state = self.lock();
        let files = list_in(&state, dir);
        state.exports.insert(dest.to_path_buf(), files);
        state.events.push(EngineEvent::Export {
            dest: dest.to_path_buf(),
        });
        Ok(())
    }
}
