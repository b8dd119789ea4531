//! Value handles for the execution engine.
//!
//! Directories, files and environments are immutable descriptions. Builder
//! methods return a new value; nothing touches the engine until an
//! [`ExecutionEngine`](crate::engine::ExecutionEngine) method is awaited.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::image::ImageRef;
use crate::secrets::SecretRef;

/// Identity of one environment lineage inside an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }

    /// First eight hex characters, used in container names and logs.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalise a relative path: no leading `./` or `/`, no trailing `/`.
pub(crate) fn normalize_relative(path: &str) -> String {
    let mut p = path.trim();
    while let Some(rest) = p.strip_prefix("./") {
        p = rest;
    }
    p.trim_start_matches('/').trim_end_matches('/').to_string()
}

/// Join an absolute environment path with a relative one.
pub fn join_env_path(base: &str, rel: &str) -> String {
    let rel = normalize_relative(rel);
    let base = base.trim_end_matches('/');
    if rel.is_empty() {
        if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        }
    } else {
        format!("{}/{}", base, rel)
    }
}

/// Where a directory lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryOrigin {
    Host(PathBuf),
    Environment { session: SessionId, path: String },
}

/// A directory snapshot, optionally with paths excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    origin: DirectoryOrigin,
    excluded: BTreeSet<String>,
}

impl Directory {
    pub fn host(path: impl Into<PathBuf>) -> Self {
        Self {
            origin: DirectoryOrigin::Host(path.into()),
            excluded: BTreeSet::new(),
        }
    }

    pub fn in_environment(session: SessionId, path: impl Into<String>) -> Self {
        Self {
            origin: DirectoryOrigin::Environment {
                session,
                path: path.into(),
            },
            excluded: BTreeSet::new(),
        }
    }

    /// The same directory with `path` (file or subtree) left out.
    pub fn without(mut self, path: &str) -> Self {
        let path = normalize_relative(path);
        if !path.is_empty() {
            self.excluded.insert(path);
        }
        self
    }

    pub fn without_all<'a>(self, paths: impl IntoIterator<Item = &'a str>) -> Self {
        paths.into_iter().fold(self, |dir, p| dir.without(p))
    }

    /// Whether a relative path falls under an exclusion.
    pub fn is_excluded(&self, rel: &str) -> bool {
        let rel = normalize_relative(rel);
        self.excluded.iter().any(|ex| {
            rel == *ex
                || (rel.len() > ex.len()
                    && rel.starts_with(ex.as_str())
                    && rel.as_bytes()[ex.len()] == b'/')
        })
    }

    /// Reference a file inside this directory.
    pub fn file(&self, path: &str) -> FileRef {
        FileRef::InDirectory {
            dir: self.clone(),
            path: normalize_relative(path),
        }
    }

    pub fn origin(&self) -> &DirectoryOrigin {
        &self.origin
    }

    pub fn excluded(&self) -> &BTreeSet<String> {
        &self.excluded
    }
}

/// A file handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRef {
    Host(PathBuf),
    InDirectory { dir: Directory, path: String },
    InEnvironment { session: SessionId, path: String },
    /// Content produced in-process, e.g. a transformed report.
    Inline { name: String, contents: String },
}

impl FileRef {
    /// Short human-readable name for logs.
    pub fn display_name(&self) -> String {
        match self {
            FileRef::Host(p) => p.display().to_string(),
            FileRef::InDirectory { path, .. } => path.clone(),
            FileRef::InEnvironment { path, .. } => path.clone(),
            FileRef::Inline { name, .. } => name.clone(),
        }
    }
}

/// A named persistent cache volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheVolume {
    name: String,
}

impl CacheVolume {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An execution context: image, mounts, files and variables.
///
/// `generation` increases with every execution so a value always identifies
/// the filesystem state it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    session: SessionId,
    image: ImageRef,
    generation: u64,
    directories: Vec<(String, Directory)>,
    caches: Vec<(String, CacheVolume)>,
    files: Vec<(String, FileRef)>,
    env: BTreeMap<String, String>,
    secret_env: BTreeMap<String, SecretRef>,
}

impl Environment {
    pub fn new(image: ImageRef) -> Self {
        Self {
            session: SessionId::new(),
            image,
            generation: 0,
            directories: Vec::new(),
            caches: Vec::new(),
            files: Vec::new(),
            env: BTreeMap::new(),
            secret_env: BTreeMap::new(),
        }
    }

    pub fn with_directory(mut self, path: impl Into<String>, dir: Directory) -> Self {
        self.directories.push((path.into(), dir));
        self
    }

    pub fn with_mounted_cache(mut self, path: impl Into<String>, cache: CacheVolume) -> Self {
        self.caches.push((path.into(), cache));
        self
    }

    /// Place a file; a later file at the same path replaces the earlier one.
    pub fn with_file(mut self, path: impl Into<String>, file: FileRef) -> Self {
        let path = path.into();
        self.files.retain(|(p, _)| *p != path);
        self.files.push((path, file));
        self
    }

    pub fn with_env_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_secret_variable(mut self, key: impl Into<String>, secret: SecretRef) -> Self {
        self.secret_env.insert(key.into(), secret);
        self
    }

    /// The value an engine returns after running a command in this context.
    pub fn next_generation(&self) -> Self {
        let mut next = self.clone();
        next.generation += 1;
        next
    }

    /// Reference a file inside this environment.
    pub fn file(&self, path: impl Into<String>) -> FileRef {
        FileRef::InEnvironment {
            session: self.session,
            path: path.into(),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn directories(&self) -> &[(String, Directory)] {
        &self.directories
    }

    pub fn caches(&self) -> &[(String, CacheVolume)] {
        &self.caches
    }

    pub fn files(&self) -> &[(String, FileRef)] {
        &self.files
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn secret_env(&self) -> &BTreeMap<String, SecretRef> {
        &self.secret_env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_excludes_subtree_but_not_siblings() {
        let dir = Directory::host("/game").without(".git").without("./README.md");
        assert!(dir.is_excluded(".git"));
        assert!(dir.is_excluded(".git/HEAD"));
        assert!(!dir.is_excluded(".github/workflows/ci.yml"));
        assert!(dir.is_excluded("README.md"));
        assert!(!dir.is_excluded("Assets/README.md"));
    }

    #[test]
    fn test_join_env_path() {
        assert_eq!(join_env_path("/results", "a.xml"), "/results/a.xml");
        assert_eq!(join_env_path("/results/", "./a.xml"), "/results/a.xml");
        assert_eq!(join_env_path("/builds", ""), "/builds");
    }

    #[test]
    fn test_with_file_replaces_same_path() {
        let env = Environment::new(ImageRef::new("busybox", None))
            .with_file("/a", FileRef::Host("/one".into()))
            .with_file("/a", FileRef::Host("/two".into()));
        assert_eq!(env.files().len(), 1);
        assert_eq!(env.files()[0].1, FileRef::Host("/two".into()));
    }

    #[test]
    fn test_next_generation_keeps_session() {
        let env = Environment::new(ImageRef::new("busybox", None));
        let next = env.next_generation();
        assert_eq!(env.session(), next.session());
        assert_eq!(next.generation(), env.generation() + 1);
    }
}
