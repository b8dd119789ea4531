//! Argument vectors for docker and tar.

use std::path::Path;

use dirk_core::{CacheVolume, SessionId};

pub fn container_name(session: SessionId) -> String {
    format!("dirk-{}", session.short())
}

pub fn cache_volume_name(cache: &CacheVolume) -> String {
    format!("dirk-cache-{}", cache.name())
}

/// Start a long-lived container that only sleeps; work happens via `exec`.
pub fn run_args(name: &str, image: &str, caches: &[(String, CacheVolume)]) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        name.to_string(),
    ];
    for (path, cache) in caches {
        args.push("-v".to_string());
        args.push(format!("{}:{}", cache_volume_name(cache), path));
    }
    args.extend([
        "--entrypoint".to_string(),
        "sleep".to_string(),
        image.to_string(),
        "infinity".to_string(),
    ]);
    args
}

pub fn exec_args(name: &str, env_file: &Path, argv: &[String]) -> Vec<String> {
    let mut args = vec![
        "exec".to_string(),
        "--env-file".to_string(),
        env_file.display().to_string(),
        name.to_string(),
    ];
    args.extend(argv.iter().cloned());
    args
}

pub fn mkdir_args(name: &str, path: &str) -> Vec<String> {
    ["exec", name, "mkdir", "-p", path]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn cat_args(name: &str, path: &str) -> Vec<String> {
    ["exec", name, "cat", path]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// `tar` over a host directory, leaving out excluded relative paths.
/// Exclusions are anchored so `README.md` does not match `Assets/README.md`.
pub fn tar_args<'a>(root: &Path, excluded: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut args = vec![
        "-C".to_string(),
        root.display().to_string(),
        "--anchored".to_string(),
    ];
    for path in excluded {
        args.push(format!("--exclude=./{}", path));
    }
    args.extend(["-cf", "-", "."].iter().map(|s| s.to_string()));
    args
}

/// Body of a `--env-file`. Later keys win, as with repeated `-e`.
pub fn env_file_contents<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}\n", k, v))
        .collect()
}

/// Parent directory of an absolute environment path.
pub fn parent_dir(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_mount_caches_before_image() {
        let caches = vec![("/src/Library/".to_string(), CacheVolume::new("lib"))];
        let args = run_args("dirk-1234abcd", "unityci/editor:ubuntu-6000.0.1f1-base-3", &caches);
        assert_eq!(
            args,
            vec![
                "run",
                "-d",
                "--name",
                "dirk-1234abcd",
                "-v",
                "dirk-cache-lib:/src/Library/",
                "--entrypoint",
                "sleep",
                "unityci/editor:ubuntu-6000.0.1f1-base-3",
                "infinity"
            ]
        );
    }

    #[test]
    fn test_exec_args_keep_argv_intact() {
        let argv = vec![
            "xvfb-run".to_string(),
            "--server-args=-screen 0 640x480x24".to_string(),
        ];
        let args = exec_args("c", Path::new("/tmp/env"), &argv);
        assert_eq!(
            args,
            vec![
                "exec",
                "--env-file",
                "/tmp/env",
                "c",
                "xvfb-run",
                "--server-args=-screen 0 640x480x24"
            ]
        );
    }

    #[test]
    fn test_tar_args_anchor_exclusions() {
        let excluded = vec![".git".to_string(), "unity_secrets.env".to_string()];
        let args = tar_args(Path::new("/work/game"), &excluded);
        assert_eq!(
            args,
            vec![
                "-C",
                "/work/game",
                "--anchored",
                "--exclude=./.git",
                "--exclude=./unity_secrets.env",
                "-cf",
                "-",
                "."
            ]
        );
    }

    #[test]
    fn test_env_file_contents() {
        let body = env_file_contents([("A", "1"), ("CACHEBUSTER", "2026-10-18T00:00:00+00:00")]);
        assert_eq!(body, "A=1\nCACHEBUSTER=2026-10-18T00:00:00+00:00\n");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(
            parent_dir("/root/.local/share/unity3d/Unity/Unity_lic.ulf"),
            "/root/.local/share/unity3d/Unity"
        );
        assert_eq!(parent_dir("/a.xml"), "/");
        assert_eq!(parent_dir("/results/"), "/");
    }

    #[test]
    fn test_container_name_uses_short_session() {
        let session = SessionId::new();
        let name = container_name(session);
        assert_eq!(name.len(), "dirk-".len() + 8);
        assert!(name.starts_with("dirk-"));
    }
}
