//! Artifact and result extraction.

use tracing::debug;

use dirk_core::{Directory, Environment, ExecutionEngine, Result, RunKind};

use crate::command::{BUILDS_DIR, RESULTS_DIR};

/// Well-known output directory of a run kind.
pub fn output_dir(kind: RunKind) -> &'static str {
    match kind {
        RunKind::Build => BUILDS_DIR,
        RunKind::Test => RESULTS_DIR,
    }
}

/// Reference the output directory of a finished environment. Its contents
/// are not inspected.
pub async fn extract(
    engine: &dyn ExecutionEngine,
    env: &Environment,
    kind: RunKind,
) -> Result<Directory> {
    let path = output_dir(kind);
    debug!(path, "Extracting run output");
    Ok(engine.read_directory(env, path).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use dirk_core::fakes::{EngineEvent, MemoryEngine};
    use dirk_core::{ImageRef, MemorySecretStore};

    #[test]
    fn test_output_dir() {
        assert_eq!(output_dir(RunKind::Build), "/builds");
        assert_eq!(output_dir(RunKind::Test), "/results");
    }

    #[tokio::test]
    async fn test_extract_reads_output_dir() {
        let engine = MemoryEngine::new(Arc::new(MemorySecretStore::new()));
        let env = engine
            .new_environment(&ImageRef::new("unityci/editor", None))
            .await
            .unwrap();

        let dir = extract(&engine, &env, RunKind::Test).await.unwrap();

        assert_eq!(dir, Directory::in_environment(env.session(), "/results"));
        assert_eq!(
            engine.events().last(),
            Some(&EngineEvent::ReadDirectory {
                path: "/results".to_string()
            })
        );
    }
}
