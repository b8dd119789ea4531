//! NUnit to JUnit conversion of test results.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use dirk_core::{
    DirkError, EngineError, ExecutionEngine, Expect, FileRef, ImageRef, Invocation, Result,
};

use crate::command::{junit_results_file, results_file};

pub const TRANSFORM_IMAGE: &str = "eclipse-temurin";
pub const TRANSFORM_DEFINITION_PATH: &str = "/nunit-transforms/nunit3-junit.xslt";

/// Converts a raw results file with a transform definition.
#[async_trait]
pub trait ResultTransform: Send + Sync {
    /// Returns the converted file. Any failure is a [`DirkError::Transform`].
    async fn transform(
        &self,
        results: &FileRef,
        definition: &FileRef,
        testing_platform: &str,
    ) -> Result<FileRef>;
}

/// Runs `saxonb-xslt` in a helper environment.
pub struct SaxonTransform {
    engine: Arc<dyn ExecutionEngine>,
    image: ImageRef,
}

impl SaxonTransform {
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            engine,
            image: ImageRef::new(TRANSFORM_IMAGE, None),
        }
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = image;
        self
    }
}

fn transform_error(context: &str) -> impl Fn(EngineError) -> DirkError + '_ {
    move |e| DirkError::Transform(format!("{}: {}", context, e))
}

#[async_trait]
impl ResultTransform for SaxonTransform {
    async fn transform(
        &self,
        results: &FileRef,
        definition: &FileRef,
        testing_platform: &str,
    ) -> Result<FileRef> {
        let raw = results_file(testing_platform);
        let junit = junit_results_file(testing_platform);
        info!(image = %self.image, output = %junit, "Transforming test results");

        let env = self
            .engine
            .new_environment(&self.image)
            .await
            .map_err(transform_error("helper environment"))?;
        let (env, _) = self
            .engine
            .exec(&env, &Invocation::new("apt-get").arg("update"), Expect::Success)
            .await
            .map_err(transform_error("apt-get update"))?;
        let install = Invocation::new("apt-get").args(["install", "-y", "libsaxonb-java"]);
        let (env, _) = self
            .engine
            .exec(&env, &install, Expect::Success)
            .await
            .map_err(transform_error("installing libsaxonb-java"))?;

        let env = env
            .with_file(raw.clone(), results.clone())
            .with_file(TRANSFORM_DEFINITION_PATH, definition.clone());
        let saxon = Invocation::new("saxonb-xslt")
            .args(["-s", raw.as_str()])
            .args(["-xsl", TRANSFORM_DEFINITION_PATH])
            .args(["-o", junit.as_str()]);
        let (env, output) = self
            .engine
            .exec(&env, &saxon, Expect::Any)
            .await
            .map_err(transform_error("saxonb-xslt"))?;
        if !output.success() {
            return Err(DirkError::Transform(format!(
                "saxonb-xslt exited with code {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }

        let contents = self
            .engine
            .contents(&env.file(junit.clone()))
            .await
            .map_err(transform_error("reading transformed results"))?;
        debug!(bytes = contents.len(), "Transformed results read back");

        Ok(FileRef::Inline {
            name: format!("{}-junit-results.xml", testing_platform),
            contents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirk_core::fakes::{ExecRule, MemoryEngine};
    use dirk_core::MemorySecretStore;

    fn files() -> (FileRef, FileRef) {
        (
            FileRef::Inline {
                name: "editmode-results.xml".to_string(),
                contents: "<test-run/>".to_string(),
            },
            FileRef::Host("/game/nunit3-junit.xslt".into()),
        )
    }

    fn engine(rule: ExecRule) -> Arc<MemoryEngine> {
        Arc::new(
            MemoryEngine::new(Arc::new(MemorySecretStore::new()))
                .with_host_file("/game/nunit3-junit.xslt", "<xsl:stylesheet/>")
                .on_exec(rule),
        )
    }

    #[tokio::test]
    async fn test_transform_returns_converted_file() {
        let engine = engine(
            ExecRule::matching("saxonb-xslt")
                .produces("/results/editmode-junit-results.xml", "<testsuites/>"),
        );
        let (results, definition) = files();

        let out = SaxonTransform::new(engine.clone())
            .transform(&results, &definition, "editmode")
            .await
            .unwrap();

        assert_eq!(
            out,
            FileRef::Inline {
                name: "editmode-junit-results.xml".to_string(),
                contents: "<testsuites/>".to_string(),
            }
        );
        let argvs = engine.exec_argvs();
        assert_eq!(argvs.len(), 3);
        assert_eq!(argvs[0], vec!["apt-get", "update"]);
        assert_eq!(argvs[1], vec!["apt-get", "install", "-y", "libsaxonb-java"]);
        assert_eq!(
            argvs[2],
            vec![
                "saxonb-xslt",
                "-s",
                "/results/editmode-results.xml",
                "-xsl",
                TRANSFORM_DEFINITION_PATH,
                "-o",
                "/results/editmode-junit-results.xml"
            ]
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_transform_error() {
        let engine = engine(ExecRule::matching("saxonb-xslt").exit_code(2));
        let (results, definition) = files();
        let err = SaxonTransform::new(engine)
            .transform(&results, &definition, "editmode")
            .await
            .unwrap_err();
        assert!(matches!(err, DirkError::Transform(_)));
    }

    #[tokio::test]
    async fn test_missing_output_is_transform_error() {
        let engine = engine(ExecRule::matching("saxonb-xslt"));
        let (results, definition) = files();
        let err = SaxonTransform::new(engine)
            .transform(&results, &definition, "editmode")
            .await
            .unwrap_err();
        assert!(matches!(err, DirkError::Transform(msg) if msg.contains("reading")));
    }

    #[tokio::test]
    async fn test_missing_definition_is_transform_error() {
        let engine = engine(ExecRule::matching("saxonb-xslt"));
        let (results, _) = files();
        let err = SaxonTransform::new(engine)
            .transform(&results, &FileRef::Host("/nope.xslt".into()), "editmode")
            .await
            .unwrap_err();
        assert!(matches!(err, DirkError::Transform(_)));
    }
}
