//! Turning layers into a validated [`RunConfiguration`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::env_file::EnvFiles;
use crate::config::layer::{resolve_layers, ConfigLayer};
use crate::config::project_version::read_project_version;
use crate::config::run_config::{Credentials, RunConfiguration, RunKind, RunTarget};
use crate::engine::ExecutionEngine;
use crate::error::{DirkError, Result};
use crate::handle::Directory;
use crate::secrets::SecretStore;

/// Resolves the configuration of one run from defaults, the project's env
/// files and call arguments.
pub struct ConfigResolver {
    engine: Arc<dyn ExecutionEngine>,
    secrets: Arc<dyn SecretStore>,
    defaults: ConfigLayer,
}

impl ConfigResolver {
    pub fn new(engine: Arc<dyn ExecutionEngine>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            engine,
            secrets,
            defaults: ConfigLayer::defaults(),
        }
    }

    /// Replace the built-in defaults layer.
    pub fn with_defaults(mut self, defaults: ConfigLayer) -> Self {
        self.defaults = defaults;
        self
    }

    /// Resolve and validate. Fails before any environment exists.
    ///
    /// The editor version is read from the project only when no layer
    /// supplies one, and only after the identity rules have passed.
    pub async fn resolve(
        &self,
        source: Directory,
        args: &ConfigLayer,
        kind: RunKind,
    ) -> Result<RunConfiguration> {
        let files =
            EnvFiles::load(self.engine.as_ref(), self.secrets.as_ref(), &source, kind).await?;
        let env_layer = ConfigLayer::from_env_files(&files, &source);
        let mut merged = resolve_layers(&self.defaults, &env_layer, args);

        check_identity(&merged)?;

        if merged.unity_version.as_deref().map_or(true, str::is_empty) {
            let version = read_project_version(self.engine.as_ref(), &source).await?;
            debug!(version = %version, "Derived Unity version from project");
            merged.unity_version = Some(version);
        }

        let config = validate(merged, kind, source, files)?;
        info!(
            kind = %kind,
            os = %config.target_os,
            platform = %config.platform,
            unity_version = %config.unity_version,
            digest = %&config.digest()[..12],
            "Resolved run configuration"
        );
        Ok(config)
    }
}

fn required(value: &Option<String>, field: &'static str) -> Result<String> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| DirkError::missing(field))
}

/// Rules that need no project metadata: user, credential, OS, platform.
fn check_identity(layer: &ConfigLayer) -> Result<()> {
    required(&layer.user, "user")?;
    if layer.password.is_none() && layer.serial.is_none() && layer.license_file.is_none() {
        return Err(DirkError::ConfigValidation {
            field: "credentials",
            reason: "need a password, a serial or a personal license file".to_string(),
        });
    }
    required(&layer.target_os, "target_os")?;
    required(&layer.platform, "platform")?;
    Ok(())
}

/// Validate a merged layer. Rules are checked in order and the first
/// violation is returned.
pub fn validate(
    layer: ConfigLayer,
    kind: RunKind,
    source: Directory,
    files: EnvFiles,
) -> Result<RunConfiguration> {
    check_identity(&layer)?;
    let unity_version = required(&layer.unity_version, "unity_version")?;

    let target = match kind {
        RunKind::Build => RunTarget::Build {
            build_target: required(&layer.build_target, "build_target")?,
            build_name: required(&layer.build_name, "build_name")?,
        },
        RunKind::Test => RunTarget::Test {
            testing_platform: required(&layer.testing_platform, "testing_platform")?,
            junit_transform: layer.junit_transform.clone(),
        },
    };

    Ok(RunConfiguration {
        source,
        target_os: required(&layer.target_os, "target_os")?,
        platform: required(&layer.platform, "platform")?,
        unity_version,
        gameci_version: required(&layer.gameci_version, "gameci_version")?,
        target,
        credentials: Credentials {
            username: required(&layer.user, "user")?,
            password: layer.password,
            serial: layer.serial,
            license_file: layer.license_file,
            service_config: layer.service_config,
        },
        plain_env: files.plain,
        secret_env: files.secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretRef;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    fn base() -> ConfigLayer {
        ConfigLayer {
            user: s("dev@example.com"),
            password: Some(SecretRef::new("arg:pass")),
            target_os: s("ubuntu"),
            platform: s("windows-mono"),
            unity_version: s("6000.0"),
            gameci_version: s("3"),
            build_target: s("StandaloneWindows64"),
            build_name: s("demo"),
            testing_platform: s("editmode"),
            ..Default::default()
        }
    }

    fn field_of(err: DirkError) -> &'static str {
        match err {
            DirkError::ConfigValidation { field, .. } => field,
            other => panic!("expected ConfigValidation, got {:?}", other),
        }
    }

    fn run(layer: ConfigLayer, kind: RunKind) -> Result<RunConfiguration> {
        validate(layer, kind, Directory::host("/game"), EnvFiles::default())
    }

    #[test]
    fn test_valid_build() {
        let config = run(base(), RunKind::Build).unwrap();
        assert_eq!(config.kind(), RunKind::Build);
        assert_eq!(config.credentials.username, "dev@example.com");
    }

    #[test]
    fn test_empty_user_rejected_regardless_of_other_fields() {
        let layer = ConfigLayer {
            user: s(""),
            password: None,
            platform: None,
            ..base()
        };
        assert_eq!(field_of(run(layer, RunKind::Build).unwrap_err()), "user");
    }

    #[test]
    fn test_credential_required() {
        let layer = ConfigLayer {
            password: None,
            ..base()
        };
        assert_eq!(field_of(run(layer, RunKind::Build).unwrap_err()), "credentials");

        let serial_only = ConfigLayer {
            password: None,
            serial: Some(SecretRef::new("arg:serial")),
            ..base()
        };
        assert!(run(serial_only, RunKind::Build).is_ok());
    }

    #[test]
    fn test_first_violation_wins() {
        let layer = ConfigLayer {
            platform: None,
            build_name: None,
            ..base()
        };
        assert_eq!(field_of(run(layer, RunKind::Build).unwrap_err()), "platform");
    }

    #[test]
    fn test_build_requires_target_and_name() {
        let layer = ConfigLayer {
            build_target: None,
            ..base()
        };
        assert_eq!(field_of(run(layer, RunKind::Build).unwrap_err()), "build_target");
        let layer = ConfigLayer {
            build_name: s(""),
            ..base()
        };
        assert_eq!(field_of(run(layer, RunKind::Build).unwrap_err()), "build_name");
    }

    #[test]
    fn test_test_run_requires_testing_platform_only() {
        let layer = ConfigLayer {
            build_target: None,
            build_name: None,
            ..base()
        };
        assert!(run(layer.clone(), RunKind::Test).is_ok());

        let layer = ConfigLayer {
            testing_platform: None,
            ..layer
        };
        assert_eq!(field_of(run(layer, RunKind::Test).unwrap_err()), "testing_platform");
    }
}
