//! The validated, immutable configuration of one run.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::handle::{Directory, FileRef};
use crate::image::ImageSpec;
use crate::secrets::SecretRef;

/// Build or test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Build,
    Test,
}

impl RunKind {
    pub fn name(&self) -> &'static str {
        match self {
            RunKind::Build => "build",
            RunKind::Test => "test",
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// License credentials. At least one mechanism is present once validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<SecretRef>,
    pub serial: Option<SecretRef>,
    /// Personal license file (`.ulf`).
    pub license_file: Option<FileRef>,
    /// Floating license server `services-config.json`.
    pub service_config: Option<FileRef>,
}

/// Kind-specific part of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    Build {
        build_target: String,
        build_name: String,
    },
    Test {
        testing_platform: String,
        junit_transform: Option<FileRef>,
    },
}

/// Fully resolved parameters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    /// Project sources as snapshotted, before transient paths are stripped.
    pub source: Directory,
    pub target_os: String,
    pub platform: String,
    pub unity_version: String,
    pub gameci_version: String,
    pub target: RunTarget,
    pub credentials: Credentials,
    /// Plain variables from the project's env file.
    pub plain_env: Vec<(String, String)>,
    /// Secret variables from the project's secret env file, plus any
    /// credentials moved out of the plain one.
    pub secret_env: Vec<(String, SecretRef)>,
}

impl RunConfiguration {
    pub fn kind(&self) -> RunKind {
        match self.target {
            RunTarget::Build { .. } => RunKind::Build,
            RunTarget::Test { .. } => RunKind::Test,
        }
    }

    pub fn image_spec(&self) -> ImageSpec {
        ImageSpec {
            os: self.target_os.clone(),
            unity_version: self.unity_version.clone(),
            platform: self.platform.clone(),
            gameci_version: self.gameci_version.clone(),
        }
    }

    pub fn testing_platform(&self) -> Option<&str> {
        match &self.target {
            RunTarget::Test {
                testing_platform, ..
            } => Some(testing_platform),
            RunTarget::Build { .. } => None,
        }
    }

    /// SHA-256 over the non-secret fields, for correlating logs of runs
    /// with the same parameters.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        let mut field = |value: &str| {
            hasher.update(value.as_bytes());
            hasher.update(b"\0");
        };
        field(self.kind().name());
        field(&self.target_os);
        field(&self.platform);
        field(&self.unity_version);
        field(&self.gameci_version);
        field(&self.credentials.username);
        match &self.target {
            RunTarget::Build {
                build_target,
                build_name,
            } => {
                field(build_target);
                field(build_name);
            }
            RunTarget::Test {
                testing_platform, ..
            } => field(testing_platform),
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(target: RunTarget) -> RunConfiguration {
        RunConfiguration {
            source: Directory::host("/game"),
            target_os: "ubuntu".to_string(),
            platform: "windows-mono".to_string(),
            unity_version: "6000.0.1f1".to_string(),
            gameci_version: "3".to_string(),
            target,
            credentials: Credentials {
                username: "dev@example.com".to_string(),
                password: Some(SecretRef::new("arg:pass")),
                serial: None,
                license_file: None,
                service_config: None,
            },
            plain_env: Vec::new(),
            secret_env: Vec::new(),
        }
    }

    #[test]
    fn test_kind_follows_target() {
        let build = config(RunTarget::Build {
            build_target: "StandaloneWindows64".to_string(),
            build_name: "demo".to_string(),
        });
        assert_eq!(build.kind(), RunKind::Build);
        assert_eq!(build.testing_platform(), None);

        let test = config(RunTarget::Test {
            testing_platform: "editmode".to_string(),
            junit_transform: None,
        });
        assert_eq!(test.kind(), RunKind::Test);
        assert_eq!(test.testing_platform(), Some("editmode"));
    }

    #[test]
    fn test_digest_ignores_secret_handles() {
        let a = config(RunTarget::Test {
            testing_platform: "editmode".to_string(),
            junit_transform: None,
        });
        let mut b = a.clone();
        b.credentials.password = Some(SecretRef::new("env:PASS"));
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);

        let mut c = a.clone();
        c.platform = "linux-il2cpp".to_string();
        assert_ne!(a.digest(), c.digest());
    }
}
