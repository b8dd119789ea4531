//! Editor image references and where they come from.

use serde::{Deserialize, Serialize};

use crate::error::{DirkError, Result};

/// Repository of the GameCI editor images on Docker Hub.
pub const HOSTED_EDITOR_REPOSITORY: &str = "unityci/editor";

/// A container image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    repository: String,
    tag: Option<String>,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: Option<String>) -> Self {
        Self {
            repository: repository.into(),
            tag,
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{}", self.repository, tag),
            None => write!(f, "{}", self.repository),
        }
    }
}

/// The named fields an editor image tag is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub os: String,
    pub unity_version: String,
    pub platform: String,
    pub gameci_version: String,
}

impl ImageSpec {
    /// `{os}-{unity_version}-{platform}-{gameci_version}`; every field must be
    /// non-empty.
    pub fn tag(&self) -> Result<String> {
        let fields = [
            ("target_os", &self.os),
            ("unity_version", &self.unity_version),
            ("platform", &self.platform),
            ("gameci_version", &self.gameci_version),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(DirkError::ConfigValidation {
                    field: name,
                    reason: "must not be empty in an image reference".to_string(),
                });
            }
        }
        Ok(format!(
            "{}-{}-{}-{}",
            self.os, self.unity_version, self.platform, self.gameci_version
        ))
    }
}

/// Registry the editor image is pulled from.
pub trait ImageSource: Send + Sync {
    /// Repository path, including any registry host.
    fn repository(&self) -> String;

    fn editor_image(&self, spec: &ImageSpec) -> Result<ImageRef> {
        Ok(ImageRef::new(self.repository(), Some(spec.tag()?)))
    }
}

/// Public Docker Hub images.
#[derive(Debug, Clone)]
pub struct HostedRegistry {
    repository: String,
}

impl Default for HostedRegistry {
    fn default() -> Self {
        Self {
            repository: HOSTED_EDITOR_REPOSITORY.to_string(),
        }
    }
}

impl HostedRegistry {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
        }
    }
}

impl ImageSource for HostedRegistry {
    fn repository(&self) -> String {
        self.repository.clone()
    }
}

/// Images mirrored into a local or private registry, e.g. `localhost:5000`.
#[derive(Debug, Clone)]
pub struct LocalRegistry {
    host: String,
    repository: String,
}

impl LocalRegistry {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            repository: HOSTED_EDITOR_REPOSITORY.to_string(),
        }
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }
}

impl ImageSource for LocalRegistry {
    fn repository(&self) -> String {
        format!("{}/{}", self.host.trim_end_matches('/'), self.repository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ImageSpec {
        ImageSpec {
            os: "ubuntu".to_string(),
            unity_version: "6000.0.1f1".to_string(),
            platform: "windows-mono".to_string(),
            gameci_version: "3".to_string(),
        }
    }

    #[test]
    fn test_hosted_editor_image() {
        let image = HostedRegistry::default().editor_image(&spec()).unwrap();
        assert_eq!(
            image.to_string(),
            "unityci/editor:ubuntu-6000.0.1f1-windows-mono-3"
        );
    }

    #[test]
    fn test_local_registry_prefixes_host() {
        let image = LocalRegistry::new("localhost:5000/")
            .editor_image(&spec())
            .unwrap();
        assert_eq!(
            image.to_string(),
            "localhost:5000/unityci/editor:ubuntu-6000.0.1f1-windows-mono-3"
        );
    }

    #[test]
    fn test_empty_field_rejected_before_formatting() {
        let mut s = spec();
        s.gameci_version = String::new();
        match HostedRegistry::default().editor_image(&s) {
            Err(DirkError::ConfigValidation { field, .. }) => assert_eq!(field, "gameci_version"),
            other => panic!("expected ConfigValidation, got {:?}", other),
        }
    }

    #[test]
    fn test_untagged_display() {
        assert_eq!(ImageRef::new("eclipse-temurin", None).to_string(), "eclipse-temurin");
    }
}
