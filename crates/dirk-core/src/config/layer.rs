//! A partial configuration layer and the precedence merge.

use crate::config::env_file::EnvFiles;
use crate::config::keys;
use crate::handle::{Directory, FileRef};
use crate::secrets::SecretRef;

/// Values one source contributes. `None` and empty strings mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub user: Option<String>,
    pub password: Option<SecretRef>,
    pub serial: Option<SecretRef>,
    pub license_file: Option<FileRef>,
    pub service_config: Option<FileRef>,
    pub target_os: Option<String>,
    pub platform: Option<String>,
    pub build_target: Option<String>,
    pub build_name: Option<String>,
    pub unity_version: Option<String>,
    pub gameci_version: Option<String>,
    pub testing_platform: Option<String>,
    pub junit_transform: Option<FileRef>,
}

/// Whether a layer value counts as set.
trait Present {
    fn is_present(&self) -> bool;
}

impl Present for String {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Present for SecretRef {
    fn is_present(&self) -> bool {
        !self.name().is_empty()
    }
}

impl Present for FileRef {
    fn is_present(&self) -> bool {
        match self {
            FileRef::Host(p) => !p.as_os_str().is_empty(),
            FileRef::InDirectory { path, .. } | FileRef::InEnvironment { path, .. } => {
                !path.is_empty()
            }
            FileRef::Inline { .. } => true,
        }
    }
}

fn pick<T: Present + Clone>(low: &Option<T>, high: &Option<T>) -> Option<T> {
    match high {
        Some(v) if v.is_present() => Some(v.clone()),
        _ => low.as_ref().filter(|v| v.is_present()).cloned(),
    }
}

impl ConfigLayer {
    /// Built-in defaults: Ubuntu images, GameCI image generation 3.
    pub fn defaults() -> Self {
        Self {
            target_os: Some("ubuntu".to_string()),
            gameci_version: Some("3".to_string()),
            ..Self::default()
        }
    }

    /// `higher` laid over `self`, field by field.
    pub fn overlay(&self, higher: &ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            user: pick(&self.user, &higher.user),
            password: pick(&self.password, &higher.password),
            serial: pick(&self.serial, &higher.serial),
            license_file: pick(&self.license_file, &higher.license_file),
            service_config: pick(&self.service_config, &higher.service_config),
            target_os: pick(&self.target_os, &higher.target_os),
            platform: pick(&self.platform, &higher.platform),
            build_target: pick(&self.build_target, &higher.build_target),
            build_name: pick(&self.build_name, &higher.build_name),
            unity_version: pick(&self.unity_version, &higher.unity_version),
            gameci_version: pick(&self.gameci_version, &higher.gameci_version),
            testing_platform: pick(&self.testing_platform, &higher.testing_platform),
            junit_transform: pick(&self.junit_transform, &higher.junit_transform),
        }
    }

    /// The layer contributed by the project's env files. File paths are
    /// relative to the project root.
    pub fn from_env_files(files: &EnvFiles, source: &Directory) -> Self {
        let text = |key: &str| files.plain_value(key).map(str::to_string);
        let file = |key: &str| {
            files
                .plain_value(key)
                .filter(|p| !p.is_empty())
                .map(|p| source.file(p))
        };
        Self {
            user: text(keys::USER),
            password: files.secret_value(keys::PASS).cloned(),
            serial: files.secret_value(keys::SERIAL).cloned(),
            license_file: file(keys::ULF),
            service_config: file(keys::SERVICE_CONFIG),
            target_os: text(keys::OS),
            platform: text(keys::PLATFORM),
            build_target: text(keys::BUILD_TARGET),
            build_name: text(keys::BUILD_NAME),
            unity_version: text(keys::UNITY_VERSION),
            gameci_version: text(keys::GAMECI_VERSION),
            testing_platform: text(keys::TESTING_PLATFORM),
            junit_transform: file(keys::JUNIT_TRANSFORM),
        }
    }
}

/// Merge defaults < env files < call arguments.
pub fn resolve_layers(
    defaults: &ConfigLayer,
    env: &ConfigLayer,
    args: &ConfigLayer,
) -> ConfigLayer {
    defaults.overlay(env).overlay(args)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn test_call_arg_wins_when_present() {
        let d = ConfigLayer {
            platform: s("linux-mono"),
            ..Default::default()
        };
        let e = ConfigLayer {
            platform: s("windows-mono"),
            ..Default::default()
        };
        let c = ConfigLayer {
            platform: s("mac-mono"),
            ..Default::default()
        };
        assert_eq!(resolve_layers(&d, &e, &c).platform, s("mac-mono"));
    }

    #[test]
    fn test_empty_values_never_erase() {
        let d = ConfigLayer {
            target_os: s("ubuntu"),
            user: s("default-user"),
            ..Default::default()
        };
        let e = ConfigLayer {
            target_os: s(""),
            user: s("env-user"),
            ..Default::default()
        };
        let c = ConfigLayer {
            target_os: None,
            user: s(""),
            ..Default::default()
        };
        let merged = resolve_layers(&d, &e, &c);
        assert_eq!(merged.target_os, s("ubuntu"));
        assert_eq!(merged.user, s("env-user"));
    }

    /// Every combination of `choices` across the three layers resolves to the
    /// highest layer holding a value outside `empties`.
    fn assert_precedence<T>(
        choices: &[Option<T>],
        empties: &[T],
        set: impl Fn(&mut ConfigLayer, Option<T>),
        get: impl Fn(&ConfigLayer) -> Option<T>,
    ) where
        T: Clone + PartialEq + std::fmt::Debug,
    {
        let layer = |v: &Option<T>| {
            let mut l = ConfigLayer::default();
            set(&mut l, v.clone());
            l
        };
        let value = |v: &Option<T>| v.clone().filter(|x| !empties.contains(x));
        for d in choices {
            for e in choices {
                for c in choices {
                    let merged = resolve_layers(&layer(d), &layer(e), &layer(c));
                    let expected = value(c).or_else(|| value(e)).or_else(|| value(d));
                    assert_eq!(get(&merged), expected, "d={d:?} e={e:?} c={c:?}");
                }
            }
        }
    }

    macro_rules! assert_field_precedence {
        ($field:ident, $choices:expr, $empties:expr) => {
            assert_precedence(
                $choices,
                $empties,
                |l, v| l.$field = v,
                |l| l.$field.clone(),
            )
        };
    }

    #[test]
    fn test_precedence_property_for_text_fields() {
        let choices = [None, s(""), s("d"), s("e"), s("c")];
        let empties = [String::new()];
        assert_field_precedence!(user, &choices, &empties);
        assert_field_precedence!(target_os, &choices, &empties);
        assert_field_precedence!(platform, &choices, &empties);
        assert_field_precedence!(build_target, &choices, &empties);
        assert_field_precedence!(build_name, &choices, &empties);
        assert_field_precedence!(unity_version, &choices, &empties);
        assert_field_precedence!(gameci_version, &choices, &empties);
        assert_field_precedence!(testing_platform, &choices, &empties);
    }

    #[test]
    fn test_precedence_property_for_secret_fields() {
        let secret = |name: &str| Some(SecretRef::new(name));
        let choices = [None, secret(""), secret("d:PASS"), secret("e:PASS"), secret("c:PASS")];
        let empties = [SecretRef::new("")];
        assert_field_precedence!(password, &choices, &empties);
        assert_field_precedence!(serial, &choices, &empties);
    }

    #[test]
    fn test_precedence_property_for_file_fields() {
        let project = Directory::host("/game");
        let choices = [
            None,
            Some(FileRef::Host(PathBuf::new())),
            Some(FileRef::InDirectory {
                dir: project.clone(),
                path: String::new(),
            }),
            Some(FileRef::Host(PathBuf::from("/keys/d.ulf"))),
            Some(project.file("e.ulf")),
            Some(FileRef::Inline {
                name: "c.xml".to_string(),
                contents: String::new(),
            }),
        ];
        let empties = [
            FileRef::Host(PathBuf::new()),
            FileRef::InDirectory {
                dir: project.clone(),
                path: String::new(),
            },
        ];
        assert_field_precedence!(license_file, &choices, &empties);
        assert_field_precedence!(service_config, &choices, &empties);
        assert_field_precedence!(junit_transform, &choices, &empties);
    }

    #[test]
    fn test_env_file_layer_maps_keys() {
        let files = EnvFiles {
            plain: vec![
                ("USER".to_string(), "dev@example.com".to_string()),
                ("ULF".to_string(), "./Unity_v6000.x.ulf".to_string()),
                ("PLATFORM".to_string(), "windows-mono".to_string()),
                ("UNRELATED".to_string(), "x".to_string()),
            ],
            secret: vec![("PASS".to_string(), SecretRef::new("env:PASS"))],
        };
        let source = Directory::host("/game");
        let layer = ConfigLayer::from_env_files(&files, &source);
        assert_eq!(layer.user, s("dev@example.com"));
        assert_eq!(layer.platform, s("windows-mono"));
        assert_eq!(layer.password, Some(SecretRef::new("env:PASS")));
        assert_eq!(layer.license_file, Some(source.file("Unity_v6000.x.ulf")));
        assert!(layer.serial.is_none());
    }

    #[test]
    fn test_defaults() {
        let d = ConfigLayer::defaults();
        assert_eq!(d.target_os, s("ubuntu"));
        assert_eq!(d.gameci_version, s("3"));
        assert!(d.user.is_none());
    }
}
