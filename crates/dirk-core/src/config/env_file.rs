//! `KEY=VALUE` env files shipped with the project.

use tracing::{debug, warn};

use crate::config::keys;
use crate::config::run_config::RunKind;
use crate::engine::{EngineError, ExecutionEngine};
use crate::error::{ParseError, Result};
use crate::handle::Directory;
use crate::secrets::{SecretRef, SecretScope, SecretStore};

/// Parse newline-separated `KEY=VALUE` records.
///
/// Only the first `=` separates key from value, so values may contain `=`.
/// Blank lines and `#` comments are skipped; a record with no `=` fails the
/// whole file.
pub fn parse_env_file(
    source_name: &str,
    content: &str,
) -> std::result::Result<Vec<(String, String)>, ParseError> {
    let mut pairs = Vec::new();
    for (idx, raw) in content.split('\n').enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| ParseError::MalformedRecord {
            source_name: source_name.to_string(),
            line: idx + 1,
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ParseError::EmptyKey {
                source_name: source_name.to_string(),
                line: idx + 1,
            });
        }
        pairs.push((key.to_string(), value.to_string()));
    }
    Ok(pairs)
}

/// The plain and secret env file names for a run kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvFileNames {
    pub plain: &'static str,
    pub secret: &'static str,
}

impl EnvFileNames {
    pub fn for_kind(kind: RunKind) -> Self {
        match kind {
            RunKind::Build => Self {
                plain: "unity.env",
                secret: "unity_secrets.env",
            },
            RunKind::Test => Self {
                plain: "unity_test.env",
                secret: "unity_test_secrets.env",
            },
        }
    }

    /// Secret files of every run kind, kept out of the prepared sources.
    pub fn all_secret_files() -> [&'static str; 2] {
        [
            Self::for_kind(RunKind::Build).secret,
            Self::for_kind(RunKind::Test).secret,
        ]
    }
}

/// Loaded env files: plain pairs and secrets registered in the store.
#[derive(Debug, Clone, Default)]
pub struct EnvFiles {
    pub plain: Vec<(String, String)>,
    pub secret: Vec<(String, SecretRef)>,
}

impl EnvFiles {
    /// Read both env files for `kind` from the project root.
    ///
    /// A missing file is treated as empty. Secret values go straight into
    /// `secrets` under names unique to this load, and only their handles are
    /// kept. Credentials found in the plain file are moved to the secrets;
    /// the secret file wins when both carry the same key.
    pub async fn load(
        engine: &dyn ExecutionEngine,
        secrets: &dyn SecretStore,
        source: &Directory,
        kind: RunKind,
    ) -> Result<Self> {
        let names = EnvFileNames::for_kind(kind);
        let scope = SecretScope::new("env");

        let mut plain = Vec::new();
        let mut secret = Vec::new();
        if let Some(content) = read_optional(engine, source, names.plain).await? {
            for (key, value) in parse_env_file(names.plain, &content)? {
                if is_credential(&key) {
                    warn!(
                        file = names.plain,
                        key = %key,
                        "Credential found in plain env file; move it to {}",
                        names.secret
                    );
                    let handle = scope.register(secrets, &key, &value);
                    secret.push((key, handle));
                } else {
                    plain.push((key, value));
                }
            }
        }

        if let Some(content) = read_optional(engine, source, names.secret).await? {
            for (key, value) in parse_env_file(names.secret, &content)? {
                let handle = scope.register(secrets, &key, &value);
                secret.push((key, handle));
            }
        }

        debug!(
            plain = plain.len(),
            secret = secret.len(),
            "Loaded env files for {} run",
            kind
        );
        Ok(Self { plain, secret })
    }

    pub fn plain_value(&self, key: &str) -> Option<&str> {
        self.plain
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn secret_value(&self, key: &str) -> Option<&SecretRef> {
        self.secret.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

fn is_credential(key: &str) -> bool {
    key == keys::PASS || key == keys::SERIAL
}

async fn read_optional(
    engine: &dyn ExecutionEngine,
    source: &Directory,
    name: &str,
) -> Result<Option<String>> {
    match engine.contents(&source.file(name)).await {
        Ok(content) => Ok(Some(content)),
        Err(EngineError::NotFound { .. }) => {
            debug!(file = name, "Env file not present");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
