//! Secret references and the in-process secret store.
//!
//! Secrets travel through configuration and command vectors as opaque
//! [`SecretRef`] handles. Plaintext is only produced by
//! [`SecretStore::plaintext`], which engines call at execution time.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque handle to a secret held by a [`SecretStore`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef {
    name: String,
}

impl SecretRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretRef({})", self.name)
    }
}

/// A secret reference could not be turned into plaintext.
#[derive(Debug, thiserror::Error)]
#[error("cannot access secret '{name}': {reason}")]
pub struct SecretAccessError {
    pub name: String,
    pub reason: String,
}

/// Names the secrets one run registers.
///
/// Every scope carries its own id, so two runs sharing a store never bind
/// the same name and never see each other's values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretScope {
    origin: &'static str,
    id: Uuid,
}

impl SecretScope {
    /// `origin` tags where the values come from, e.g. `env` or `arg`.
    pub fn new(origin: &'static str) -> Self {
        Self {
            origin,
            id: Uuid::new_v4(),
        }
    }

    /// `{origin}:{id}:{key}`
    pub fn name(&self, key: &str) -> String {
        format!("{}:{}:{}", self.origin, self.id.simple(), key)
    }

    pub fn register(&self, store: &dyn SecretStore, key: &str, plaintext: &str) -> SecretRef {
        store.set_secret(&self.name(key), plaintext)
    }
}

/// Secret storage capability.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Register `plaintext` under `name` and return a handle to it.
    /// Registering an existing name replaces its value.
    fn set_secret(&self, name: &str, plaintext: &str) -> SecretRef;

    /// Dereference a handle.
    async fn plaintext(&self, secret: &SecretRef) -> Result<String, SecretAccessError>;
}

/// Secret store backed by a process-local map.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    fn set_secret(&self, name: &str, plaintext: &str) -> SecretRef {
        let mut secrets = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        secrets.insert(name.to_string(), plaintext.to_string());
        SecretRef::new(name)
    }

    async fn plaintext(&self, secret: &SecretRef) -> Result<String, SecretAccessError> {
        let secrets = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        secrets
            .get(secret.name())
            .cloned()
            .ok_or_else(|| SecretAccessError {
                name: secret.name().to_string(),
                reason: "no such secret registered".to_string(),
            })
    }
}
