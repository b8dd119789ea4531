//! License strategy selection, acquisition and release.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dirk_core::{
    Credentials, DirkError, Environment, ExecOutput, ExecutionEngine, Expect, Invocation, Result,
    SecretStore,
};

use crate::command::{
    floating_license_command, register_command, return_license_command, PERSONAL_LICENSE_PATH,
    SERVICES_CONFIG_PATH,
};
use crate::report::{StepKind, StepRecord};

/// One license acquisition mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseGrant {
    /// `.ulf` installed, then editor registration.
    PersonalFile,
    /// Editor registration with a serial.
    Serial,
    /// Seat checked out from a floating license server.
    Floating,
}

impl std::fmt::Display for LicenseGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LicenseGrant::PersonalFile => "personal_file",
            LicenseGrant::Serial => "serial",
            LicenseGrant::Floating => "floating",
        };
        write!(f, "{}", name)
    }
}

/// Grants implied by the present credentials, in acquisition order.
pub fn plan_grants(credentials: &Credentials) -> Vec<LicenseGrant> {
    let mut grants = Vec::new();
    if credentials.license_file.is_some() {
        grants.push(LicenseGrant::PersonalFile);
    }
    if credentials.serial.is_some() {
        grants.push(LicenseGrant::Serial);
    }
    if credentials.service_config.is_some() {
        grants.push(LicenseGrant::Floating);
    }
    grants
}

/// Applies grants to an environment and returns the license afterwards.
pub struct LicenseManager {
    engine: Arc<dyn ExecutionEngine>,
    secrets: Arc<dyn SecretStore>,
}

impl LicenseManager {
    pub fn new(engine: Arc<dyn ExecutionEngine>, secrets: Arc<dyn SecretStore>) -> Self {
        Self { engine, secrets }
    }

    /// Acquire one grant. Registration exit codes are recorded, not raised.
    pub async fn apply(
        &self,
        env: &Environment,
        grant: LicenseGrant,
        credentials: &Credentials,
    ) -> Result<(Environment, StepRecord)> {
        info!(grant = %grant, "Acquiring license");
        let (env, cmd) = match grant {
            LicenseGrant::PersonalFile => {
                let file = credentials
                    .license_file
                    .clone()
                    .ok_or_else(|| DirkError::missing("license_file"))?;
                let env = env.clone().with_file(PERSONAL_LICENSE_PATH, file);
                let cmd = register_command(
                    &credentials.username,
                    credentials.password.as_ref(),
                    None,
                );
                (env, cmd)
            }
            LicenseGrant::Serial => {
                let serial = credentials
                    .serial
                    .as_ref()
                    .ok_or_else(|| DirkError::missing("serial"))?;
                // Dereferenced before anything runs.
                self.secrets.plaintext(serial).await?;
                let cmd = register_command(
                    &credentials.username,
                    credentials.password.as_ref(),
                    Some(serial),
                );
                (env.clone(), cmd)
            }
            LicenseGrant::Floating => {
                let file = credentials
                    .service_config
                    .clone()
                    .ok_or_else(|| DirkError::missing("service_config"))?;
                let env = env.clone().with_file(SERVICES_CONFIG_PATH, file);
                (env, floating_license_command())
            }
        };

        let (env, step) = self.run(&env, &cmd, StepKind::Grant(grant)).await?;
        if !step.passed() {
            warn!(
                grant = %grant,
                exit_code = step.exit_code,
                "License registration exited non-zero"
            );
        }
        Ok((env, step))
    }

    /// Return the editor license.
    pub async fn release(&self, env: &Environment) -> Result<(Environment, StepRecord)> {
        info!("Returning license");
        self.run(env, &return_license_command(), StepKind::Release)
            .await
    }

    async fn run(
        &self,
        env: &Environment,
        cmd: &Invocation,
        kind: StepKind,
    ) -> Result<(Environment, StepRecord)> {
        let start = Instant::now();
        let (env, ExecOutput { exit_code, .. }) = self.engine.exec(env, cmd, Expect::Any).await?;
        Ok((
            env,
            StepRecord {
                kind,
                argv: cmd.redacted(),
                exit_code,
                duration_ms: start.elapsed().as_millis() as u64,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirk_core::fakes::{EngineEvent, ExecRule, MemoryEngine};
    use dirk_core::{FileRef, ImageRef, MemorySecretStore, SecretRef};

    fn credentials() -> Credentials {
        Credentials {
            username: "dev@example.com".to_string(),
            password: None,
            serial: None,
            license_file: None,
            service_config: None,
        }
    }

    fn setup() -> (Arc<MemorySecretStore>, Arc<MemoryEngine>, LicenseManager) {
        let secrets = Arc::new(MemorySecretStore::new());
        let engine = Arc::new(
            MemoryEngine::new(secrets.clone())
                .with_host_file("/keys/Unity_lic.ulf", "<License/>")
                .with_host_file("/keys/services-config.json", "{}"),
        );
        let manager = LicenseManager::new(engine.clone(), secrets.clone());
        (secrets, engine, manager)
    }

    #[test]
    fn test_plan_follows_presence_in_fixed_order() {
        let mut creds = credentials();
        assert!(plan_grants(&creds).is_empty());

        creds.service_config = Some(FileRef::Host("/keys/services-config.json".into()));
        creds.serial = Some(SecretRef::new("serial"));
        assert_eq!(
            plan_grants(&creds),
            vec![LicenseGrant::Serial, LicenseGrant::Floating]
        );

        creds.license_file = Some(FileRef::Host("/keys/Unity_lic.ulf".into()));
        assert_eq!(
            plan_grants(&creds),
            vec![
                LicenseGrant::PersonalFile,
                LicenseGrant::Serial,
                LicenseGrant::Floating
            ]
        );
    }

    #[test]
    fn test_password_alone_plans_no_grant() {
        let mut creds = credentials();
        creds.password = Some(SecretRef::new("pass"));
        assert!(plan_grants(&creds).is_empty());
    }

    #[tokio::test]
    async fn test_personal_file_installs_license() {
        let (secrets, engine, manager) = setup();
        let mut creds = credentials();
        creds.password = Some(secrets.set_secret("arg:pass", "hunter2"));
        creds.license_file = Some(FileRef::Host("/keys/Unity_lic.ulf".into()));

        let env = engine
            .new_environment(&ImageRef::new("unityci/editor", None))
            .await
            .unwrap();
        let (env, step) = manager
            .apply(&env, LicenseGrant::PersonalFile, &creds)
            .await
            .unwrap();

        assert_eq!(step.kind, StepKind::Grant(LicenseGrant::PersonalFile));
        assert!(step.argv.contains(&"-password".to_string()));
        assert!(!step.argv.contains(&"hunter2".to_string()));
        assert_eq!(
            engine.contents(&env.file(PERSONAL_LICENSE_PATH)).await.unwrap(),
            "<License/>"
        );
        assert!(engine.resolved_argvs()[0].contains(&"hunter2".to_string()));
    }

    #[tokio::test]
    async fn test_serial_with_unknown_secret_fails_before_exec() {
        let (_, engine, manager) = setup();
        let mut creds = credentials();
        creds.serial = Some(SecretRef::new("never-registered"));

        let env = engine
            .new_environment(&ImageRef::new("unityci/editor", None))
            .await
            .unwrap();
        let err = manager
            .apply(&env, LicenseGrant::Serial, &creds)
            .await
            .unwrap_err();

        assert!(matches!(err, DirkError::SecretAccess(_)));
        assert!(engine.exec_argvs().is_empty());
    }

    #[tokio::test]
    async fn test_floating_uses_licensing_client() {
        let (_, engine, manager) = setup();
        let mut creds = credentials();
        creds.service_config = Some(FileRef::Host("/keys/services-config.json".into()));

        let env = engine
            .new_environment(&ImageRef::new("unityci/editor", None))
            .await
            .unwrap();
        let (env, step) = manager
            .apply(&env, LicenseGrant::Floating, &creds)
            .await
            .unwrap();

        assert_eq!(step.argv[1], "--acquire-floating");
        assert_eq!(
            engine.contents(&env.file(SERVICES_CONFIG_PATH)).await.unwrap(),
            "{}"
        );
    }

    #[tokio::test]
    async fn test_release_records_exit_code_without_failing() {
        let engine = Arc::new(
            MemoryEngine::new(Arc::new(MemorySecretStore::new()))
                .on_exec(ExecRule::matching("-returnlicense").exit_code(1)),
        );
        let manager = LicenseManager::new(engine.clone(), Arc::new(MemorySecretStore::new()));
        let env = engine
            .new_environment(&ImageRef::new("unityci/editor", None))
            .await
            .unwrap();

        let (_, step) = manager.release(&env).await.unwrap();
        assert_eq!(step.kind, StepKind::Release);
        assert_eq!(step.exit_code, 1);
        assert!(matches!(
            engine.events().last(),
            Some(EngineEvent::Exec { exit_code: 1, .. })
        ));
    }
}
