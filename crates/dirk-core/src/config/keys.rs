//! Configuration keys.
//!
//! Project env files use the bare keys. The process environment is read by
//! the CLI under [`ENV_PREFIX`] so that names like `USER` never collide with
//! the shell's own variables.

pub const ENV_PREFIX: &str = "DIRK_";

pub const USER: &str = "USER";
pub const PASS: &str = "PASS";
pub const SERIAL: &str = "SERIAL";
pub const ULF: &str = "ULF";
pub const SERVICE_CONFIG: &str = "SERVICE_CONFIG";
pub const OS: &str = "OS";
pub const PLATFORM: &str = "PLATFORM";
pub const BUILD_TARGET: &str = "BUILD_TARGET";
pub const BUILD_NAME: &str = "BUILD_NAME";
pub const UNITY_VERSION: &str = "UNITY_VERSION";
pub const GAMECI_VERSION: &str = "GAMECI_VERSION";
pub const TESTING_PLATFORM: &str = "TESTING_PLATFORM";
pub const JUNIT_TRANSFORM: &str = "JUNIT_TRANSFORM";

/// Every recognised key.
pub const ALL: &[&str] = &[
    USER,
    PASS,
    SERIAL,
    ULF,
    SERVICE_CONFIG,
    OS,
    PLATFORM,
    BUILD_TARGET,
    BUILD_NAME,
    UNITY_VERSION,
    GAMECI_VERSION,
    TESTING_PLATFORM,
    JUNIT_TRANSFORM,
];

/// Process environment name for a key.
pub fn prefixed(key: &str) -> String {
    format!("{}{}", ENV_PREFIX, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed() {
        assert_eq!(prefixed(USER), "DIRK_USER");
        assert_eq!(prefixed(JUNIT_TRANSFORM), "DIRK_JUNIT_TRANSFORM");
    }

    #[test]
    fn test_keys_unique() {
        let mut seen = std::collections::HashSet::new();
        for key in ALL {
            assert!(seen.insert(*key), "duplicate key {key}");
        }
    }
}
