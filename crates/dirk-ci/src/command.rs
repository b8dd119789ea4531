//! Toolchain argument vectors and well-known paths.
//!
//! Everything here is pure data: no engine access, no shell.

use dirk_core::{Invocation, SecretRef};

/// Project sources inside the environment.
pub const SOURCE_MOUNT: &str = "/src";
/// Persistent editor cache.
pub const LIBRARY_CACHE_MOUNT: &str = "/src/Library/";
pub const BUILDS_DIR: &str = "/builds";
pub const RESULTS_DIR: &str = "/results";

pub const PERSONAL_LICENSE_PATH: &str = "/root/.local/share/unity3d/Unity/Unity_lic.ulf";
pub const SERVICES_CONFIG_PATH: &str = "/usr/share/unity3d/config/services-config.json";
pub const LICENSING_CLIENT: &str =
    "/opt/unity/Editor/Data/Resources/Licensing/Client/Unity.Licensing.Client";

/// Static method the project exposes for batch builds.
pub const BUILD_METHOD: &str = "BuildCommand.PerformBuild";

pub const COVERAGE_OPTIONS: &str = "generateAdditionalMetrics;generateHtmlReport;generateHtmlReportHistory;generateBadgeReport;verbosity:verbose";

/// Headless display wrapper, editor binary and `-nographics`.
pub fn base_command() -> Invocation {
    Invocation::new("xvfb-run")
        .arg("--auto-servernum")
        .arg("--server-args=-screen 0 640x480x24")
        .arg("unity-editor")
        .arg("-nographics")
}

pub fn build_command(build_target: &str, build_name: &str) -> Invocation {
    base_command()
        .args(["-projectPath", SOURCE_MOUNT])
        .args(["-buildTarget", build_target])
        .args(["-customBuildPath", "/builds/"])
        .args(["-customBuildName", build_name])
        .args(["-customBuildTarget", build_target])
        .arg("-quit")
        .args(["-executeMethod", BUILD_METHOD])
        .args(["-logFile", "/builds/unity.log"])
}

pub fn test_command(testing_platform: &str) -> Invocation {
    base_command()
        .args(["-projectPath", SOURCE_MOUNT])
        .arg("-runTests")
        .args(["-testResults".to_string(), results_file(testing_platform)])
        .arg("-debugCodeOptimization")
        .arg("-enableCodeCoverage")
        .args([
            "-coverageResultsPath".to_string(),
            format!("{}/{}-coverage/", RESULTS_DIR, testing_platform),
        ])
        .args([
            "-coverageHistoryPath".to_string(),
            format!("{}/{}-coverage-history/", RESULTS_DIR, testing_platform),
        ])
        .args(["-testPlatform", testing_platform])
        .args(["-coverageOptions", COVERAGE_OPTIONS])
        .args(["-logFile", "/results/unity.log"])
}

/// Raw test results written by the editor.
pub fn results_file(testing_platform: &str) -> String {
    format!("{}/{}-results.xml", RESULTS_DIR, testing_platform)
}

/// Transformed (JUnit) test results.
pub fn junit_results_file(testing_platform: &str) -> String {
    format!("{}/{}-junit-results.xml", RESULTS_DIR, testing_platform)
}

/// Editor license registration. `-password` is omitted when no password is
/// configured; `-serial` is added for serial activation.
pub fn register_command(
    username: &str,
    password: Option<&SecretRef>,
    serial: Option<&SecretRef>,
) -> Invocation {
    let mut cmd = base_command()
        .arg("-quit")
        .arg("-batchmode")
        .args(["-username", username]);
    if let Some(password) = password {
        cmd = cmd.arg("-password").secret(password.clone());
    }
    if let Some(serial) = serial {
        cmd = cmd.arg("-serial").secret(serial.clone());
    }
    cmd
}

pub fn floating_license_command() -> Invocation {
    Invocation::new(LICENSING_CLIENT).arg("--acquire-floating")
}

pub fn return_license_command() -> Invocation {
    base_command()
        .arg("-quit")
        .arg("-batchmode")
        .arg("-returnlicense")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_command_is_plain_argv() {
        assert_eq!(
            base_command().redacted(),
            vec![
                "xvfb-run",
                "--auto-servernum",
                "--server-args=-screen 0 640x480x24",
                "unity-editor",
                "-nographics"
            ]
        );
    }

    #[test]
    fn test_build_command_flags() {
        let argv = build_command("StandaloneWindows64", "game").redacted();
        let tail: Vec<_> = argv[5..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "-projectPath",
                "/src",
                "-buildTarget",
                "StandaloneWindows64",
                "-customBuildPath",
                "/builds/",
                "-customBuildName",
                "game",
                "-customBuildTarget",
                "StandaloneWindows64",
                "-quit",
                "-executeMethod",
                "BuildCommand.PerformBuild",
                "-logFile",
                "/builds/unity.log",
            ]
        );
    }

    #[test]
    fn test_test_command_keys_paths_by_platform() {
        let cmd = test_command("playmode");
        let argv = cmd.redacted();
        assert!(argv.contains(&"/results/playmode-results.xml".to_string()));
        assert!(argv.contains(&"/results/playmode-coverage/".to_string()));
        assert!(argv.contains(&"/results/playmode-coverage-history/".to_string()));
        assert!(argv.contains(&COVERAGE_OPTIONS.to_string()));
        assert!(cmd.has_flag("-runTests"));
        assert!(!cmd.has_flag("-quit"));
    }

    #[test]
    fn test_register_command_redacts_secrets() {
        let pass = SecretRef::new("arg:pass");
        let serial = SecretRef::new("arg:serial");
        let argv = register_command("dev@example.com", Some(&pass), Some(&serial)).redacted();
        let tail: Vec<_> = argv[5..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "-quit",
                "-batchmode",
                "-username",
                "dev@example.com",
                "-password",
                "***",
                "-serial",
                "***"
            ]
        );
    }

    #[test]
    fn test_register_without_password() {
        let cmd = register_command("dev", None, None);
        assert!(!cmd.has_flag("-password"));
        assert!(!cmd.has_flag("-serial"));
    }

    #[test]
    fn test_junit_file_name() {
        assert_eq!(results_file("editmode"), "/results/editmode-results.xml");
        assert_eq!(
            junit_results_file("editmode"),
            "/results/editmode-junit-results.xml"
        );
    }
}
