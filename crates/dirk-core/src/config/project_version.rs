//! Unity project version detection.

use crate::engine::ExecutionEngine;
use crate::error::{ParseError, Result};
use crate::handle::Directory;

/// Location of the version file relative to the project root.
pub const PROJECT_VERSION_PATH: &str = "ProjectSettings/ProjectVersion.txt";

/// Extract the editor version from `ProjectVersion.txt` content.
///
/// The first line looks like `m_EditorVersion: 6000.0.1f1`; the version is
/// whatever follows the first `": "`.
pub fn parse_project_version(content: &str) -> std::result::Result<String, ParseError> {
    let first = content.lines().next().unwrap_or_default();
    let (_, version) = first
        .split_once(": ")
        .ok_or_else(|| ParseError::ProjectVersion {
            path: PROJECT_VERSION_PATH.to_string(),
            reason: "first line has no ': ' separator".to_string(),
        })?;
    let version = version.trim();
    if version.is_empty() {
        return Err(ParseError::ProjectVersion {
            path: PROJECT_VERSION_PATH.to_string(),
            reason: "version is empty".to_string(),
        });
    }
    Ok(version.to_string())
}

/// Read and parse the version file from the project sources.
pub async fn read_project_version(
    engine: &dyn ExecutionEngine,
    source: &Directory,
) -> Result<String> {
    let content = engine.contents(&source.file(PROJECT_VERSION_PATH)).await?;
    Ok(parse_project_version(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_line() {
        let content = "m_EditorVersion: 6000.0.1f1\nm_EditorVersionWithRevision: 6000.0.1f1 (abc)\n";
        assert_eq!(parse_project_version(content).unwrap(), "6000.0.1f1");
    }

    #[test]
    fn test_windows_line_endings() {
        let content = "m_EditorVersion: 2022.3.10f1\r\nm_EditorVersionWithRevision: x\r\n";
        assert_eq!(parse_project_version(content).unwrap(), "2022.3.10f1");
    }

    #[test]
    fn test_unexpected_layout() {
        assert!(parse_project_version("").is_err());
        assert!(parse_project_version("m_EditorVersion 6000\n").is_err());
        assert!(parse_project_version("m_EditorVersion: \n").is_err());
    }
}
