//! Python interpreter discovery and version gate.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use tokio::process::Command;
use tracing::debug;

use crate::config::INTERPRETER_CANDIDATES;
use crate::{ConvertError, Result};

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").unwrap());

/// Extract `major.minor.patch` from interpreter output such as `Python 3.11.4`
/// or `Python 3.13.0rc2`.
pub fn parse_interpreter_version(output: &str) -> Option<Version> {
    let caps = VERSION_RE.captures(output)?;
    let major = caps[1].parse().ok()?;
    let minor = caps[2].parse().ok()?;
    let patch = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// Whether `found` satisfies the minimum version.
pub fn meets_minimum(found: &Version, minimum: &Version) -> bool {
    found >= minimum
}

/// Ask an interpreter for its version. `None` when it cannot be run.
pub async fn interpreter_version(interpreter: &Path) -> Option<Version> {
    let output = Command::new(interpreter)
        .arg("--version")
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    // Older interpreters print the version on stderr.
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    parse_interpreter_version(&text)
}

/// First candidate command that answers `--version`.
pub async fn find_interpreter() -> Result<PathBuf> {
    for candidate in INTERPRETER_CANDIDATES {
        let path = PathBuf::from(candidate);
        if let Some(version) = interpreter_version(&path).await {
            debug!("Found interpreter {} ({})", candidate, version);
            return Ok(path);
        }
    }
    Err(ConvertError::InterpreterNotFound {
        tried: INTERPRETER_CANDIDATES.join(", "),
    })
}

/// Fail with `InterpreterTooOld` / `InterpreterNotFound` unless `found`
/// satisfies `minimum`. `label` names the interpreter in the error.
pub fn check_minimum(found: Option<Version>, label: &str, minimum: &Version) -> Result<Version> {
    let found = found.ok_or_else(|| ConvertError::InterpreterNotFound {
        tried: label.to_string(),
    })?;
    if !meets_minimum(&found, minimum) {
        return Err(ConvertError::InterpreterTooOld {
            found: format!("{}.{}", found.major, found.minor),
            required: format!("{}.{}", minimum.major, minimum.minor),
        });
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interpreter_version() {
        assert_eq!(
            parse_interpreter_version("Python 3.11.4\n"),
            Some(Version::new(3, 11, 4))
        );
        assert_eq!(
            parse_interpreter_version("Python 3.13.0rc2"),
            Some(Version::new(3, 13, 0))
        );
        assert_eq!(parse_interpreter_version("Python 3.9"), Some(Version::new(3, 9, 0)));
        assert_eq!(parse_interpreter_version("command not found"), None);
    }

    #[test]
    fn test_meets_minimum() {
        let min = Version::new(3, 9, 0);
        assert!(meets_minimum(&Version::new(3, 9, 0), &min));
        assert!(meets_minimum(&Version::new(3, 12, 1), &min));
        assert!(!meets_minimum(&Version::new(3, 8, 18), &min));
        assert!(!meets_minimum(&Version::new(2, 7, 18), &min));
    }

    #[tokio::test]
    async fn test_missing_interpreter_has_no_version() {
        let version = interpreter_version(Path::new("/nonexistent/bin/python3")).await;
        assert!(version.is_none());
    }

    #[test]
    fn test_check_minimum() {
        let min = Version::new(3, 9, 0);
        assert_eq!(
            check_minimum(Some(Version::new(3, 10, 2)), "python3", &min).unwrap(),
            Version::new(3, 10, 2)
        );

        match check_minimum(None, "/opt/py/bin/python3", &min).unwrap_err() {
            ConvertError::InterpreterNotFound { tried } => assert_eq!(tried, "/opt/py/bin/python3"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = check_minimum(Some(Version::new(3, 8, 18)), "python3", &min).unwrap_err();
        assert_eq!(err.to_string(), "Python 3.9+ required, found 3.8");
    }
}
