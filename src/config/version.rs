//! Version gating for patch sets.
//!
//! A patch set may declare `version_range = ">=0.1.0, <0.3.0"`; it is only
//! applied to a target whose version satisfies the range. The target
//! version comes from the command line or from the workspace manifest
//! (`package.json`, then `Cargo.toml`).

use semver::{Version, VersionReq};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    InvalidVersion { value: String, source: String },
    InvalidRequirement { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid version '{value}': {source}")
            }
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid version requirement '{value}': {source}")
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Check if a version matches a requirement string.
///
/// A missing or blank requirement matches everything.
///
/// ```
/// use region_patcher::config::version::matches_requirement;
///
/// assert!(matches_requirement("0.2.1", Some(">=0.2.0, <0.3.0")).unwrap());
/// assert!(!matches_requirement("0.1.9", Some(">=0.2.0")).unwrap());
/// assert!(matches_requirement("1.0.0", None).unwrap());
/// ```
pub fn matches_requirement(version: &str, requirement: Option<&str>) -> Result<bool, VersionError> {
    let requirement = match requirement.map(str::trim) {
        None | Some("") => return Ok(true),
        Some(req) => req,
    };

    let req = VersionReq::parse(requirement).map_err(|e| VersionError::InvalidRequirement {
        value: requirement.to_string(),
        source: e.to_string(),
    })?;
    let version = Version::parse(version.trim()).map_err(|e| VersionError::InvalidVersion {
        value: version.to_string(),
        source: e.to_string(),
    })?;

    Ok(req.matches(&version))
}

/// Decision for a whole patch set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Apply,
    Skip { reason: String },
}

/// Gate a patch set on `target_version`. Without a target version every
/// patch set applies.
pub fn gate(
    version_range: Option<&str>,
    target_version: Option<&str>,
) -> Result<Gate, VersionError> {
    let Some(target) = target_version else {
        return Ok(Gate::Apply);
    };

    if matches_requirement(target, version_range)? {
        return Ok(Gate::Apply);
    }

    let range = version_range.unwrap_or_default().trim();
    Ok(Gate::Skip {
        reason: format!("target version {target} does not satisfy version_range {range}"),
    })
}

/// Read the target's version from `package.json` or `Cargo.toml` in
/// `workspace`.
pub fn detect_target_version(workspace: &Path) -> Option<String> {
    let from_package_json = || {
        let raw = fs::read_to_string(workspace.join("package.json")).ok()?;
        let json: serde_json::Value = serde_json::from_str(&raw).ok()?;
        json.get("version")?.as_str().map(str::to_owned)
    };

    let from_cargo_toml = || {
        let raw = fs::read_to_string(workspace.join("Cargo.toml")).ok()?;
        let doc = raw.parse::<toml_edit::DocumentMut>().ok()?;
        doc.get("package")
            .or_else(|| doc.get("workspace").and_then(|ws| ws.get("package")))?
            .get("version")?
            .as_str()
            .map(str::to_owned)
    };

    from_package_json()
        .or_else(from_cargo_toml)
        .filter(|version| Version::parse(version).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_requirement_matches() {
        assert!(matches_requirement("0.1.0", None).unwrap());
        assert!(matches_requirement("0.1.0", Some("  ")).unwrap());
    }

    #[test]
    fn test_compound_range() {
        let req = Some(">=0.2.0, <0.3.0");
        assert!(matches_requirement("0.2.0", req).unwrap());
        assert!(matches_requirement("0.2.9", req).unwrap());
        assert!(!matches_requirement("0.3.0", req).unwrap());
        assert!(!matches_requirement("0.1.9", req).unwrap());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            matches_requirement("latest", Some(">=0.1.0")),
            Err(VersionError::InvalidVersion { .. })
        ));
        assert!(matches!(
            matches_requirement("0.1.0", Some(">=soon")),
            Err(VersionError::InvalidRequirement { .. })
        ));
    }

    #[test]
    fn test_gate_without_target_applies() {
        assert_eq!(gate(Some(">=9.0.0"), None).unwrap(), Gate::Apply);
    }

    #[test]
    fn test_gate_skips_with_reason() {
        match gate(Some(">=0.2.0"), Some("0.1.0")).unwrap() {
            Gate::Skip { reason } => assert!(reason.contains(">=0.2.0")),
            Gate::Apply => panic!("0.1.0 should not satisfy >=0.2.0"),
        }
    }

    #[test]
    fn test_detect_from_package_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "consult-app", "version": "0.2.4", "private": true }"#,
        )
        .unwrap();
        assert_eq!(detect_target_version(dir.path()).as_deref(), Some("0.2.4"));
    }

    #[test]
    fn test_detect_from_cargo_toml_workspace() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Cargo.toml"),
            "[workspace]\nmembers = []\n\n[workspace.package]\nversion = \"1.4.0\"\n",
        )
        .unwrap();
        assert_eq!(detect_target_version(dir.path()).as_deref(), Some("1.4.0"));
    }

    #[test]
    fn test_detect_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_target_version(dir.path()), None);
    }
}
