//! Patch set applicator.
//!
//! Patches are grouped by target file. Each file is read once, its patches
//! are applied in order to the in-memory [`Document`], and the result is
//! written back in a single atomic write. If any patch of a file fails, the
//! whole file is left alone and its other patches report
//! [`ApplicationError::Aborted`].

use crate::config::schema::{PatchConfig, PatchDefinition};
use crate::config::version::{gate, Gate, VersionError};
use crate::document::Document;
use crate::file::{read_document, write_document, FileError};
use crate::observe::TracingObserver;
use crate::patch::{Outcome, RegionPatcher};
use crate::region::{Region, RegionError};
use crate::safety::{SafetyError, WorkspaceGuard};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Result of applying a single patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// Patch was applied (or, when checking, would be)
    Applied {
        file: PathBuf,
        lines_before: usize,
        lines_after: usize,
        regions: Vec<Region>,
    },
    /// Replacement already in place
    AlreadyApplied { file: PathBuf },
    /// Patch set skipped by its version range
    SkippedVersion { reason: String },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied {
                file,
                lines_before,
                lines_after,
                ..
            } => write!(
                f,
                "Applied to {} ({} -> {} lines)",
                file.display(),
                lines_before,
                lines_after
            ),
            PatchResult::AlreadyApplied { file } => {
                write!(f, "Already applied to {}", file.display())
            }
            PatchResult::SkippedVersion { reason } => write!(f, "Skipped (version): {}", reason),
        }
    }
}

/// Errors during patch application
#[derive(Debug)]
pub enum ApplicationError {
    Version(VersionError),
    Safety(SafetyError),
    File(FileError),
    /// Locating, verifying or replacing the region failed
    Region { file: PathBuf, source: RegionError },
    /// Another patch on the same file failed, so nothing was written
    Aborted { file: PathBuf, failed_patch: String },
}

impl ApplicationError {
    pub fn region_error(&self) -> Option<&RegionError> {
        match self {
            ApplicationError::Region { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Version(e) => write!(f, "version error: {}", e),
            ApplicationError::Safety(e) => write!(f, "unsafe target: {}", e),
            ApplicationError::File(e) => write!(f, "{}", e),
            ApplicationError::Region { file, source } => {
                write!(f, "{} in {}", source, file.display())
            }
            ApplicationError::Aborted { file, failed_patch } => write!(
                f,
                "not written: patch '{}' failed on {}",
                failed_patch,
                file.display()
            ),
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Version(e) => Some(e),
            ApplicationError::Safety(e) => Some(e),
            ApplicationError::File(e) => Some(e),
            ApplicationError::Region { source, .. } => Some(source),
            ApplicationError::Aborted { .. } => None,
        }
    }
}

impl From<VersionError> for ApplicationError {
    fn from(e: VersionError) -> Self {
        ApplicationError::Version(e)
    }
}

impl From<SafetyError> for ApplicationError {
    fn from(e: SafetyError) -> Self {
        ApplicationError::Safety(e)
    }
}

impl From<FileError> for ApplicationError {
    fn from(e: FileError) -> Self {
        ApplicationError::File(e)
    }
}

pub type PatchOutcome = (String, Result<PatchResult, ApplicationError>);

/// Everything computed for one target file.
#[derive(Debug)]
pub struct FilePlan {
    pub path: PathBuf,
    /// Contents as read, if the file could be read
    pub before: Option<Document>,
    /// Contents after every patch, if none failed
    pub after: Option<Document>,
    pub results: Vec<PatchOutcome>,
}

impl FilePlan {
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|(_, result)| result.is_err())
    }

    /// Whether writing the plan would change the file.
    pub fn is_changed(&self) -> bool {
        match (&self.before, &self.after) {
            (Some(before), Some(after)) => before != after,
            _ => false,
        }
    }
}

/// Apply a patch set and write every changed file.
///
/// # Arguments
///
/// * `config` - The patch set
/// * `workspace_root` - Root that workspace-relative `file` entries resolve against
/// * `target_version` - Version of the target, if version gating is wanted
///
/// # Returns
///
/// One result per patch, in patch set order
pub fn apply_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    target_version: Option<&str>,
) -> Vec<PatchOutcome> {
    let mut plans = plan_patches(config, workspace_root, target_version);
    for plan in &mut plans {
        commit_plan(plan);
    }
    in_config_order(config, plans)
}

/// Compute patch results without touching any file.
///
/// `Applied` means "would apply".
pub fn check_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    target_version: Option<&str>,
) -> Vec<PatchOutcome> {
    in_config_order(config, plan_patches(config, workspace_root, target_version))
}

/// Compute one [`FilePlan`] per target file, in order of first appearance.
pub fn plan_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    target_version: Option<&str>,
) -> Vec<FilePlan> {
    let groups = group_by_file(config, workspace_root);

    let decision = match gate(config.meta.version_range.as_deref(), target_version) {
        Ok(decision) => decision,
        Err(e) => {
            return groups
                .into_iter()
                .map(|(path, patches)| FilePlan {
                    path,
                    before: None,
                    after: None,
                    results: patches
                        .iter()
                        .map(|patch| (patch.id.clone(), Err(ApplicationError::Version(e.clone()))))
                        .collect(),
                })
                .collect();
        }
    };

    groups
        .into_iter()
        .map(|(path, patches)| match &decision {
            Gate::Skip { reason } => FilePlan {
                path,
                before: None,
                after: None,
                results: patches
                    .iter()
                    .map(|patch| {
                        (
                            patch.id.clone(),
                            Ok(PatchResult::SkippedVersion {
                                reason: reason.clone(),
                            }),
                        )
                    })
                    .collect(),
            },
            Gate::Apply => plan_file(config, workspace_root, path, &patches),
        })
        .collect()
}

/// Write a plan's result if it changed the file and nothing failed.
///
/// On a write error the plan's applied patches are turned into errors.
pub fn commit_plan(plan: &mut FilePlan) {
    if plan.has_failures() {
        tracing::warn!(path = %plan.path.display(), "patch failed, file left unchanged");
        return;
    }
    if !plan.is_changed() {
        return;
    }
    let Some(after) = &plan.after else {
        return;
    };

    if let Err(err) = write_document(&plan.path, after) {
        let is_applied = |result: &Result<PatchResult, ApplicationError>| {
            matches!(result, Ok(PatchResult::Applied { .. }))
        };
        let first_applied = plan
            .results
            .iter()
            .find(|(_, result)| is_applied(result))
            .map(|(id, _)| id.clone())
            .unwrap_or_default();

        let mut err = Some(err);
        for (_, result) in &mut plan.results {
            if !is_applied(&*result) {
                continue;
            }
            *result = match err.take() {
                Some(e) => Err(ApplicationError::File(e)),
                None => Err(ApplicationError::Aborted {
                    file: plan.path.clone(),
                    failed_patch: first_applied.clone(),
                }),
            };
        }
        plan.after = None;
    }
}

fn resolve_path(config: &PatchConfig, workspace_root: &Path, patch: &PatchDefinition) -> PathBuf {
    if config.meta.workspace_relative {
        workspace_root.join(&patch.file)
    } else {
        PathBuf::from(&patch.file)
    }
}

fn group_by_file<'a>(
    config: &'a PatchConfig,
    workspace_root: &Path,
) -> Vec<(PathBuf, Vec<&'a PatchDefinition>)> {
    let mut groups: Vec<(PathBuf, Vec<&PatchDefinition>)> = Vec::new();
    let mut index: HashMap<PathBuf, usize> = HashMap::new();

    for patch in &config.patches {
        let path = resolve_path(config, workspace_root, patch);
        match index.get(&path) {
            Some(&idx) => groups[idx].1.push(patch),
            None => {
                index.insert(path.clone(), groups.len());
                groups.push((path, vec![patch]));
            }
        }
    }

    groups
}

/// Read one file and apply its patches in memory.
fn plan_file(
    config: &PatchConfig,
    workspace_root: &Path,
    path: PathBuf,
    patches: &[&PatchDefinition],
) -> FilePlan {
    let loaded = check_target(config, workspace_root, &path)
        .and_then(|path| read_document(&path).map(|doc| (path, doc)).map_err(Into::into));

    let (path, before) = match loaded {
        Ok(loaded) => loaded,
        Err(err) => {
            let results = abort_all(&path, patches, err);
            return FilePlan {
                path,
                before: None,
                after: None,
                results,
            };
        }
    };

    let mut current = before.clone();
    let mut results: Vec<PatchOutcome> = Vec::with_capacity(patches.len());
    let mut failed: Option<String> = None;

    for patch in patches {
        if let Some(failed_patch) = &failed {
            results.push((
                patch.id.clone(),
                Err(ApplicationError::Aborted {
                    file: path.clone(),
                    failed_patch: failed_patch.clone(),
                }),
            ));
            continue;
        }

        match apply_definition(patch, &current) {
            Ok(Some((document, regions))) => {
                results.push((
                    patch.id.clone(),
                    Ok(PatchResult::Applied {
                        file: path.clone(),
                        lines_before: current.len(),
                        lines_after: document.len(),
                        regions,
                    }),
                ));
                current = document;
            }
            Ok(None) => results.push((
                patch.id.clone(),
                Ok(PatchResult::AlreadyApplied { file: path.clone() }),
            )),
            Err(source) => {
                tracing::debug!(patch = %patch.id, error = %source, "patch failed");
                failed = Some(patch.id.clone());
                results.push((
                    patch.id.clone(),
                    Err(ApplicationError::Region {
                        file: path.clone(),
                        source,
                    }),
                ));
            }
        }
    }

    // Nothing from a partially failed file may be written.
    if let Some(failed_patch) = &failed {
        for (_, result) in &mut results {
            if matches!(result, Ok(PatchResult::Applied { .. })) {
                *result = Err(ApplicationError::Aborted {
                    file: path.clone(),
                    failed_patch: failed_patch.clone(),
                });
            }
        }
    }

    FilePlan {
        after: failed.is_none().then_some(current),
        before: Some(before),
        path,
        results,
    }
}

fn check_target(
    config: &PatchConfig,
    workspace_root: &Path,
    path: &Path,
) -> Result<PathBuf, ApplicationError> {
    if !config.meta.workspace_relative {
        return Ok(path.to_path_buf());
    }
    let guard = WorkspaceGuard::new(workspace_root)?;
    Ok(guard.validate_path(path)?)
}

/// Apply one patch definition. `Ok(None)` means already applied.
fn apply_definition(
    patch: &PatchDefinition,
    document: &Document,
) -> Result<Option<(Document, Vec<Region>)>, RegionError> {
    let selector = patch.selector.to_selector()?;
    let mut patcher = RegionPatcher::with_observer(TracingObserver::new(patch.id.as_str()));

    if patch.is_repeat_delete() {
        let stripped = patcher.remove_all(document, &selector)?;
        if stripped.is_unchanged() {
            return Ok(None);
        }
        let regions = stripped.removals.iter().map(|r| r.region).collect();
        return Ok(Some((stripped.document, regions)));
    }

    let verification = patch.verification();
    match patcher.patch(
        document,
        &selector,
        &patch.replacement(),
        verification.as_ref(),
    )? {
        Outcome::Applied { document, region } => Ok(Some((document, vec![region]))),
        Outcome::AlreadyApplied { .. } => Ok(None),
    }
}

fn abort_all(
    path: &Path,
    patches: &[&PatchDefinition],
    err: ApplicationError,
) -> Vec<PatchOutcome> {
    let mut err = Some(err);
    let first_id = patches.first().map(|p| p.id.clone()).unwrap_or_default();
    patches
        .iter()
        .map(|patch| {
            let result = match err.take() {
                Some(e) => Err(e),
                None => Err(ApplicationError::Aborted {
                    file: path.to_path_buf(),
                    failed_patch: first_id.clone(),
                }),
            };
            (patch.id.clone(), result)
        })
        .collect()
}

/// Flatten file plans back into patch set order.
/// Merge per-file plan results back into patch set order.
pub fn in_config_order(config: &PatchConfig, plans: Vec<FilePlan>) -> Vec<PatchOutcome> {
    let order: HashMap<&str, usize> = config
        .patches
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.as_str(), i))
        .collect();

    let mut results: Vec<PatchOutcome> = plans.into_iter().flat_map(|plan| plan.results).collect();
    results.sort_by_key(|(id, _)| order.get(id.as_str()).copied().unwrap_or(usize::MAX));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Metadata, Operation, SelectorDef};
    use std::fs;

    fn config(patches: Vec<PatchDefinition>) -> PatchConfig {
        PatchConfig {
            meta: Metadata {
                name: "test".to_string(),
                description: None,
                version_range: None,
                workspace_relative: true,
            },
            patches,
        }
    }

    fn replace_lines(id: &str, start: usize, end: usize, text: &str) -> PatchDefinition {
        PatchDefinition {
            id: id.to_string(),
            file: "page.tsx".to_string(),
            selector: SelectorDef::Lines { start, end },
            operation: Operation::Replace {
                text: text.to_string(),
            },
            verify: None,
        }
    }

    #[test]
    fn test_sequential_patches_single_write() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("page.tsx"), "a\nb\nc\nd\ne\n").unwrap();

        let config = config(vec![
            replace_lines("first", 1, 3, "X\n"),
            replace_lines("second", 0, 1, "A\n"),
        ]);
        let results = apply_patches(&config, dir.path(), None);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(
            fs::read_to_string(dir.path().join("page.tsx")).unwrap(),
            "A\nX\nd\ne\n"
        );
    }

    #[test]
    fn test_failure_aborts_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let original = "a\nb\nc\n";
        fs::write(dir.path().join("page.tsx"), original).unwrap();

        let config = config(vec![
            replace_lines("good", 0, 1, "A\n"),
            replace_lines("bad", 10, 12, "Z\n"),
        ]);
        let results = apply_patches(&config, dir.path(), None);

        assert!(matches!(
            results[0].1,
            Err(ApplicationError::Aborted { ref failed_patch, .. }) if failed_patch == "bad"
        ));
        assert!(matches!(
            results[1].1.as_ref().unwrap_err().region_error(),
            Some(RegionError::RegionOutOfRange { .. })
        ));
        assert_eq!(
            fs::read_to_string(dir.path().join("page.tsx")).unwrap(),
            original
        );
    }

    #[test]
    fn test_results_follow_config_order_across_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("page.tsx"), "a\nb\n").unwrap();
        fs::write(dir.path().join("other.tsx"), "x\ny\n").unwrap();

        let mut elsewhere = replace_lines("elsewhere", 0, 1, "X\n");
        elsewhere.file = "other.tsx".to_string();
        let config = config(vec![
            replace_lines("head", 0, 1, "A\n"),
            elsewhere,
            replace_lines("tail", 1, 2, "B\n"),
        ]);

        let plans = plan_patches(&config, dir.path(), None);
        let by_file: Vec<&str> = plans
            .iter()
            .flat_map(|plan| plan.results.iter().map(|(id, _)| id.as_str()))
            .collect();
        assert_eq!(by_file, ["head", "tail", "elsewhere"]);

        let ids: Vec<String> = in_config_order(&config, plans)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, ["head", "elsewhere", "tail"]);
    }

    #[test]
    fn test_check_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("page.tsx"), "a\nb\n").unwrap();

        let config = config(vec![replace_lines("p", 0, 1, "A\n")]);
        let results = check_patches(&config, dir.path(), None);

        assert!(matches!(results[0].1, Ok(PatchResult::Applied { .. })));
        assert_eq!(
            fs::read_to_string(dir.path().join("page.tsx")).unwrap(),
            "a\nb\n"
        );
    }

    #[test]
    fn test_version_skip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(vec![replace_lines("p", 0, 1, "A\n")]);
        config.meta.version_range = Some(">=2.0.0".to_string());

        let results = apply_patches(&config, dir.path(), Some("1.0.0"));
        assert!(matches!(results[0].1, Ok(PatchResult::SkippedVersion { .. })));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(vec![
            replace_lines("p1", 0, 1, "A\n"),
            replace_lines("p2", 0, 1, "B\n"),
        ]);
        let results = apply_patches(&config, dir.path(), None);
        assert!(matches!(results[0].1, Err(ApplicationError::Safety(_))));
        assert!(matches!(results[1].1, Err(ApplicationError::Aborted { .. })));
    }

    #[test]
    fn test_patch_result_display() {
        let applied = PatchResult::Applied {
            file: PathBuf::from("/tmp/page.tsx"),
            lines_before: 5,
            lines_after: 4,
            regions: vec![Region::new(1, 3)],
        };
        assert!(applied.to_string().contains("5 -> 4 lines"));

        let already = PatchResult::AlreadyApplied {
            file: PathBuf::from("/tmp/page.tsx"),
        };
        assert!(already.to_string().contains("Already applied"));

        let skipped = PatchResult::SkippedVersion {
            reason: "version too old".to_string(),
        };
        assert!(skipped.to_string().contains("Skipped"));
    }

    #[test]
    fn test_patch_result_json() {
        let applied = PatchResult::Applied {
            file: PathBuf::from("page.tsx"),
            lines_before: 5,
            lines_after: 4,
            regions: vec![Region::new(1, 3)],
        };
        let json = serde_json::to_value(&applied).unwrap();
        assert_eq!(json["status"], "applied");
        assert_eq!(json["regions"][0]["start"], 1);
    }
}
