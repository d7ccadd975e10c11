use crate::document::Document;
use crate::region::{Marker, RegionError, Selector};
use crate::verify::EditVerification;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        let mut seen_ids = HashSet::new();
        for patch in &self.patches {
            let patch_id = || Some(patch.id.clone());

            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            } else if !seen_ids.insert(patch.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId {
                    patch_id: patch.id.clone(),
                });
            }
            if patch.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: patch_id(),
                    field: "file",
                });
            }

            match &patch.selector {
                SelectorDef::Lines { start, end } => {
                    if start > end {
                        issues.push(ValidationIssue::InvalidCombo {
                            patch_id: patch_id(),
                            message: format!("line range start {start} is after end {end}"),
                        });
                    }
                }
                SelectorDef::Markers {
                    start, end, regex, ..
                } => {
                    if start.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: patch_id(),
                            field: "selector.start",
                        });
                    }
                    if end.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: patch_id(),
                            field: "selector.end",
                        });
                    }
                    if *regex {
                        for pattern in [start, end] {
                            if let Err(err) = Marker::regex(pattern) {
                                issues.push(ValidationIssue::InvalidCombo {
                                    patch_id: patch_id(),
                                    message: err.to_string(),
                                });
                            }
                        }
                    }
                }
                SelectorDef::Call { callee, .. } => {
                    if callee.trim().is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            patch_id: patch_id(),
                            field: "selector.callee",
                        });
                    }
                }
            }

            // A deleted range leaves nothing to recognise on the next run.
            if let Operation::Delete { repeat: false } = patch.operation {
                if patch.selector.is_lines() && patch.verify.is_none() {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: patch_id(),
                        message: "delete of a line range requires verify".to_string(),
                    });
                }
            }

            if let Operation::Delete { repeat: true } = patch.operation {
                if patch.selector.is_lines() {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: patch_id(),
                        message: "delete with repeat requires a markers or call selector"
                            .to_string(),
                    });
                }
                if patch.verify.is_some() {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: patch_id(),
                        message: "verify cannot be combined with repeated delete".to_string(),
                    });
                }
            }

            if let Some(Verify::Hash { expected, .. }) = &patch.verify {
                if EditVerification::parse_hash(expected).is_none() {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: patch_id(),
                        message: format!("invalid hash value: {expected}"),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version_range: Option<String>,
    #[serde(default)]
    pub workspace_relative: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub file: String,
    pub selector: SelectorDef,
    pub operation: Operation,
    #[serde(default)]
    pub verify: Option<Verify>,
}

impl PatchDefinition {
    /// Replacement lines for this patch (empty for deletes).
    pub fn replacement(&self) -> Vec<String> {
        match &self.operation {
            Operation::Replace { text } => Document::lines_of(text),
            Operation::Delete { .. } => Vec::new(),
        }
    }

    pub fn verification(&self) -> Option<EditVerification> {
        self.verify.as_ref().and_then(Verify::to_verification)
    }

    pub fn is_repeat_delete(&self) -> bool {
        matches!(self.operation, Operation::Delete { repeat: true })
    }
}

/// Where a patch lands, as written in the patch file.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SelectorDef {
    /// Zero-based half-open line range.
    Lines { start: usize, end: usize },
    Markers {
        start: String,
        end: String,
        #[serde(default)]
        regex: bool,
        #[serde(default)]
        allow_multiple: bool,
    },
    Call {
        callee: String,
        #[serde(default)]
        allow_multiple: bool,
    },
}

impl SelectorDef {
    pub fn is_lines(&self) -> bool {
        matches!(self, SelectorDef::Lines { .. })
    }

    pub fn to_selector(&self) -> Result<Selector, RegionError> {
        let selector = match self {
            SelectorDef::Lines { start, end } => return Ok(Selector::lines(*start, *end)),
            SelectorDef::Markers {
                start,
                end,
                regex,
                allow_multiple,
            } => {
                let (start, end) = if *regex {
                    (Marker::regex(start)?, Marker::regex(end)?)
                } else {
                    (Marker::literal(start), Marker::literal(end))
                };
                (Selector::markers(start, end), *allow_multiple)
            }
            SelectorDef::Call {
                callee,
                allow_multiple,
            } => (Selector::call(callee.trim()), *allow_multiple),
        };

        Ok(match selector {
            (selector, true) => selector.allow_multiple(),
            (selector, false) => selector,
        })
    }
}

impl fmt::Display for SelectorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorDef::Lines { start, end } => write!(f, "lines [{start}, {end})"),
            SelectorDef::Markers {
                start, end, regex, ..
            } => {
                if *regex {
                    write!(f, "markers /{start}/ .. /{end}/")
                } else {
                    write!(f, "markers {start:?} .. {end:?}")
                }
            }
            SelectorDef::Call { callee, .. } => write!(f, "call {callee}(...)"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    Replace {
        text: String,
    },
    Delete {
        /// Remove every match instead of exactly one.
        #[serde(default)]
        repeat: bool,
    },
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Verify {
    ExactMatch {
        expected_text: String,
    },
    Hash {
        algorithm: Option<HashAlgorithm>,
        expected: String,
    },
}

impl Verify {
    /// Exact text is normalized to lines so a trailing newline in a TOML
    /// multi-line string does not matter.
    pub fn to_verification(&self) -> Option<EditVerification> {
        match self {
            Verify::ExactMatch { expected_text } => Some(EditVerification::ExactMatch(
                Document::lines_of(expected_text).join("\n"),
            )),
            Verify::Hash { expected, .. } => EditVerification::parse_hash(expected),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    Xxh3,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        patch_id: String,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch config contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::DuplicateId { patch_id } => {
                write!(f, "patch id '{patch_id}' is used more than once")
            }
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}
