//! Region replacement.
//!
//! [`apply`] and [`verify_idempotent`] are pure functions over
//! [`Document`] values. [`RegionPatcher`] strings locate, verification and
//! apply together and reports each step to a [`PatchObserver`].

use crate::document::Document;
use crate::observe::{NoopObserver, PatchObserver};
use crate::region::{locate, Region, RegionError, Selector};
use crate::strip::{Removal, Stripped};
use crate::verify::EditVerification;

/// A region plus the lines that replace it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub region: Region,
    pub replacement: Vec<String>,
}

impl Patch {
    pub fn new(region: Region, replacement: Vec<String>) -> Self {
        Self {
            region,
            replacement,
        }
    }

    /// Build a patch whose replacement is a block of text.
    pub fn from_text(region: Region, text: &str) -> Self {
        Self::new(region, Document::lines_of(text))
    }

    /// Line count of `document` once this patch is applied.
    pub fn resulting_len(&self, document_len: usize) -> usize {
        document_len - self.region.len() + self.replacement.len()
    }
}

/// Replace `patch.region` in `document`, returning a new document.
///
/// The input is never modified. A region that does not fit the document is
/// rejected rather than clamped.
pub fn apply(document: &Document, patch: &Patch) -> Result<Document, RegionError> {
    let Region { start, end } = patch.region;
    let lines = document.lines();
    if !patch.region.fits(lines.len()) {
        return Err(RegionError::RegionOutOfRange {
            start,
            end,
            len: lines.len(),
        });
    }

    let mut out = Vec::with_capacity(patch.resulting_len(lines.len()));
    out.extend_from_slice(&lines[..start]);
    out.extend(patch.replacement.iter().cloned());
    out.extend_from_slice(&lines[end..]);
    Ok(document.with_lines(out))
}

/// Whether running the same patch again over `patched` would be a no-op.
///
/// True when the selector no longer matches, or matches a region that
/// already holds `replacement`. A line range also counts when its start
/// line begins the replacement block.
pub fn verify_idempotent(patched: &Document, selector: &Selector, replacement: &[String]) -> bool {
    match locate(patched, selector) {
        Ok(region) => {
            patched.slice(region) == Some(replacement)
                || (selector.is_line_range() && landed_at(patched, region.start, replacement).is_some())
        }
        Err(RegionError::RegionOutOfRange { start, .. }) => {
            landed_at(patched, start, replacement).is_some()
        }
        Err(err) => err.is_not_found(),
    }
}

/// Result of [`RegionPatcher::patch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied { document: Document, region: Region },
    /// The replacement is already in place; `region` is where it was seen.
    AlreadyApplied { region: Option<Region> },
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }
}

/// Locate/verify/apply pipeline with diagnostics.
#[derive(Debug, Default)]
pub struct RegionPatcher<O = NoopObserver> {
    observer: O,
}

impl RegionPatcher<NoopObserver> {
    pub fn new() -> Self {
        Self {
            observer: NoopObserver,
        }
    }
}

impl<O: PatchObserver> RegionPatcher<O> {
    pub fn with_observer(observer: O) -> Self {
        Self { observer }
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    pub fn locate(
        &mut self,
        document: &Document,
        selector: &Selector,
    ) -> Result<Region, RegionError> {
        let result = locate(document, selector);
        match &result {
            Ok(region) => self.observer.located(selector, *region),
            Err(err) => self.observer.failed(err),
        }
        result
    }

    pub fn apply(&mut self, document: &Document, patch: &Patch) -> Result<Document, RegionError> {
        let result = apply(document, patch);
        match &result {
            Ok(patched) => self
                .observer
                .applied(patch.region, document.len(), patched.len()),
            Err(err) => self.observer.failed(err),
        }
        result
    }

    /// Locate `selector`, check the before-text, and replace the region.
    ///
    /// Re-running a patch is safe: if the replacement is already where the
    /// selector points (or, for a line range, at its start line), the result
    /// is [`Outcome::AlreadyApplied`]. When the selector no longer matches,
    /// the same holds only if the replacement spans at least two non-blank
    /// lines and occurs once in the document.
    pub fn patch(
        &mut self,
        document: &Document,
        selector: &Selector,
        replacement: &[String],
        verification: Option<&EditVerification>,
    ) -> Result<Outcome, RegionError> {
        let region = match locate(document, selector) {
            Ok(region) => region,
            Err(err) if err.is_not_found() => {
                if let Some(existing) = present_once(document, replacement) {
                    tracing::debug!(%existing, "selector gone, replacement already present");
                    self.observer.located(selector, existing);
                    return Ok(Outcome::AlreadyApplied {
                        region: Some(existing),
                    });
                }
                self.observer.failed(&err);
                return Err(err);
            }
            // A line range that shrank the file no longer fits on a re-run.
            Err(RegionError::RegionOutOfRange { start, end, len }) => {
                if let Some(landed) = landed_at(document, start, replacement) {
                    tracing::debug!(%landed, len, "stale line range, replacement already present");
                    return Ok(Outcome::AlreadyApplied {
                        region: Some(landed),
                    });
                }
                let err = RegionError::RegionOutOfRange { start, end, len };
                self.observer.failed(&err);
                return Err(err);
            }
            Err(err) => {
                self.observer.failed(&err);
                return Err(err);
            }
        };
        self.observer.located(selector, region);

        let current = document.slice(region).unwrap_or_default();
        if current == replacement {
            return Ok(Outcome::AlreadyApplied {
                region: Some(region),
            });
        }

        let found = current.join("\n");
        let verified = verification.map(|v| v.matches(&found));
        // A line range still starts where its replacement landed on the last run.
        let may_have_landed = match verified {
            Some(ok) => !ok,
            None => selector.is_line_range(),
        };
        if may_have_landed {
            if let Some(landed) = landed_at(document, region.start, replacement) {
                tracing::debug!(%region, %landed, "replacement already at range start");
                return Ok(Outcome::AlreadyApplied {
                    region: Some(landed),
                });
            }
        }
        if let (Some(verification), Some(false)) = (verification, verified) {
            let err = RegionError::BeforeTextMismatch {
                region,
                expected: verification.describe(),
                found,
            };
            self.observer.failed(&err);
            return Err(err);
        }

        let patched = self.apply(document, &Patch::new(region, replacement.to_vec()))?;
        Ok(Outcome::Applied {
            document: patched,
            region,
        })
    }

    /// Delete every region matching `selector`, one locate/apply cycle at a
    /// time, until it no longer matches.
    ///
    /// Matches are taken front to back, so removals are reported in the
    /// line numbers of the input document.
    pub fn remove_all(
        &mut self,
        document: &Document,
        selector: &Selector,
    ) -> Result<Stripped, RegionError> {
        let selector = selector.clone().allow_multiple();
        let mut current = document.clone();
        let mut removals = Vec::new();
        let mut removed = 0;

        loop {
            let region = match locate(&current, &selector) {
                Ok(region) => region,
                Err(err) if err.is_not_found() => break,
                Err(err) => {
                    self.observer.failed(&err);
                    return Err(err);
                }
            };
            self.observer.located(&selector, region);
            if region.is_empty() {
                break;
            }

            let lines = current.slice(region).unwrap_or_default().to_vec();
            current = self.apply(&current, &Patch::new(region, Vec::new()))?;
            removals.push(Removal {
                region: region.offset(removed),
                lines,
            });
            removed += region.len();

            if selector.is_line_range() {
                break;
            }
        }

        Ok(Stripped {
            document: current,
            removals,
        })
    }
}

/// Region at `start` holding exactly `replacement`, if any.
fn landed_at(document: &Document, start: usize, replacement: &[String]) -> Option<Region> {
    let landed = Region::new(start, start + replacement.len());
    (!replacement.is_empty() && document.slice(landed) == Some(replacement)).then_some(landed)
}

/// Region holding `replacement` when the block is distinctive enough to
/// stand in for a selector that no longer matches.
fn present_once(document: &Document, replacement: &[String]) -> Option<Region> {
    let substantive = replacement.iter().filter(|line| !line.trim().is_empty()).count();
    if substantive < 2 {
        return None;
    }
    document.find_block(replacement)
}
