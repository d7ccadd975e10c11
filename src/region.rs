//! Region location.
//!
//! A [`Selector`] describes where a patch should land; [`locate`] resolves
//! it against a [`Document`] to a concrete half-open line [`Region`], or
//! fails with a [`RegionError`] that says exactly why. Nothing here clamps
//! or guesses: a selector that no longer fits the file is an error.

use crate::document::Document;
use crate::strip;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Minimum normalized similarity for a line to be offered as a near miss.
const NEAR_MISS_THRESHOLD: f64 = 0.6;

/// Half-open range `[start, end)` of zero-based line indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Region {
    pub start: usize,
    pub end: usize,
}

impl Region {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the region fits a document of `len` lines.
    pub fn fits(&self, len: usize) -> bool {
        self.start <= self.end && self.end <= len
    }

    /// Shift the region down by `offset` lines.
    pub fn offset(self, offset: usize) -> Self {
        Self::new(self.start + offset, self.end + offset)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A line of the document that nearly matched a missing marker.
#[derive(Debug, Clone, PartialEq)]
pub struct NearMiss {
    pub line: usize,
    pub text: String,
    pub score: f64,
}

impl fmt::Display for NearMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "closest line {}: {:?} ({:.0}% similar)",
            self.line,
            self.text.trim(),
            self.score * 100.0
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegionError {
    #[error("region not found: {reason}{}", near_miss_suffix(.near_miss))]
    RegionNotFound {
        reason: String,
        near_miss: Option<NearMiss>,
    },

    #[error("region [{start}, {end}) is out of range for a document of {len} lines")]
    RegionOutOfRange { start: usize, end: usize, len: usize },

    #[error("selector matched {count} regions, expected exactly 1")]
    AmbiguousMatch { count: usize },

    #[error("invalid marker pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("call to '{callee}' starting at line {line} is never closed")]
    Unbalanced { callee: String, line: usize },

    #[error("before-text verification failed for lines {region}: expected {expected}")]
    BeforeTextMismatch {
        region: Region,
        expected: String,
        found: String,
    },
}

fn near_miss_suffix(near_miss: &Option<NearMiss>) -> String {
    near_miss
        .as_ref()
        .map(|miss| format!(" ({miss})"))
        .unwrap_or_default()
}

impl RegionError {
    pub fn not_found(reason: impl Into<String>) -> Self {
        RegionError::RegionNotFound {
            reason: reason.into(),
            near_miss: None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RegionError::RegionNotFound { .. })
    }
}

/// Predicate over a single line.
#[derive(Debug, Clone)]
pub enum Marker {
    /// Line contains this text.
    Literal(String),
    /// Line matches this regular expression.
    Pattern(Regex),
}

impl Marker {
    pub fn literal(text: impl Into<String>) -> Self {
        Marker::Literal(text.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, RegionError> {
        Regex::new(pattern)
            .map(Marker::Pattern)
            .map_err(|e| RegionError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
    }

    pub fn matches(&self, line: &str) -> bool {
        match self {
            Marker::Literal(text) => line.contains(text.as_str()),
            Marker::Pattern(re) => re.is_match(line),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Marker::Literal(text) => text,
            Marker::Pattern(re) => re.as_str(),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Literal(text) => write!(f, "{text:?}"),
            Marker::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// How a patch finds its target region.
#[derive(Debug, Clone)]
pub enum Selector {
    /// Explicit half-open line range.
    Lines { start: usize, end: usize },
    /// First line matching `start` through the first line at or after it
    /// matching `end`, inclusive.
    Markers {
        start: Marker,
        end: Marker,
        unique: bool,
    },
    /// A standalone call statement `callee(...)`, possibly spanning lines.
    Call { callee: String, unique: bool },
}

impl Selector {
    pub fn lines(start: usize, end: usize) -> Self {
        Selector::Lines { start, end }
    }

    pub fn markers(start: Marker, end: Marker) -> Self {
        Selector::Markers {
            start,
            end,
            unique: true,
        }
    }

    pub fn call(callee: impl Into<String>) -> Self {
        Selector::Call {
            callee: callee.into(),
            unique: true,
        }
    }

    /// Take the first candidate instead of failing on several.
    pub fn allow_multiple(self) -> Self {
        match self {
            Selector::Markers { start, end, .. } => Selector::Markers {
                start,
                end,
                unique: false,
            },
            Selector::Call { callee, .. } => Selector::Call {
                callee,
                unique: false,
            },
            lines @ Selector::Lines { .. } => lines,
        }
    }

    pub fn is_line_range(&self) -> bool {
        matches!(self, Selector::Lines { .. })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Lines { start, end } => write!(f, "lines [{start}, {end})"),
            Selector::Markers { start, end, .. } => write!(f, "markers {start} .. {end}"),
            Selector::Call { callee, .. } => write!(f, "call {callee}(...)"),
        }
    }
}

/// Resolve a selector to a concrete region of `document`.
pub fn locate(document: &Document, selector: &Selector) -> Result<Region, RegionError> {
    match selector {
        Selector::Lines { start, end } => locate_lines(document.len(), *start, *end),
        Selector::Markers { start, end, unique } => {
            locate_markers(document.lines(), start, end, *unique)
        }
        Selector::Call { callee, unique } => {
            let candidates = strip::find_calls(document.lines(), callee)?;
            match candidates.as_slice() {
                [] => Err(RegionError::not_found(format!(
                    "no standalone call to '{callee}(' found"
                ))),
                [first, ..] if !*unique || candidates.len() == 1 => Ok(*first),
                _ => Err(RegionError::AmbiguousMatch {
                    count: candidates.len(),
                }),
            }
        }
    }
}

fn locate_lines(len: usize, start: usize, end: usize) -> Result<Region, RegionError> {
    let region = Region::new(start, end);
    if !region.fits(len) {
        return Err(RegionError::RegionOutOfRange { start, end, len });
    }
    Ok(region)
}

fn locate_markers(
    lines: &[String],
    start: &Marker,
    end: &Marker,
    unique: bool,
) -> Result<Region, RegionError> {
    let starts: Vec<usize> = matching_lines(lines, start).collect();
    let Some(&first) = starts.first() else {
        return Err(RegionError::RegionNotFound {
            reason: format!("start marker {start} matches no line"),
            near_miss: near_miss(lines, 0, start),
        });
    };

    // A start match only forms a candidate region if an end match follows it.
    let last_end = lines.iter().rposition(|line| end.matches(line));
    let candidates = match last_end {
        Some(last) => starts.iter().take_while(|&&idx| idx <= last).count(),
        None => 0,
    };

    if candidates == 0 {
        return Err(RegionError::RegionNotFound {
            reason: format!("end marker {end} matches no line at or after line {first}"),
            near_miss: near_miss(lines, first, end),
        });
    }
    if unique && candidates > 1 {
        return Err(RegionError::AmbiguousMatch { count: candidates });
    }

    let end_line = lines[first..]
        .iter()
        .position(|line| end.matches(line))
        .map(|offset| first + offset)
        .ok_or_else(|| RegionError::not_found(format!("end marker {end} vanished")))?;

    Ok(Region::new(first, end_line + 1))
}

fn matching_lines<'a>(lines: &'a [String], marker: &'a Marker) -> impl Iterator<Item = usize> + 'a {
    lines
        .iter()
        .enumerate()
        .filter(move |(_, line)| marker.matches(line))
        .map(|(idx, _)| idx)
}

/// Most similar line at or after `from` for a literal marker.
fn near_miss(lines: &[String], from: usize, marker: &Marker) -> Option<NearMiss> {
    let Marker::Literal(needle) = marker else {
        return None;
    };
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }

    lines
        .iter()
        .enumerate()
        .skip(from)
        .map(|(idx, line)| (idx, line, strsim::normalized_levenshtein(line.trim(), needle)))
        .filter(|(_, _, score)| *score >= NEAR_MISS_THRESHOLD)
        .max_by(|a, b| a.2.total_cmp(&b.2))
        .map(|(line, text, score)| NearMiss {
            line,
            text: text.clone(),
            score,
        })
}
