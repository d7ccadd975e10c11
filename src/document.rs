//! Line-oriented view of a text file.
//!
//! A [`Document`] keeps the lines of a file together with the formatting
//! facts needed to write it back byte-for-byte: the line terminator, whether
//! the last line was terminated, and a leading byte-order mark.

use crate::region::Region;
use thiserror::Error;

const BOM: char = '\u{feff}';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("content is not valid UTF-8 (first invalid byte at offset {offset})")]
    Encoding { offset: usize },
}

/// Line terminator used when rendering a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }

    /// Detect the terminator from the first line break in `text`.
    fn detect(text: &str) -> Self {
        match text.find('\n') {
            Some(idx) if idx > 0 && text.as_bytes()[idx - 1] == b'\r' => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }
}

/// An ordered sequence of lines read from a file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    lines: Vec<String>,
    line_ending: LineEnding,
    trailing_newline: bool,
    bom: bool,
}

impl Document {
    /// Split text into a document. Rendering the result gives back `text`
    /// as long as its line endings are consistent.
    pub fn parse(text: &str) -> Self {
        let (body, bom) = match text.strip_prefix(BOM) {
            Some(rest) => (rest, true),
            None => (text, false),
        };

        if body.is_empty() {
            return Self {
                bom,
                ..Self::default()
            };
        }

        let line_ending = LineEnding::detect(body);
        let trailing_newline = body.ends_with('\n');
        let body = if trailing_newline {
            &body[..body.len() - 1]
        } else {
            body
        };

        let lines = body
            .split('\n')
            .map(|line| match line_ending {
                LineEnding::CrLf => line.strip_suffix('\r').unwrap_or(line),
                LineEnding::Lf => line,
            })
            .map(str::to_owned)
            .collect();

        Self {
            lines,
            line_ending,
            trailing_newline,
            bom,
        }
    }

    /// Decode raw file bytes as UTF-8 and split them into lines.
    pub fn decode(bytes: &[u8]) -> Result<Self, DocumentError> {
        let text = std::str::from_utf8(bytes).map_err(|e| DocumentError::Encoding {
            offset: e.valid_up_to(),
        })?;
        Ok(Self::parse(text))
    }

    /// Build a document from bare lines using `\n` and a final terminator.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        Self {
            trailing_newline: !lines.is_empty(),
            lines,
            line_ending: LineEnding::Lf,
            bom: false,
        }
    }

    /// Split a replacement block into lines.
    ///
    /// A single trailing terminator does not add an empty line, and the
    /// empty string yields no lines at all.
    pub fn lines_of(text: &str) -> Vec<String> {
        text.lines().map(str::to_owned).collect()
    }

    /// Same formatting, different lines.
    pub(crate) fn with_lines(&self, lines: Vec<String>) -> Self {
        Self {
            lines,
            line_ending: self.line_ending,
            trailing_newline: self.trailing_newline,
            bom: self.bom,
        }
    }

    pub fn render(&self) -> String {
        let ending = self.line_ending.as_str();
        let mut out = String::new();
        if self.bom {
            out.push(BOM);
        }
        out.push_str(&self.lines.join(ending));
        if self.trailing_newline && !self.lines.is_empty() {
            out.push_str(ending);
        }
        out
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Lines covered by `region`, or `None` when it does not fit.
    pub fn slice(&self, region: Region) -> Option<&[String]> {
        if region.start > region.end || region.end > self.lines.len() {
            return None;
        }
        Some(&self.lines[region.start..region.end])
    }

    /// Find `block` as a contiguous run of lines occurring exactly once.
    pub fn find_block(&self, block: &[String]) -> Option<Region> {
        if block.is_empty() || block.len() > self.lines.len() {
            return None;
        }
        let mut starts = self
            .lines
            .windows(block.len())
            .enumerate()
            .filter(|(_, window)| *window == block)
            .map(|(start, _)| start);
        match (starts.next(), starts.next()) {
            (Some(start), None) => Some(Region::new(start, start + block.len())),
            _ => None,
        }
    }
}
