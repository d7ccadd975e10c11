//! Removal of standalone call statements such as `console.log(...)`.
//!
//! Calls are found by scanning for balanced delimiters rather than by a
//! single regular expression, so calls spanning several lines, nested
//! parentheses and parentheses inside string literals are all handled.
//! A candidate only counts when the call starts its line and nothing but
//! an optional `;` and a `//` comment follows the closing parenthesis, so
//! removing its lines never takes unrelated code with it.

use crate::document::Document;
use crate::observe::{NoopObserver, PatchObserver};
use crate::patch::RegionPatcher;
use crate::region::{Region, RegionError, Selector};
use serde::Serialize;

/// One region deleted by [`strip_calls`], in original line numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Removal {
    pub region: Region,
    pub lines: Vec<String>,
}

/// Outcome of a bulk removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripped {
    pub document: Document,
    pub removals: Vec<Removal>,
}

impl Stripped {
    pub fn is_unchanged(&self) -> bool {
        self.removals.is_empty()
    }
}

/// Remove every standalone `callee(...)` statement from `document`.
pub fn strip_calls(document: &Document, callee: &str) -> Result<Stripped, RegionError> {
    RegionPatcher::<NoopObserver>::new().remove_all(document, &Selector::call(callee))
}

/// Like [`strip_calls`], reporting every removal to `observer`.
pub fn strip_calls_observed<O: PatchObserver>(
    document: &Document,
    callee: &str,
    observer: O,
) -> Result<Stripped, RegionError> {
    RegionPatcher::with_observer(observer).remove_all(document, &Selector::call(callee))
}

/// All standalone calls to `callee`, in document order.
///
/// String and comment state carries from line to line, so a line that
/// opens inside a template literal or a block comment is never a call.
pub(crate) fn find_calls(lines: &[String], callee: &str) -> Result<Vec<Region>, RegionError> {
    let mut regions = Vec::new();
    if callee.is_empty() {
        return Ok(regions);
    }

    let mut scanner = Scanner::default();
    let mut idx = 0;
    while idx < lines.len() {
        let candidate = match scanner.state {
            Scan::Code => call_open_paren(&lines[idx], callee),
            _ => None,
        };

        if let Some(open_col) = candidate {
            let (close_line, close_col) =
                matching_close(lines, idx, open_col).ok_or_else(|| RegionError::Unbalanced {
                    callee: callee.to_string(),
                    line: idx,
                })?;

            // The tail is code plus at most a line comment, so state stays Code.
            if is_statement_tail(&lines[close_line][close_col + 1..]) {
                regions.push(Region::new(idx, close_line + 1));
                idx = close_line + 1;
                continue;
            }
        }

        scanner.feed(&lines[idx], |_| false);
        idx += 1;
    }

    Ok(regions)
}

/// Byte column of the opening parenthesis when `line` starts with a call
/// to `callee`.
fn call_open_paren(line: &str, callee: &str) -> Option<usize> {
    let indent = line.len() - line.trim_start().len();
    let rest = line[indent..].strip_prefix(callee)?;
    let gap = rest.len() - rest.trim_start().len();
    rest.trim_start()
        .starts_with('(')
        .then(|| indent + callee.len() + gap)
}

fn is_statement_tail(tail: &str) -> bool {
    let tail = tail.trim_start();
    let tail = tail.strip_prefix(';').unwrap_or(tail).trim();
    tail.is_empty() || tail.starts_with("//")
}

#[derive(Clone, Copy, Default, PartialEq, Eq)]
enum Scan {
    #[default]
    Code,
    Str(char),
    BlockComment,
}

/// Lexical state of a JS-like source, fed one line at a time.
#[derive(Default)]
struct Scanner {
    state: Scan,
}

impl Scanner {
    /// Advance over `text`, handing every code character to `visit`.
    ///
    /// Stops at the byte offset where `visit` returns true.
    fn feed(&mut self, text: &str, mut visit: impl FnMut(char) -> bool) -> Option<usize> {
        let mut chars = text.char_indices().peekable();
        let mut escaped = false;

        while let Some((offset, ch)) = chars.next() {
            match self.state {
                Scan::Str(quote) => {
                    if escaped {
                        escaped = false;
                    } else if ch == '\\' {
                        escaped = true;
                    } else if ch == quote {
                        self.state = Scan::Code;
                    }
                }
                Scan::BlockComment => {
                    if ch == '*' && chars.peek().map(|(_, c)| *c) == Some('/') {
                        chars.next();
                        self.state = Scan::Code;
                    }
                }
                Scan::Code => match ch {
                    '\'' | '"' | '`' => self.state = Scan::Str(ch),
                    '/' => match chars.peek().map(|(_, c)| *c) {
                        Some('/') => break,
                        Some('*') => {
                            chars.next();
                            self.state = Scan::BlockComment;
                        }
                        _ => {}
                    },
                    _ => {
                        if visit(ch) {
                            return Some(offset);
                        }
                    }
                },
            }
        }

        // Only template literals continue onto the next line.
        if matches!(self.state, Scan::Str('\'') | Scan::Str('"')) {
            self.state = Scan::Code;
        }
        None
    }
}

/// Position of the delimiter closing the one at `(line, col)`.
fn matching_close(lines: &[String], line: usize, col: usize) -> Option<(usize, usize)> {
    let mut scanner = Scanner::default();
    let mut depth = 0usize;

    for (line_idx, text) in lines.iter().enumerate().skip(line) {
        let start = if line_idx == line { col } else { 0 };
        let closed = scanner.feed(&text[start..], |ch| match ch {
            '(' | '[' | '{' => {
                depth += 1;
                false
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                depth == 0
            }
            _ => false,
        });
        if let Some(offset) = closed {
            return Some((line_idx, start + offset));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::parse(text)
    }

    #[test]
    fn test_single_line_calls() {
        let d = doc("const a = 1;\nconsole.log('a', a);\nreturn a;\n");
        let out = strip_calls(&d, "console.log").unwrap();
        assert_eq!(out.document.render(), "const a = 1;\nreturn a;\n");
        assert_eq!(out.removals.len(), 1);
        assert_eq!(out.removals[0].region, Region::new(1, 2));
    }

    #[test]
    fn test_multiline_nested_call() {
        let text = "\
  useEffect(() => {
    console.log('loaded', {
      id: fn(a, (b)),
      label: \"x)\",
    });
    load();
  }, []);
";
        let out = strip_calls(&doc(text), "console.log").unwrap();
        assert_eq!(
            out.document.render(),
            "  useEffect(() => {\n    load();\n  }, []);\n"
        );
        assert_eq!(out.removals[0].region, Region::new(1, 5));
        assert_eq!(out.removals[0].lines.len(), 4);
    }

    #[test]
    fn test_paren_inside_string_is_ignored() {
        let d = doc("console.log(\"(\");\nkeep();\n");
        let out = strip_calls(&d, "console.log").unwrap();
        assert_eq!(out.document.render(), "keep();\n");
    }

    #[test]
    fn test_template_literal_spans_lines() {
        let d = doc("console.log(`first )\nsecond`);\nkeep();\n");
        let out = strip_calls(&d, "console.log").unwrap();
        assert_eq!(out.document.render(), "keep();\n");
    }

    #[test]
    fn test_call_followed_by_code_is_kept() {
        let d = doc("console.log(x); doWork();\n");
        let out = strip_calls(&d, "console.log").unwrap();
        assert!(out.is_unchanged());
        assert_eq!(out.document, d);
    }

    #[test]
    fn test_trailing_comment_allowed() {
        let d = doc("console.log(x) // debug\nkeep();\n");
        let out = strip_calls(&d, "console.log").unwrap();
        assert_eq!(out.document.render(), "keep();\n");
    }

    #[test]
    fn test_similar_callee_not_matched() {
        let d = doc("console.logger(x);\nconsole.log (y);\n");
        let out = strip_calls(&d, "console.log").unwrap();
        assert_eq!(out.document.render(), "console.logger(x);\n");
    }

    #[test]
    fn test_removals_report_original_lines() {
        let d = doc("a\nconsole.log(1);\nb\nconsole.log(\n  2\n);\nc\n");
        let out = strip_calls(&d, "console.log").unwrap();
        let regions: Vec<Region> = out.removals.iter().map(|r| r.region).collect();
        assert_eq!(regions, vec![Region::new(1, 2), Region::new(3, 6)]);
        assert_eq!(out.document.render(), "a\nb\nc\n");
    }

    #[test]
    fn test_unbalanced_call() {
        let d = doc("console.log('open',\n  value\n");
        let err = strip_calls(&d, "console.log").unwrap_err();
        assert_eq!(
            err,
            RegionError::Unbalanced {
                callee: "console.log".to_string(),
                line: 0
            }
        );
    }

    #[test]
    fn test_block_comment_inside_call() {
        let d = doc("console.log(a /* ) */, b);\nkeep();\n");
        let out = strip_calls(&d, "console.log").unwrap();
        assert_eq!(out.document.render(), "keep();\n");
    }

    #[test]
    fn test_call_inside_template_literal_is_kept() {
        let text = "const help = `\nconsole.log(x);\n`;\nkeep();\n";
        let out = strip_calls(&doc(text), "console.log").unwrap();
        assert!(out.is_unchanged());
        assert_eq!(out.document.render(), text);
    }

    #[test]
    fn test_call_inside_block_comment_is_kept() {
        let text = "/*\nconsole.log(x);\n*/\nconsole.log(y);\nkeep();\n";
        let out = strip_calls(&doc(text), "console.log").unwrap();
        assert_eq!(out.document.render(), "/*\nconsole.log(x);\n*/\nkeep();\n");
        assert_eq!(out.removals[0].region, Region::new(3, 4));
    }
}
