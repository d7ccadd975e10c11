use xxhash_rust::xxh3::xxh3_64;

/// Before-text check for a located region.
///
/// The checked text is the region's lines joined with `\n`, without a
/// trailing terminator, so the same expectation holds for LF and CRLF files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from region lines, hashing anything over 1KB.
    pub fn from_lines(lines: &[String]) -> Self {
        Self::from_text(&lines.join("\n"))
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }

    /// Parse a hex hash as written in patch files (`0x` prefix optional).
    pub fn parse_hash(hex: &str) -> Option<Self> {
        let digits = hex.trim();
        let digits = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits);
        u64::from_str_radix(digits, 16).ok().map(EditVerification::Hash)
    }

    /// Get hash value regardless of variant.
    pub fn hash(&self) -> u64 {
        match self {
            EditVerification::Hash(h) => *h,
            EditVerification::ExactMatch(text) => xxh3_64(text.as_bytes()),
        }
    }

    /// Short description for error messages.
    pub fn describe(&self) -> String {
        match self {
            EditVerification::ExactMatch(text) => {
                format!("exact text ({} lines)", text.lines().count())
            }
            EditVerification::Hash(h) => format!("xxh3 {h:#018x}"),
        }
    }
}

/// Hash a region the way [`EditVerification::Hash`] expects.
pub fn region_hash(lines: &[String]) -> u64 {
    xxh3_64(lines.join("\n").as_bytes())
}
