//! Region Patcher: safe line-region patching for text files
//!
//! Replaces a contiguous block of lines in a file, after proving the block
//! can be found unambiguously, and writes the result back atomically.
//!
//! # Architecture
//!
//! Every edit is a [`Patch`]: a half-open line [`Region`] plus replacement
//! lines. Regions come from a [`Selector`] (explicit line range, start/end
//! markers, or a balanced call statement) resolved by [`locate`]. The
//! transform itself ([`apply`]) is pure; file access lives in [`file`] and
//! diagnostics go through a [`PatchObserver`].
//!
//! # Safety
//!
//! - Out-of-range line selectors fail instead of clamping
//! - Marker selectors must resolve to exactly one region
//! - Optional before-text verification (exact text or xxh3 hash)
//! - Nothing is written for a file when any of its patches fails
//! - Atomic file writes (tempfile + fsync + rename)
//! - Re-running a patch set is a no-op
//!
//! # Example
//!
//! ```
//! use region_patcher::{apply, locate, Document, Marker, Patch, Selector};
//!
//! let doc = Document::parse("keep\n// BEGIN\nold\n// END\ntail\n");
//! let selector = Selector::markers(Marker::literal("BEGIN"), Marker::literal("END"));
//!
//! let region = locate(&doc, &selector).unwrap();
//! let patched = apply(&doc, &Patch::from_text(region, "new\n")).unwrap();
//! assert_eq!(patched.render(), "keep\nnew\ntail\n");
//! ```

pub mod config;
pub mod document;
pub mod file;
pub mod observe;
pub mod patch;
pub mod region;
pub mod safety;
pub mod strip;
pub mod verify;

// Re-exports
pub use config::{
    apply_patches, check_patches, load_from_path, load_from_str, matches_requirement,
    ApplicationError, ConfigError, PatchConfig, PatchResult, VersionError,
};
pub use document::{Document, DocumentError, LineEnding};
pub use file::{read_document, write_document, FileError};
pub use observe::{NoopObserver, PatchObserver, RecordingObserver, TracingObserver};
pub use patch::{apply, verify_idempotent, Outcome, Patch, RegionPatcher};
pub use region::{locate, Marker, NearMiss, Region, RegionError, Selector};
pub use safety::{SafetyError, WorkspaceGuard};
pub use strip::{strip_calls, strip_calls_observed, Removal, Stripped};
pub use verify::{region_hash, EditVerification};
