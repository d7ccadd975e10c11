pub mod applicator;
pub mod loader;
pub mod schema;
pub mod version;

pub use applicator::{
    apply_patches, check_patches, commit_plan, in_config_order, plan_patches, ApplicationError,
    FilePlan, PatchOutcome, PatchResult,
};
pub use loader::{load_from_path, load_from_str, ConfigError};
pub use schema::{
    HashAlgorithm, Metadata, Operation, PatchConfig, PatchDefinition, SelectorDef,
    ValidationError, ValidationIssue, Verify,
};
pub use version::{detect_target_version, matches_requirement, Gate, VersionError};
