use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use region_patcher::config::{
    check_patches, commit_plan, detect_target_version, in_config_order, load_from_path,
    plan_patches, ApplicationError, PatchConfig, PatchOutcome, PatchResult,
};
use region_patcher::{
    read_document, strip_calls_observed, verify_idempotent, write_document, Document, Marker,
    Outcome, RegionError, RegionPatcher, Selector, TracingObserver,
};
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

const WORKSPACE_ENV: &str = "REGION_PATCHER_WORKSPACE";

#[derive(Parser)]
#[command(name = "region-patcher")]
#[command(about = "Safe line-region patching for text files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch sets to a workspace
    Apply {
        /// Path to workspace root (defaults to $REGION_PATCHER_WORKSPACE, then the current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific patch file to apply (otherwise applies all in patches/)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Version of the target for version_range gating (read from package.json or Cargo.toml if omitted)
        #[arg(long)]
        target_version: Option<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check status of patches without applying
    Status {
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        #[arg(short, long)]
        patches: Option<PathBuf>,

        #[arg(long)]
        target_version: Option<String>,
    },

    /// Verify every patch is already applied
    Verify {
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        #[arg(short, long)]
        patches: Option<PathBuf>,

        #[arg(long)]
        target_version: Option<String>,
    },

    /// List patch sets and their patches
    List {
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        #[arg(short, long)]
        patches: Option<PathBuf>,
    },

    /// Replace one region of a file with the contents of another file
    Replace {
        /// File to patch
        file: PathBuf,

        /// Zero-based half-open line range, e.g. 68..169
        #[arg(long, value_parser = parse_line_range, conflicts_with_all = ["start_marker", "end_marker"])]
        lines: Option<(usize, usize)>,

        /// Text (or regex with --regex) marking the first line of the region
        #[arg(long, requires = "end_marker")]
        start_marker: Option<String>,

        /// Text (or regex with --regex) marking the last line of the region
        #[arg(long, requires = "start_marker")]
        end_marker: Option<String>,

        /// Treat markers as regular expressions
        #[arg(long)]
        regex: bool,

        /// File holding the replacement block
        #[arg(long = "with", value_name = "PAYLOAD")]
        payload: PathBuf,

        #[arg(short = 'n', long)]
        dry_run: bool,

        #[arg(short, long)]
        diff: bool,
    },

    /// Remove standalone calls such as console.log(...) from a file
    Strip {
        /// File to patch
        file: PathBuf,

        /// Callee to remove
        #[arg(long, default_value = "console.log")]
        callee: String,

        #[arg(short = 'n', long)]
        dry_run: bool,

        #[arg(short, long)]
        diff: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            workspace,
            patches,
            dry_run,
            diff,
            target_version,
            json,
        } => cmd_apply(workspace, patches, dry_run, diff, target_version, json),

        Commands::Status {
            workspace,
            patches,
            target_version,
        } => cmd_status(workspace, patches, target_version),

        Commands::Verify {
            workspace,
            patches,
            target_version,
        } => cmd_verify(workspace, patches, target_version),

        Commands::List { workspace, patches } => cmd_list(workspace, patches),

        Commands::Replace {
            file,
            lines,
            start_marker,
            end_marker,
            regex,
            payload,
            dry_run,
            diff,
        } => {
            let selector = match (lines, start_marker, end_marker) {
                (Some((start, end)), _, _) => Selector::lines(start, end),
                (None, Some(start), Some(end)) if regex => {
                    Selector::markers(Marker::regex(&start)?, Marker::regex(&end)?)
                }
                (None, Some(start), Some(end)) => {
                    Selector::markers(Marker::literal(start), Marker::literal(end))
                }
                _ => anyhow::bail!("replace needs --lines or both --start-marker and --end-marker"),
            };
            cmd_replace(&file, &selector, &payload, dry_run, diff)
        }

        Commands::Strip {
            file,
            callee,
            dry_run,
            diff,
        } => cmd_strip(&file, &callee, dry_run, diff),
    }
}

/// Logs go to stderr; RUST_LOG=region_patcher=debug shows every locate/apply.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_line_range(value: &str) -> Result<(usize, usize), String> {
    let (start, end) = value
        .split_once("..")
        .ok_or_else(|| format!("expected START..END, got '{value}'"))?;
    let start = start
        .trim()
        .parse()
        .map_err(|e| format!("invalid start '{start}': {e}"))?;
    let end = end
        .trim()
        .parse()
        .map_err(|e| format!("invalid end '{end}': {e}"))?;
    Ok((start, end))
}

/// Resolve workspace path
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. REGION_PATCHER_WORKSPACE environment variable
/// 3. Current directory
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return path
            .canonicalize()
            .with_context(|| format!("workspace {} does not exist", path.display()));
    }

    if let Ok(env_path) = env::var(WORKSPACE_ENV) {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!("Warning: {WORKSPACE_ENV} is set but path doesn't exist: {env_path}").yellow()
        );
    }

    Ok(env::current_dir()?.canonicalize()?)
}

/// Discover all .toml patch files in a patches/ directory.
///
/// Looks in `<workspace>/patches` first, then `./patches`.
fn discover_patch_files(workspace: &Path) -> Result<Vec<PathBuf>> {
    let cwd_patches_dir = env::current_dir().ok().map(|cwd| cwd.join("patches"));
    let candidate_dirs = std::iter::once(workspace.join("patches")).chain(cwd_patches_dir);

    for patches_dir in candidate_dirs {
        if !patches_dir.is_dir() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&patches_dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }
        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    anyhow::bail!(
        "No .toml patch files found in either ./patches or {}/patches",
        workspace.display()
    )
}

fn load_patch_sets(
    workspace: &Path,
    patches: Option<PathBuf>,
) -> Result<Vec<(PathBuf, PatchConfig)>> {
    let files = match patches {
        Some(path) => vec![path],
        None => discover_patch_files(workspace)?,
    };
    files
        .into_iter()
        .map(|path| {
            let config = load_from_path(&path)?;
            Ok((path, config))
        })
        .collect()
}

fn resolve_target_version(workspace: &Path, cli_version: Option<String>) -> Option<String> {
    cli_version.or_else(|| detect_target_version(workspace))
}

fn print_header(workspace: &Path, version: Option<&str>) {
    println!("Workspace: {}", workspace.display());
    match version {
        Some(v) => println!("Version: {}", v),
        None => println!("Version: {}", "unknown (version ranges not enforced)".dimmed()),
    }
    println!();
}

/// Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for group in diff.grouped_ops(3) {
        for op in group {
            for change in diff.iter_changes(&op) {
                let line = match change.tag() {
                    ChangeTag::Delete => format!("-{}", change).red(),
                    ChangeTag::Insert => format!("+{}", change).green(),
                    ChangeTag::Equal => format!(" {}", change).normal(),
                };
                print!("{}", line);
                if change.missing_newline() {
                    println!();
                }
            }
        }
        println!("{}", "...".dimmed());
    }
}

fn report_conflict(error: &ApplicationError) {
    let Some(region_error) = error.region_error() else {
        return;
    };
    match region_error {
        RegionError::RegionNotFound { near_miss, .. } => {
            eprintln!("  {}", "CONFLICT: selector matched no region".red());
            eprintln!("  Possible causes:");
            eprintln!("    - Marker text was edited or removed");
            eprintln!("    - Code was moved to a different file");
            if let Some(miss) = near_miss {
                eprintln!("  Hint: {}", miss);
            }
        }
        RegionError::AmbiguousMatch { count } => {
            eprintln!(
                "  {}",
                format!("CONFLICT: selector matched {} regions (expected 1)", count).red()
            );
            eprintln!("  Action: make the start marker more specific");
        }
        RegionError::RegionOutOfRange { len, .. } => {
            eprintln!(
                "  {}",
                format!("CONFLICT: file has only {} lines", len).red()
            );
            eprintln!("  Action: the file changed shape; prefer a markers selector");
        }
        RegionError::BeforeTextMismatch { found, .. } => {
            eprintln!("  {}", "CONFLICT: region content changed".red());
            for line in found.lines().take(3) {
                eprintln!("    | {}", line.dimmed());
            }
        }
        RegionError::InvalidPattern { .. } | RegionError::Unbalanced { .. } => {}
    }
}

#[derive(Default)]
struct Tally {
    applied: usize,
    already_applied: usize,
    skipped: usize,
    failed: usize,
}

fn cmd_apply(
    workspace: Option<PathBuf>,
    patches: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
    target_version: Option<String>,
    json: bool,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let patch_sets = load_patch_sets(&workspace, patches)?;
    let version = resolve_target_version(&workspace, target_version);

    if !json {
        print_header(&workspace, version.as_deref());
    }

    let mut tally = Tally::default();
    let mut json_report = Vec::new();

    for (patch_file, config) in patch_sets {
        if !json {
            println!("Loading patches from {}...", patch_file.display());
            if dry_run {
                println!("{}", "  [DRY RUN - showing what would be applied]".cyan());
            }
        }

        let mut plans = plan_patches(&config, &workspace, version.as_deref());
        for plan in &mut plans {
            if !dry_run {
                commit_plan(plan);
            }
            if show_diff && !json && plan.is_changed() {
                if let (Some(before), Some(after)) = (&plan.before, &plan.after) {
                    display_diff(&plan.path, &before.render(), &after.render());
                }
            }
        }

        for (patch_id, result) in in_config_order(&config, plans) {
            if json {
                json_report.push(json_entry(&config.meta.name, &patch_id, &result));
            }
            match result {
                Ok(PatchResult::Applied {
                    ref file,
                    lines_before,
                    lines_after,
                    ..
                }) => {
                    tally.applied += 1;
                    if !json {
                        let verb = if dry_run { "Would apply" } else { "Applied" };
                        println!(
                            "{} {}: {} to {} ({} -> {} lines)",
                            "✓".green(),
                            patch_id,
                            verb,
                            file.display(),
                            lines_before,
                            lines_after
                        );
                    }
                }
                Ok(PatchResult::AlreadyApplied { ref file }) => {
                    tally.already_applied += 1;
                    if !json {
                        println!(
                            "{} {}: Already applied to {}",
                            "⊙".yellow(),
                            patch_id,
                            file.display()
                        );
                    }
                }
                Ok(PatchResult::SkippedVersion { ref reason }) => {
                    tally.skipped += 1;
                    if !json {
                        println!("{} {}: Skipped ({})", "⊘".cyan(), patch_id, reason);
                    }
                }
                Err(ref e) => {
                    tally.failed += 1;
                    if !json {
                        eprintln!("{} {}: Error - {}", "✗".red(), patch_id, e);
                        report_conflict(e);
                    }
                }
            }
        }

        if !json {
            println!();
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&json_report)?);
    } else {
        println!("{}", "Summary:".bold());
        println!("  {} applied", format!("{}", tally.applied).green());
        println!(
            "  {} already applied",
            format!("{}", tally.already_applied).yellow()
        );
        println!("  {} skipped", format!("{}", tally.skipped).cyan());
        println!("  {} failed", format!("{}", tally.failed).red());
    }

    if tally.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn json_entry(
    patch_set: &str,
    patch_id: &str,
    result: &Result<PatchResult, ApplicationError>,
) -> serde_json::Value {
    let outcome = match result {
        Ok(result) => serde_json::to_value(result).unwrap_or(serde_json::Value::Null),
        Err(e) => serde_json::json!({ "status": "error", "message": e.to_string() }),
    };
    serde_json::json!({
        "patch_set": patch_set,
        "id": patch_id,
        "result": outcome,
    })
}

fn check_all(
    workspace: &Path,
    patches: Option<PathBuf>,
    version: Option<&str>,
) -> Result<Vec<PatchOutcome>> {
    let mut outcomes = Vec::new();
    for (_, config) in load_patch_sets(workspace, patches)? {
        outcomes.extend(check_patches(&config, workspace, version));
    }
    Ok(outcomes)
}

fn cmd_status(
    workspace: Option<PathBuf>,
    patches: Option<PathBuf>,
    target_version: Option<String>,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let version = resolve_target_version(&workspace, target_version);

    println!("{}", "Patch Status Report".bold());
    print_header(&workspace, version.as_deref());

    let mut applied = Vec::new();
    let mut not_applied = Vec::new();
    let mut skipped = Vec::new();

    for (patch_id, result) in check_all(&workspace, patches, version.as_deref())? {
        match result {
            Ok(PatchResult::Applied { .. }) => {
                not_applied.push((patch_id, "target found but not yet patched".to_string()));
            }
            Ok(PatchResult::AlreadyApplied { .. }) => applied.push(patch_id),
            Ok(PatchResult::SkippedVersion { reason }) => skipped.push((patch_id, reason)),
            Err(e) => not_applied.push((patch_id, e.to_string())),
        }
    }

    if !applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for id in &applied {
            println!("  - {}", id);
        }
        println!();
    }

    if !not_applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊙".yellow(),
            "NOT APPLIED".yellow().bold(),
            not_applied.len()
        );
        for (id, reason) in &not_applied {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    if !skipped.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊘".cyan(),
            "SKIPPED".cyan().bold(),
            skipped.len()
        );
        for (id, reason) in &skipped {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    Ok(())
}

fn cmd_verify(
    workspace: Option<PathBuf>,
    patches: Option<PathBuf>,
    target_version: Option<String>,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let version = resolve_target_version(&workspace, target_version);

    println!("{}", "Verifying patches...".bold());
    print_header(&workspace, version.as_deref());

    let mut verified = 0;
    let mut mismatch = 0;
    let mut skipped = 0;

    for (patch_id, result) in check_all(&workspace, patches, version.as_deref())? {
        match result {
            Ok(PatchResult::AlreadyApplied { .. }) => {
                println!("{} {}: Verified (already applied)", "✓".green(), patch_id);
                verified += 1;
            }
            Ok(PatchResult::Applied { file, .. }) => {
                eprintln!("{} {}: MISMATCH", "✗".red(), patch_id);
                eprintln!("  Expected: patch already applied");
                eprintln!("  Found: patch not yet applied");
                eprintln!("  Location: {}", file.display());
                mismatch += 1;
            }
            Ok(PatchResult::SkippedVersion { reason }) => {
                println!("{} {}: Skipped ({})", "⊘".cyan(), patch_id, reason);
                skipped += 1;
            }
            Err(e) => {
                eprintln!("{} {}: MISMATCH", "✗".red(), patch_id);
                eprintln!("  Error: {}", e);
                mismatch += 1;
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} verified", format!("{}", verified).green());
    println!("  {} mismatch", format!("{}", mismatch).red());
    println!("  {} skipped", format!("{}", skipped).cyan());

    if mismatch > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(workspace: Option<PathBuf>, patches: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;

    for (patch_file, config) in load_patch_sets(&workspace, patches)? {
        let name = if config.meta.name.is_empty() {
            patch_file.display().to_string()
        } else {
            config.meta.name.clone()
        };
        println!("{} {}", name.bold(), format!("({})", patch_file.display()).dimmed());
        if let Some(description) = &config.meta.description {
            println!("  {}", description);
        }
        if let Some(range) = &config.meta.version_range {
            println!("  version: {}", range.cyan());
        }
        for patch in &config.patches {
            println!("  - {} -> {} [{}]", patch.id, patch.file, patch.selector);
        }
        println!();
    }

    Ok(())
}

fn write_or_preview(
    file: &Path,
    before: &Document,
    after: &Document,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    if show_diff {
        display_diff(file, &before.render(), &after.render());
    }
    if dry_run {
        println!("{}", "[DRY RUN - file not modified]".cyan());
    } else {
        write_document(file, after)?;
    }
    Ok(())
}

fn cmd_replace(
    file: &Path,
    selector: &Selector,
    payload: &Path,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let document = read_document(file)?;
    let replacement_text = fs::read_to_string(payload)
        .with_context(|| format!("failed to read replacement from {}", payload.display()))?;
    let replacement = Document::lines_of(&replacement_text);

    let mut patcher = RegionPatcher::with_observer(TracingObserver::new("replace"));
    match patcher
        .patch(&document, selector, &replacement, None)
        .with_context(|| format!("cannot patch {}", file.display()))?
    {
        Outcome::AlreadyApplied { .. } => {
            println!("{} Already applied to {}", "⊙".yellow(), file.display());
        }
        Outcome::Applied {
            document: patched,
            region,
        } => {
            println!(
                "{} Replaced lines {} of {} ({} -> {} lines)",
                "✓".green(),
                region,
                file.display(),
                document.len(),
                patched.len()
            );
            if !verify_idempotent(&patched, selector, &replacement) {
                eprintln!(
                    "{}",
                    "Warning: running this replacement again would patch the file again; prefer markers"
                        .yellow()
                );
            }
            write_or_preview(file, &document, &patched, dry_run, show_diff)?;
        }
    }

    Ok(())
}

fn cmd_strip(file: &Path, callee: &str, dry_run: bool, show_diff: bool) -> Result<()> {
    let document = read_document(file)?;
    let stripped = strip_calls_observed(&document, callee, TracingObserver::new("strip"))
        .with_context(|| format!("cannot strip {} calls from {}", callee, file.display()))?;

    if stripped.is_unchanged() {
        println!("{} No {}(...) calls in {}", "⊙".yellow(), callee, file.display());
        return Ok(());
    }

    for removal in &stripped.removals {
        let first = removal.lines.first().map(|l| l.trim()).unwrap_or_default();
        println!("  - lines {}: {}", removal.region, first.dimmed());
    }
    println!(
        "{} Removed {} call(s) from {} ({} -> {} lines)",
        "✓".green(),
        stripped.removals.len(),
        file.display(),
        document.len(),
        stripped.document.len()
    );

    write_or_preview(file, &document, &stripped.document, dry_run, show_diff)
}
