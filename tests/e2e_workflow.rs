//! End-to-end workflow test
//!
//! Tests the complete workflow:
//! 1. Discover patch sets
//! 2. Apply patch sets
//! 3. Verify patches
//! 4. Check idempotency

use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Create a small web app workspace with two patch sets
fn setup_e2e_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();

    fs::create_dir_all(dir.path().join("src/components")).unwrap();
    fs::create_dir_all(dir.path().join("patches")).unwrap();

    fs::write(
        dir.path().join("package.json"),
        r#"{ "name": "clinic-web", "version": "1.3.0" }"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("src/components/Booking.jsx"),
        r#"export function Booking({ slot }) {
  console.log("render booking", slot);
  const [open, setOpen] = useState(false);
  // region: consultation-popup
  return <LegacyPopup slot={slot} />;
  // endregion: consultation-popup
}
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("src/api.js"),
        r#"export async function book(slot) {
  console.log(
    "booking",
    slot,
  );
  const res = await fetch(`/api/book/${slot.id}`);
  console.log(`done ${res.status}`);
  return res.json();
}
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("patches/01-popup.toml"),
        r#"[meta]
name = "consultation-popup"
description = "Replace the legacy booking popup"
version_range = "^1.3"
workspace_relative = true

[[patches]]
id = "modern-popup"
file = "src/components/Booking.jsx"

[patches.selector]
type = "markers"
start = "// region: consultation-popup"
end = "// endregion: consultation-popup"

[patches.operation]
type = "replace"
text = """
  // region: consultation-popup
  return <ConsultationPopup slot={slot} open={open} onClose={() => setOpen(false)} />;
  // endregion: consultation-popup
"""

[patches.verify]
method = "exact_match"
expected_text = """
  // region: consultation-popup
  return <LegacyPopup slot={slot} />;
  // endregion: consultation-popup
"""
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("patches/02-no-console.toml"),
        r#"[meta]
name = "no-console"
workspace_relative = true

[[patches]]
id = "strip-booking"
file = "src/components/Booking.jsx"
selector = { type = "call", callee = "console.log" }
operation = { type = "delete", repeat = true }

[[patches]]
id = "strip-api"
file = "src/api.js"
selector = { type = "call", callee = "console.log" }
operation = { type = "delete", repeat = true }
"#,
    )
    .unwrap();

    dir
}

fn run(workspace: &TempDir, args: &[&str]) -> Output {
    let output = Command::new(env!("CARGO_BIN_EXE_region-patcher"))
        .args(args)
        .args(["--workspace", workspace.path().to_str().unwrap()])
        .current_dir(workspace.path())
        .env("NO_COLOR", "1")
        .env_remove("REGION_PATCHER_WORKSPACE")
        .output()
        .expect("Failed to run region-patcher");

    println!("STDOUT:\n{}", String::from_utf8_lossy(&output.stdout));
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        println!("STDERR:\n{}", stderr);
    }
    output
}

#[test]
fn test_e2e_workflow() {
    let workspace = setup_e2e_workspace();

    // Step 1: Apply patches
    println!("\n=== Step 1: Apply patches ===");
    let output = run(&workspace, &["apply"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Version: 1.3.0"));
    assert!(stdout.contains("3 applied"));

    let booking =
        fs::read_to_string(workspace.path().join("src/components/Booking.jsx")).unwrap();
    assert_eq!(
        booking,
        r#"export function Booking({ slot }) {
  const [open, setOpen] = useState(false);
  // region: consultation-popup
  return <ConsultationPopup slot={slot} open={open} onClose={() => setOpen(false)} />;
  // endregion: consultation-popup
}
"#
    );

    let api = fs::read_to_string(workspace.path().join("src/api.js")).unwrap();
    assert_eq!(
        api,
        r#"export async function book(slot) {
  const res = await fetch(`/api/book/${slot.id}`);
  return res.json();
}
"#
    );

    // Step 2: Verify
    println!("\n=== Step 2: Verify patches ===");
    let output = run(&workspace, &["verify"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("3 verified"));

    // Step 3: Status
    println!("\n=== Step 3: Status ===");
    let output = run(&workspace, &["status"]);
    assert!(output.status.success());
    assert!(!String::from_utf8_lossy(&output.stdout).contains("NOT APPLIED"));

    // Step 4: Idempotency
    println!("\n=== Step 4: Re-apply ===");
    let output = run(&workspace, &["apply"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0 applied"));
    assert!(stdout.contains("3 already applied"));

    assert_eq!(
        fs::read_to_string(workspace.path().join("src/components/Booking.jsx")).unwrap(),
        booking
    );
    assert_eq!(
        fs::read_to_string(workspace.path().join("src/api.js")).unwrap(),
        api
    );
}

#[test]
fn test_e2e_upgrade_skips_old_patch_set() {
    let workspace = setup_e2e_workspace();
    fs::write(
        workspace.path().join("package.json"),
        r#"{ "name": "clinic-web", "version": "2.0.0" }"#,
    )
    .unwrap();

    let output = run(&workspace, &["apply"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 skipped"));
    assert!(stdout.contains("2 applied"));

    let booking =
        fs::read_to_string(workspace.path().join("src/components/Booking.jsx")).unwrap();
    assert!(booking.contains("LegacyPopup"));
    assert!(!booking.contains("console.log"));
}
