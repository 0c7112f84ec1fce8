//! CLI integration tests for iecport.
//!
//! None of these need the board manager or the transpiler: they cover the
//! paths that fail or finish before any tool runs.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get the iecport binary command, isolated from the user's configuration.
fn iecport(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("iecport").unwrap();
    cmd.env("HOME", home)
        .env_remove("IECPORT_ROOT")
        .current_dir(home);
    cmd
}

/// Installation root with a one-board catalog and a program, but no tools.
fn install_root() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(
        src.join("hals.json"),
        r#"{
  "Arduino Uno": {
    "platform": "arduino:avr:uno",
    "core": "arduino:avr",
    "source": "uno.cpp",
    "last_update": 1700000000.5,
    "version": "1.8.6"
  }
}"#,
    )
    .unwrap();
    fs::write(tmp.path().join("blink.st"), "PROGRAM blink\nEND_PROGRAM\n").unwrap();
    tmp
}

// ============================================================================
// iecport --help / completions
// ============================================================================

#[test]
fn test_help_lists_subcommands() {
    let tmp = TempDir::new().unwrap();
    iecport(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("boards"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();
    iecport(tmp.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("iecport"));
}

// ============================================================================
// iecport boards
// ============================================================================

#[test]
fn test_boards_lists_catalog() {
    let root = install_root();
    iecport(root.path())
        .arg("--root")
        .arg(root.path())
        .arg("boards")
        .assert()
        .success()
        .stdout(predicate::str::contains("Arduino Uno"))
        .stdout(predicate::str::contains("arduino:avr:uno"))
        .stdout(predicate::str::contains("1.8.6"));
}

#[test]
fn test_boards_json_normalizes_timestamps() {
    let root = install_root();
    let output = iecport(root.path())
        .arg("--root")
        .arg(root.path())
        .args(["boards", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let uno = &json["Arduino Uno"];
    assert_eq!(uno["core"], "arduino:avr");
    assert!(uno["last_update"].as_str().unwrap().starts_with("2023-11-14"));
}

#[test]
fn test_boards_without_catalog_fails() {
    let tmp = TempDir::new().unwrap();
    iecport(tmp.path())
        .arg("--root")
        .arg(tmp.path())
        .arg("boards")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read board catalog"));
}

// ============================================================================
// iecport build
// ============================================================================

#[test]
fn test_build_unknown_board() {
    let root = install_root();
    iecport(root.path())
        .arg("--root")
        .arg(root.path())
        .args(["build", "--board", "Nope", "--program", "blink.st"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown board `Nope`"))
        .stderr(predicate::str::contains("Arduino Uno"));
}

#[test]
fn test_build_missing_program() {
    let root = install_root();
    iecport(root.path())
        .arg("--root")
        .arg(root.path())
        .args(["build", "-b", "Arduino Uno", "-p", "missing.st"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.st"));
}

#[test]
fn test_build_without_tools_reports_missing_tool() {
    let root = install_root();
    iecport(root.path())
        .arg("--root")
        .arg(root.path())
        .args(["build", "-b", "Arduino Uno", "-p", "blink.st", "--no-settle"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("not found at"));

    let log = fs::read_to_string(root.path().join("src/build.log")).unwrap();
    assert!(log.contains("not found at"));
}

#[test]
fn test_build_json_reports_failed_phase() {
    let root = install_root();
    let output = iecport(root.path())
        .arg("--root")
        .arg(root.path())
        .args([
            "build",
            "-b",
            "Arduino Uno",
            "-p",
            "blink.st",
            "--no-settle",
            "--message-format",
            "json",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let last: serde_json::Value =
        serde_json::from_str(stdout.lines().last().unwrap()).unwrap();
    assert_eq!(last["reason"], "build-finished");
    assert_eq!(last["success"], false);
    assert_eq!(last["failed_phase"], "verify-toolchain");
}

#[test]
fn test_build_rejects_invalid_policy() {
    let root = install_root();
    iecport(root.path())
        .args(["build", "-b", "Arduino Uno", "-p", "blink.st", "--policy", "sometimes"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("sometimes"));
}

#[test]
fn test_build_requires_board() {
    let root = install_root();
    iecport(root.path())
        .args(["build", "-p", "blink.st"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--board"));
}

#[test]
fn test_quiet_conflicts_with_verbose() {
    let tmp = TempDir::new().unwrap();
    iecport(tmp.path())
        .args(["-q", "-v", "boards"])
        .assert()
        .failure();
}

// ============================================================================
// iecport core / lib / doctor
// ============================================================================

#[test]
fn test_core_status_without_board_manager() {
    let root = install_root();
    iecport(root.path())
        .arg("--root")
        .arg(root.path())
        .args(["core", "status", "Arduino Uno"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("arduino-cli not found"));
}

#[test]
fn test_lib_install_without_board_manager() {
    let root = install_root();
    iecport(root.path())
        .arg("--root")
        .arg(root.path())
        .args(["lib", "install"])
        .assert()
        .code(3);
}

#[test]
fn test_doctor_empty_root_fails() {
    let tmp = TempDir::new().unwrap();
    iecport(tmp.path())
        .arg("--root")
        .arg(tmp.path())
        .arg("doctor")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Board manager"))
        .stdout(predicate::str::contains("Transpiler"))
        .stderr(predicate::str::contains("required checks failed"));
}

#[test]
fn test_root_from_environment() {
    let root = install_root();
    iecport(root.path())
        .env("IECPORT_ROOT", root.path())
        .arg("boards")
        .assert()
        .success()
        .stdout(predicate::str::contains("Arduino Uno"));
}
