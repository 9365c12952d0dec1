//! CLI parsing tests for the rijks-harvest command.
//!
//! Tests that verify CLI argument parsing works correctly.

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a Command for the rijks-harvest binary
#[allow(deprecated)]
fn rijks() -> Command {
    Command::cargo_bin("rijks-harvest").expect("Failed to find rijks-harvest binary")
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_shows_all_commands() {
    rijks()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("harvest"))
        .stdout(predicate::str::contains("normalize"))
        .stdout(predicate::str::contains("geocode"))
        .stdout(predicate::str::contains("embed"));
}

#[test]
fn test_version_flag() {
    rijks()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rijks-harvest"));
}

// ============================================================================
// Global Options Tests
// ============================================================================

#[test]
fn test_global_options_in_help() {
    rijks()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--db-path"))
        .stdout(predicate::str::contains("--verbose"))
        .stdout(predicate::str::contains("--quiet"))
        .stdout(predicate::str::contains("--threads"));
}

#[test]
fn test_conflicting_verbose_quiet_not_prevented() {
    // clap doesn't prevent both by default, but our code handles it
    rijks()
        .args(["--verbose", "--quiet", "--help"])
        .assert()
        .success();
}

// ============================================================================
// Harvest Command Tests
// ============================================================================

#[test]
fn test_harvest_help() {
    rijks()
        .args(["harvest", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--phase"))
        .stdout(predicate::str::contains("--resume"))
        .stdout(predicate::str::contains("--skip-dump"))
        .stdout(predicate::str::contains("--dump-dir"));
}

#[test]
fn test_harvest_phase_accepts_value() {
    rijks()
        .args(["harvest", "--phase", "1", "--help"])
        .assert()
        .success();
}

// ============================================================================
// Normalize Command Tests
// ============================================================================

#[test]
fn test_normalize_help() {
    rijks()
        .args(["normalize", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--geo-csv"));
}

#[test]
fn test_normalize_geo_csv_accepts_path() {
    rijks()
        .args(["normalize", "--geo-csv", "/some/path.csv", "--help"])
        .assert()
        .success();
}

// ============================================================================
// Geocode Command Tests
// ============================================================================

#[test]
fn test_geocode_help() {
    rijks()
        .args(["geocode", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--phase"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--apply-reviewed"))
        .stdout(predicate::str::contains("--output-dir"))
        .stdout(predicate::str::contains("--search-concurrency"));
}

#[test]
fn test_geocode_phase_accepts_value() {
    rijks()
        .args(["geocode", "--phase", "1a", "--help"])
        .assert()
        .success();
}

#[test]
fn test_geocode_apply_reviewed_accepts_path() {
    rijks()
        .args(["geocode", "--apply-reviewed", "/some/reviewed.csv", "--help"])
        .assert()
        .success();
}

// ============================================================================
// Embed Command Tests
// ============================================================================

#[test]
fn test_embed_help() {
    rijks()
        .args(["embed", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"))
        .stdout(predicate::str::contains("--skip-validate"));
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[test]
fn test_unknown_command() {
    rijks()
        .args(["nonexistent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized"));
}

#[test]
fn test_unknown_option() {
    rijks()
        .args(["--nonexistent-option"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected"));
}
