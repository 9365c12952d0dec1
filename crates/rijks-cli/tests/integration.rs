//! Integration tests for the rijks-harvest CLI.
//!
//! These exercise the compiled binary end to end against wiremock-mocked
//! Rijksmuseum endpoints and a scratch SQLite store, so no real network
//! access or pre-existing fixtures are required.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use rusqlite::Connection;
use tempfile::TempDir;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Get a Command for the rijks-harvest binary
#[allow(deprecated)]
fn rijks() -> Command {
    Command::cargo_bin("rijks-harvest").expect("Failed to find rijks-harvest binary")
}

fn write_local_config(workspace: &Path, body: &str) {
    let dir = workspace.join(".rijks-harvest");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), body).unwrap();
}

// ============================================================================
// Harvest Command Integration Tests
// ============================================================================

#[tokio::test]
async fn test_harvest_phase_0_5_seeds_sets_from_oai() {
    let server = MockServer::start().await;
    let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <ListSets>
    <set><setSpec>rembrandt</setSpec><setName>Rembrandt van Rijn</setName></set>
    <set><setSpec>vermeer</setSpec><setName>Johannes Vermeer</setName></set>
  </ListSets>
</OAI-PMH>"#;
    Mock::given(method("GET"))
        .and(query_param("verb", "ListSets"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let workspace = TempDir::new().unwrap();
    let db_path = workspace.path().join("data/vocabulary.db");
    write_local_config(
        workspace.path(),
        &format!("[rijksmuseum]\noai_pmh_url = \"{}\"\n", server.uri()),
    );

    rijks()
        .current_dir(workspace.path())
        .args([
            "harvest",
            "--phase",
            "0.5",
            "--quiet",
            "--db-path",
            db_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    let conn = Connection::open(&db_path).unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM vocabulary WHERE vocab_type = 'set'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(count, 2);
}

// ============================================================================
// Normalize Command Integration Tests
// ============================================================================

#[test]
fn test_normalize_is_idempotent() {
    let workspace = TempDir::new().unwrap();
    let db_path = workspace.path().join("data/vocabulary.db");

    rijks()
        .current_dir(workspace.path())
        .args(["normalize", "--quiet", "--db-path", db_path.to_str().unwrap()])
        .assert()
        .success();

    // A second pass over an already-normalized store must also succeed.
    rijks()
        .current_dir(workspace.path())
        .args(["normalize", "--quiet", "--db-path", db_path.to_str().unwrap()])
        .assert()
        .success();
}

#[test]
fn test_normalize_imports_geo_csv() {
    let workspace = TempDir::new().unwrap();
    let db_path = workspace.path().join("data/vocabulary.db");

    {
        let conn = rijks_core::store::open(&db_path, -64000).unwrap();
        rijks_core::store::init_ingest_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO vocabulary (id, vocab_type, label_en) VALUES ('p1', 'place', 'Amsterdam')",
            [],
        )
        .unwrap();
    }

    let csv_path = workspace.path().join("geo.csv");
    std::fs::write(
        &csv_path,
        "id,place_name,label_en,label_nl,external_id,lat,lon,artwork_count\n\
         p1,Amsterdam,Amsterdam,Amsterdam,,52.37,4.89,100\n",
    )
    .unwrap();

    rijks()
        .current_dir(workspace.path())
        .args([
            "normalize",
            "--quiet",
            "--db-path",
            db_path.to_str().unwrap(),
            "--geo-csv",
            csv_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    let conn = Connection::open(&db_path).unwrap();
    let lat: f64 = conn
        .query_row("SELECT lat FROM vocabulary WHERE id = 'p1'", [], |r| r.get(0))
        .unwrap();
    assert!((lat - 52.37).abs() < 1e-9);
}

// ============================================================================
// Geocode Command Integration Tests
// ============================================================================

#[test]
fn test_geocode_dry_run_does_not_write_coordinates() {
    let workspace = TempDir::new().unwrap();
    let db_path = workspace.path().join("data/vocabulary.db");

    {
        let conn = rijks_core::store::open(&db_path, -64000).unwrap();
        rijks_core::store::init_ingest_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO vocabulary (id, vocab_type, external_id) VALUES
             ('p1', 'place', 'https://www.geonames.org/2759794')",
            [],
        )
        .unwrap();
    }

    write_local_config(
        workspace.path(),
        "[geocoder]\ngeonames_username = \"test_user\"\n",
    );

    rijks()
        .current_dir(workspace.path())
        .args([
            "geocode",
            "--phase",
            "1a",
            "--dry-run",
            "--quiet",
            "--db-path",
            db_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    let conn = Connection::open(&db_path).unwrap();
    let lat: Option<f64> = conn
        .query_row("SELECT lat FROM vocabulary WHERE id = 'p1'", [], |r| r.get(0))
        .unwrap();
    assert!(lat.is_none());
}

#[test]
fn test_geocode_phase_1a_without_username_fails() {
    let workspace = TempDir::new().unwrap();
    let db_path = workspace.path().join("data/vocabulary.db");

    rijks()
        .current_dir(workspace.path())
        .args([
            "geocode",
            "--phase",
            "1a",
            "--quiet",
            "--db-path",
            db_path.to_str().unwrap(),
        ])
        .env_remove("GEONAMES_USERNAME")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GeoNames username"));
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
