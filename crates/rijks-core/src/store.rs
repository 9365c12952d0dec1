//! Embedded SQLite store: connection setup, pragmas, and the ingest-shape schema
//! (spec.md §5 concurrency/resource model, §6 output store).

use rusqlite::Connection;
use std::path::Path;
use std::sync::Once;
use tracing::debug;

use crate::error::Result;
use crate::model::VocabularyTerm;

static REGISTER_VEC_EXTENSION: Once = Once::new();

/// Register `sqlite-vec` as a SQLite auto-extension exactly once per process.
///
/// Rather than a client/server vector database, the `vec0` virtual table lives
/// inside the same embedded file as everything else (see DESIGN.md).
fn register_vec_extension() {
    REGISTER_VEC_EXTENSION.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute::<
            *const (),
            unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *mut std::os::raw::c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> std::os::raw::c_int,
        >(sqlite_vec::sqlite3_vec_init as *const ())));
    });
}

/// Open the store at `path`, applying the pragmas spec.md §5 prescribes
/// (`journal_mode=WAL`, `synchronous=NORMAL`, a 64 MB page cache) and
/// registering the `vec0` extension so KNN virtual-table DDL/DML resolves.
pub fn open(path: &Path, cache_size_kb: i64) -> Result<Connection> {
    register_vec_extension();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", cache_size_kb)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    debug!(path = %path.display(), "opened store");
    Ok(conn)
}

/// Open an in-memory store (tests only).
pub fn open_in_memory() -> Result<Connection> {
    register_vec_extension();
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

/// Create the ingest-shape schema (idempotent: `CREATE TABLE IF NOT EXISTS`).
///
/// This is the "wide" mapping shape spec.md §3 invariant 8 describes: a
/// `(object_number, vocab_id, field)` triple of TEXT columns. P3 rewrites it
/// into the narrow integer-surrogate shape.
pub fn init_ingest_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS vocabulary (
            id              TEXT PRIMARY KEY,
            vocab_type      TEXT,
            label_en        TEXT,
            label_nl        TEXT,
            external_id     TEXT,
            broader_id      TEXT,
            notation        TEXT,
            lat             REAL,
            lon             REAL,
            label_en_norm   TEXT,
            label_nl_norm   TEXT,
            surrogate_id    INTEGER
        );

        CREATE TABLE IF NOT EXISTS artworks (
            object_number   TEXT PRIMARY KEY,
            title           TEXT,
            creator         TEXT,
            rights_uri      TEXT,
            linked_art_uri  TEXT,
            inscription     TEXT,
            provenance      TEXT,
            credit_line     TEXT,
            description     TEXT,
            narrative       TEXT,
            all_titles      TEXT,
            height_cm       REAL,
            width_cm        REAL,
            date_earliest   INTEGER,
            date_latest     INTEGER,
            tier2_done      INTEGER NOT NULL DEFAULT 0,
            surrogate_id    INTEGER,
            rights_id       INTEGER
        );

        CREATE TABLE IF NOT EXISTS mappings (
            object_number   TEXT NOT NULL,
            vocab_id        TEXT NOT NULL,
            field           TEXT NOT NULL,
            PRIMARY KEY (object_number, vocab_id, field)
        );

        CREATE TABLE IF NOT EXISTS person_names (
            person_id       TEXT NOT NULL,
            content         TEXT NOT NULL,
            lang            TEXT,
            classification  TEXT NOT NULL,
            PRIMARY KEY (person_id, content, lang)
        );

        CREATE TABLE IF NOT EXISTS artwork_embeddings (
            object_number   TEXT PRIMARY KEY,
            source_text     TEXT NOT NULL,
            source_hash     TEXT NOT NULL,
            vector          BLOB NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_mappings_vocab ON mappings(vocab_id);
        CREATE INDEX IF NOT EXISTS idx_vocabulary_type ON vocabulary(vocab_type);
        CREATE INDEX IF NOT EXISTS idx_artworks_linked_art ON artworks(linked_art_uri)
            WHERE linked_art_uri IS NOT NULL;
        "#,
    )?;
    Ok(())
}

/// Insert one vocabulary term (P0/Phase 0 seed, never overwrites an existing
/// row — spec.md §3 "Lifecycles").
pub fn insert_vocabulary_term(conn: &Connection, term: &VocabularyTerm) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO vocabulary
            (id, vocab_type, label_en, label_nl, external_id, broader_id, notation, lat, lon)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        (
            &term.id,
            &term.vocab_type,
            &term.label_en,
            &term.label_nl,
            &term.external_id,
            &term.broader_id,
            &term.notation,
            &term.lat,
            &term.lon,
        ),
    )?;
    Ok(())
}

/// Whether the mapping table is still in the wide (ingest) shape or has been
/// rewritten to the narrow (normalized) shape (spec.md §3 invariant 8).
pub fn mappings_is_normalized(conn: &Connection) -> Result<bool> {
    let mut stmt = conn.prepare("PRAGMA table_info(mappings)")?;
    let has_artwork_id = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(std::result::Result::ok)
        .any(|name| name == "artwork_id");
    Ok(has_artwork_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        init_ingest_schema(&conn).unwrap();
        init_ingest_schema(&conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='vocabulary'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn fresh_store_is_wide_shape() {
        let conn = open_in_memory().unwrap();
        init_ingest_schema(&conn).unwrap();
        assert!(!mappings_is_normalized(&conn).unwrap());
    }

    #[test]
    fn vec_extension_loads() {
        let conn = open_in_memory().unwrap();
        let version: String = conn
            .query_row("SELECT vec_version()", [], |r| r.get(0))
            .unwrap();
        assert!(!version.is_empty());
    }
}
