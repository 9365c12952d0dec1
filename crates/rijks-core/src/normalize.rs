//! Phase 3: normalizer (spec.md §4.7).
//!
//! Rewrites the wide, string-keyed ingest schema into the dense
//! integer-surrogate shape. Idempotent: re-running against an already
//! normalized store is a no-op, detected via [`store::mappings_is_normalized`].

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;
use crate::store;

#[derive(Debug, Default)]
pub struct NormalizeStats {
    pub already_normalized: bool,
    pub vocab_surrogates_assigned: u64,
    pub artwork_surrogates_assigned: u64,
    pub mapping_rows: u64,
    pub orphaned_mappings: u64,
    pub rights_distinct: u64,
}

pub fn normalize(conn: &mut Connection) -> Result<NormalizeStats> {
    if store::mappings_is_normalized(conn)? {
        info!("store already normalized, nothing to do");
        return Ok(NormalizeStats {
            already_normalized: true,
            ..Default::default()
        });
    }

    let tx = conn.transaction()?;
    let mut stats = NormalizeStats::default();

    // 1. Dense surrogate ids on vocabulary/artworks.
    stats.vocab_surrogates_assigned = tx.execute(
        "WITH ranked AS (SELECT id, ROW_NUMBER() OVER (ORDER BY id) AS rn FROM vocabulary)
         UPDATE vocabulary SET surrogate_id = (SELECT rn FROM ranked WHERE ranked.id = vocabulary.id)
         WHERE surrogate_id IS NULL",
        [],
    )? as u64;
    tx.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_vocabulary_surrogate ON vocabulary(surrogate_id)",
        [],
    )?;

    stats.artwork_surrogates_assigned = tx.execute(
        "WITH ranked AS (SELECT object_number, ROW_NUMBER() OVER (ORDER BY object_number) AS rn FROM artworks)
         UPDATE artworks SET surrogate_id = (SELECT rn FROM ranked WHERE ranked.object_number = artworks.object_number)
         WHERE surrogate_id IS NULL",
        [],
    )? as u64;
    tx.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_artworks_surrogate ON artworks(surrogate_id)",
        [],
    )?;

    // 2. field_lookup.
    tx.execute(
        "CREATE TABLE IF NOT EXISTS field_lookup (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
        [],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO field_lookup (name)
         SELECT DISTINCT field FROM mappings ORDER BY field",
        [],
    )?;

    // 3. Composite-PK narrow mapping table, joined against surrogate ids.
    tx.execute("DROP TABLE IF EXISTS mappings_new", [])?;
    tx.execute(
        "CREATE TABLE mappings_new (
            artwork_id  INTEGER NOT NULL,
            vocab_rowid INTEGER NOT NULL,
            field_id    INTEGER NOT NULL,
            PRIMARY KEY (artwork_id, vocab_rowid, field_id)
        ) WITHOUT ROWID",
        [],
    )?;
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO mappings_new (artwork_id, vocab_rowid, field_id)
         SELECT a.surrogate_id, v.surrogate_id, f.id
         FROM mappings m
         JOIN artworks a ON a.object_number = m.object_number
         JOIN vocabulary v ON v.id = m.vocab_id
         JOIN field_lookup f ON f.name = m.field",
        [],
    )? as u64;
    let total_mappings: u64 = tx.query_row("SELECT COUNT(*) FROM mappings", [], |r| r.get(0))?;
    stats.orphaned_mappings = total_mappings.saturating_sub(inserted);
    stats.mapping_rows = inserted;

    // 4. Crash-safe two-step rename: a crash here leaves both tables present,
    // and `mappings_is_normalized` (checking for the `artwork_id` column)
    // detects the already-normalized shape on re-entry.
    tx.execute("ALTER TABLE mappings RENAME TO mappings_old", [])?;
    tx.execute("ALTER TABLE mappings_new RENAME TO mappings", [])?;
    tx.execute("DROP TABLE mappings_old", [])?;

    // 5. Secondary indexes matching the new shape.
    tx.execute("CREATE INDEX IF NOT EXISTS idx_mappings_vocab ON mappings(vocab_rowid)", [])?;
    tx.execute("CREATE INDEX IF NOT EXISTS idx_mappings_field ON mappings(field_id)", [])?;

    // 6. Rights URI lookup table + surrogate FK.
    tx.execute(
        "CREATE TABLE IF NOT EXISTS rights_lookup (id INTEGER PRIMARY KEY, uri TEXT NOT NULL UNIQUE)",
        [],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO rights_lookup (uri)
         SELECT DISTINCT rights_uri FROM artworks WHERE rights_uri IS NOT NULL",
        [],
    )?;
    tx.execute(
        "UPDATE artworks SET rights_id = (SELECT id FROM rights_lookup WHERE uri = artworks.rights_uri)
         WHERE rights_uri IS NOT NULL",
        [],
    )?;
    stats.rights_distinct = tx.query_row("SELECT COUNT(*) FROM rights_lookup", [], |r| r.get(0))?;
    // Column drop is best-effort: older SQLite builds without DROP COLUMN
    // support simply keep rights_uri as dead weight (spec.md §4.7 step 6).
    let _ = tx.execute("ALTER TABLE artworks DROP COLUMN rights_uri", []);

    // 7. Derived structures.
    tx.execute("DROP TABLE IF EXISTS vocab_term_counts", [])?;
    tx.execute(
        "CREATE TABLE vocab_term_counts AS
         SELECT vocab_rowid, COUNT(*) AS cnt FROM mappings GROUP BY vocab_rowid",
        [],
    )?;
    tx.execute("CREATE INDEX idx_vtc_cnt ON vocab_term_counts(cnt DESC)", [])?;

    tx.execute(
        "UPDATE vocabulary SET label_en_norm = lower(replace(label_en, ' ', '')) WHERE label_en IS NOT NULL",
        [],
    )?;
    tx.execute(
        "UPDATE vocabulary SET label_nl_norm = lower(replace(label_nl, ' ', '')) WHERE label_nl IS NOT NULL",
        [],
    )?;

    tx.execute("DROP TABLE IF EXISTS vocabulary_fts", [])?;
    tx.execute(
        "CREATE VIRTUAL TABLE vocabulary_fts USING fts5(
            label_en, label_nl,
            content='vocabulary', content_rowid='rowid',
            tokenize='unicode61 remove_diacritics 2'
        )",
        [],
    )?;
    tx.execute("INSERT INTO vocabulary_fts(vocabulary_fts) VALUES('rebuild')", [])?;

    let person_name_rows: u64 = tx.query_row("SELECT COUNT(*) FROM person_names", [], |r| r.get(0))?;
    if person_name_rows > 0 {
        tx.execute("DROP TABLE IF EXISTS person_names_fts", [])?;
        tx.execute(
            "CREATE VIRTUAL TABLE person_names_fts USING fts5(
                content,
                content='person_names', content_rowid='rowid',
                tokenize='unicode61 remove_diacritics 2'
            )",
            [],
        )?;
        tx.execute("INSERT INTO person_names_fts(person_names_fts) VALUES('rebuild')", [])?;
    }

    tx.execute("DROP TABLE IF EXISTS artwork_texts_fts", [])?;
    tx.execute(
        "CREATE VIRTUAL TABLE artwork_texts_fts USING fts5(
            title, inscription, provenance, credit_line, description, narrative, all_titles,
            content='artworks', content_rowid='rowid',
            tokenize='unicode61 remove_diacritics 2'
        )",
        [],
    )?;
    tx.execute("INSERT INTO artwork_texts_fts(artwork_texts_fts) VALUES('rebuild')", [])?;

    let has_dimensions: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM artworks WHERE height_cm IS NOT NULL OR width_cm IS NOT NULL)",
        [],
        |r| r.get(0),
    )?;
    if has_dimensions {
        tx.execute(
            "CREATE INDEX IF NOT EXISTS idx_artworks_dimensions ON artworks(height_cm, width_cm)",
            [],
        )?;
    }
    let has_dates: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM artworks WHERE date_earliest IS NOT NULL)",
        [],
        |r| r.get(0),
    )?;
    if has_dates {
        tx.execute(
            "CREATE INDEX IF NOT EXISTS idx_artworks_dates ON artworks(date_earliest, date_latest)",
            [],
        )?;
    }
    let has_coords: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM vocabulary WHERE lat IS NOT NULL)",
        [],
        |r| r.get(0),
    )?;
    if has_coords {
        tx.execute(
            "CREATE INDEX IF NOT EXISTS idx_vocabulary_coords ON vocabulary(lat, lon)",
            [],
        )?;
    }

    tx.commit()?;

    // 8. Compact. Requires the vec0 extension still registered so the KNN
    // virtual table's shadow tables resolve during the rebuild.
    conn.execute("VACUUM", [])?;

    info!(
        mapping_rows = stats.mapping_rows,
        orphaned_mappings = stats.orphaned_mappings,
        "normalization complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> Connection {
        let conn = store::open_in_memory().unwrap();
        store::init_ingest_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO vocabulary (id, vocab_type, label_en) VALUES ('v1', 'classification', 'Dog'), ('v2', 'place', 'Amsterdam')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO artworks (object_number, title, rights_uri) VALUES ('SK-A-1', 'Night Watch', 'http://rights.example/cc0')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO mappings (object_number, vocab_id, field) VALUES ('SK-A-1', 'v1', 'subject'), ('SK-A-1', 'missing', 'subject')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn normalizes_and_drops_orphaned_mapping() {
        let mut conn = seeded_store();
        let stats = normalize(&mut conn).unwrap();
        assert!(!stats.already_normalized);
        assert_eq!(stats.mapping_rows, 1);
        assert_eq!(stats.orphaned_mappings, 1);
        assert!(store::mappings_is_normalized(&conn).unwrap());
    }

    #[test]
    fn is_idempotent_on_second_run() {
        let mut conn = seeded_store();
        normalize(&mut conn).unwrap();
        let second = normalize(&mut conn).unwrap();
        assert!(second.already_normalized);
    }

    #[test]
    fn builds_rights_lookup() {
        let mut conn = seeded_store();
        let stats = normalize(&mut conn).unwrap();
        assert_eq!(stats.rights_distinct, 1);
    }
}
