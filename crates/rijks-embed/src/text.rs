//! Composite-text builder for the embedding pipeline (spec.md §4.6), grounded
//! on `generate-embeddings-v2.py::load_artworks`.
//!
//! Concatenates labeled segments in a fixed truncation-priority order —
//! the downstream encoder has a fixed token window and truncates from the
//! tail, so field order here doubles as importance order.

use std::collections::HashMap;

use rusqlite::Connection;

use crate::error::Result;

/// One artwork's composite text, ready for encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeText {
    /// Dense integer surrogate (`artworks.surrogate_id`), the KNN table's key.
    pub artwork_id: i64,
    pub object_number: String,
    pub text: String,
}

fn subject_labels(conn: &Connection) -> Result<HashMap<i64, Vec<String>>> {
    let mut stmt = conn.prepare(
        "SELECT m.artwork_id, COALESCE(v.label_en, v.label_nl) AS label
         FROM mappings m
         JOIN field_lookup f ON f.id = m.field_id AND f.name = 'subject'
         JOIN vocabulary v ON v.surrogate_id = m.vocab_rowid
         WHERE v.label_en IS NOT NULL OR v.label_nl IS NOT NULL",
    )?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?;

    let mut by_artwork: HashMap<i64, Vec<String>> = HashMap::new();
    for row in rows {
        let (artwork_id, label) = row?;
        by_artwork.entry(artwork_id).or_default().push(label);
    }
    Ok(by_artwork)
}

/// Build composite text for every artwork with the Tier-2-done flag set.
/// Artworks with no non-empty segment at all get an empty `text` — the
/// caller skips those rather than encoding a zero-length string.
pub fn load_composite_texts(conn: &Connection) -> Result<Vec<CompositeText>> {
    let subjects = subject_labels(conn)?;

    let mut stmt = conn.prepare(
        "SELECT surrogate_id, object_number, all_titles, title, creator, narrative, inscription, description
         FROM artworks
         WHERE tier2_done = 1
         ORDER BY surrogate_id",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, Option<String>>(2)?,
            r.get::<_, Option<String>>(3)?,
            r.get::<_, Option<String>>(4)?,
            r.get::<_, Option<String>>(5)?,
            r.get::<_, Option<String>>(6)?,
            r.get::<_, Option<String>>(7)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (surrogate_id, object_number, all_titles, title, creator, narrative, inscription, description) =
            row?;
        let title = all_titles.filter(|s| !s.is_empty()).or(title);
        let subject_labels = subjects.get(&surrogate_id);
        let subjects_joined = subject_labels.map(|labels| labels.join(", "));

        let fields: [(&str, Option<&str>); 6] = [
            ("Title", title.as_deref()),
            ("Creator", creator.as_deref()),
            ("Subjects", subjects_joined.as_deref()),
            ("Narrative", narrative.as_deref()),
            ("Inscriptions", inscription.as_deref()),
            ("Description", description.as_deref()),
        ];

        let text = fields
            .into_iter()
            .filter_map(|(label, value)| {
                let value = value?;
                if value.is_empty() {
                    None
                } else {
                    Some(format!("[{label}] {value}"))
                }
            })
            .collect::<Vec<_>>()
            .join(" ");

        out.push(CompositeText {
            artwork_id: surrogate_id,
            object_number,
            text,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rijks_core::{normalize, store};

    fn seeded_store() -> Connection {
        let conn = store::open_in_memory().unwrap();
        store::init_ingest_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO vocabulary (id, vocab_type, label_en) VALUES ('v1', 'concept', 'Vanitas')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO artworks (object_number, title, creator, narrative, tier2_done)
             VALUES ('SK-A-1', 'Still Life', 'Pieter Claesz', 'a memento mori composition', 1),
                    ('SK-A-2', 'Untitled', NULL, NULL, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO mappings (object_number, vocab_id, field) VALUES ('SK-A-1', 'v1', 'subject')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn builds_labeled_segments_in_truncation_priority_order() {
        let mut conn = seeded_store();
        normalize::normalize(&mut conn).unwrap();

        let texts = load_composite_texts(&conn).unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(
            texts[0].text,
            "[Title] Still Life [Creator] Pieter Claesz [Subjects] Vanitas [Narrative] a memento mori composition"
        );
    }

    #[test]
    fn excludes_non_tier2_artworks() {
        let mut conn = seeded_store();
        normalize::normalize(&mut conn).unwrap();

        let texts = load_composite_texts(&conn).unwrap();
        assert!(!texts.iter().any(|t| t.object_number == "SK-A-2"));
    }

    #[test]
    fn omits_empty_segments_entirely() {
        let mut conn = store::open_in_memory().unwrap();
        store::init_ingest_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO artworks (object_number, title, tier2_done) VALUES ('SK-A-3', 'Bare Title', 1)",
            [],
        )
        .unwrap();
        normalize::normalize(&mut conn).unwrap();

        let texts = load_composite_texts(&conn).unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].text, "[Title] Bare Title");
    }
}
