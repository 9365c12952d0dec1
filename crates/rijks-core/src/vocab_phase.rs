//! Phase 2 / Phase 2-bis orchestration: drive [`crate::vocab_resolver`] over
//! every vocabulary id a mapping edge references but `vocabulary` doesn't
//! have a row for yet, through the bounded-concurrency dispatcher (spec.md
//! §4.3). Invoked once after P1 (P2) and again after P4 once production_role
//! / attribution_qualifier edges exist (P2-bis).

use rusqlite::Connection;

use crate::dispatcher;
use crate::error::Result;
use crate::model::VocabularyTerm;
use crate::vocab_resolver::{fetch_entity, resolve_term};

pub struct VocabResolveStats {
    pub attempted: usize,
    pub resolved: usize,
    pub failed: usize,
}

fn missing_vocab_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT m.vocab_id FROM mappings m
         LEFT JOIN vocabulary v ON v.id = m.vocab_id
         WHERE v.id IS NULL",
    )?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .filter_map(std::result::Result::ok)
        .collect();
    Ok(ids)
}

/// Resolve every vocabulary id referenced by a mapping edge but absent from
/// `vocabulary`. Existing rows are never overwritten (labels are only ever
/// added by `INSERT OR IGNORE`, per spec.md §3 "Lifecycles").
pub async fn resolve_missing(
    conn: &Connection,
    client: &reqwest::Client,
    linked_art_base: &str,
    parallelism: usize,
) -> Result<VocabResolveStats> {
    let ids = missing_vocab_ids(conn)?;
    let attempted = ids.len();

    let client = client.clone();
    let linked_art_base = linked_art_base.to_string();
    let mut resolved = 0usize;
    let mut insert = conn.prepare(
        "INSERT OR IGNORE INTO vocabulary
            (id, vocab_type, label_en, label_nl, external_id, broader_id, notation, lat, lon)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;

    let (_, failed) = dispatcher::run(
        ids,
        parallelism,
        1000,
        move |id: String| {
            let client = client.clone();
            let linked_art_base = linked_art_base.clone();
            async move {
                let data = fetch_entity(&client, &linked_art_base, &id).await?;
                resolve_term(&id, &data)
            }
        },
        |term: VocabularyTerm| {
            let _ = insert.execute((
                &term.id,
                &term.vocab_type,
                &term.label_en,
                &term.label_nl,
                &term.external_id,
                &term.broader_id,
                &term.notation,
                &term.lat,
                &term.lon,
            ));
            resolved += 1;
        },
    )
    .await;

    Ok(VocabResolveStats {
        attempted,
        resolved,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;

    #[tokio::test]
    async fn attempts_only_ids_missing_a_vocabulary_row() {
        let conn = store::open_in_memory().unwrap();
        store::init_ingest_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO vocabulary (id, vocab_type, label_en) VALUES ('v1', 'classification', 'Oil paint')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO mappings (object_number, vocab_id, field) VALUES
             ('SK-A-1', 'v1', 'material'),
             ('SK-A-1', 'v2', 'subject')",
            [],
        )
        .unwrap();

        let client = reqwest::Client::new();
        let stats = resolve_missing(&conn, &client, "http://127.0.0.1:0", 2)
            .await
            .unwrap();
        assert_eq!(stats.attempted, 1);
        assert_eq!(stats.resolved, 0);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn nothing_missing_is_a_no_op() {
        let conn = store::open_in_memory().unwrap();
        store::init_ingest_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO vocabulary (id, vocab_type, label_en) VALUES ('v1', 'classification', 'Oil paint')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO mappings (object_number, vocab_id, field) VALUES ('SK-A-1', 'v1', 'material')",
            [],
        )
        .unwrap();

        let client = reqwest::Client::new();
        let stats = resolve_missing(&conn, &client, "http://127.0.0.1:0", 2)
            .await
            .unwrap();
        assert_eq!(stats.attempted, 0);
    }
}
