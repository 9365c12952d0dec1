//! Phase 4 orchestration: drive [`crate::artwork_resolver`] over every
//! artwork with a Linked Art URI and `tier2_done = false`, through the
//! bounded-concurrency dispatcher (spec.md §4.4). Applies the failure
//! taxonomy at the write boundary: 404 marks the row done with null fields,
//! a transient failure leaves it untouched for the next `--resume` run.

use rusqlite::Connection;
use tracing::info;

use crate::artwork_resolver::{fetch_artwork, resolve_tier2, FetchOutcome, Tier2Fields};
use crate::dispatcher;
use crate::error::Result;

pub struct Tier2Stats {
    pub attempted: usize,
    pub completed: usize,
    pub not_found: usize,
    pub failed: usize,
    pub mappings_written: usize,
    pub unknown_unit_count: u32,
}

struct ResolvedArtwork {
    object_number: String,
    fields: Option<Tier2Fields>,
}

fn pending_artworks(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT object_number, linked_art_uri FROM artworks
         WHERE linked_art_uri IS NOT NULL AND tier2_done = 0",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .filter_map(std::result::Result::ok)
        .collect();
    Ok(rows)
}

/// Run (or resume) Tier-2 enrichment over every pending artwork.
pub async fn resolve_pending(
    conn: &Connection,
    client: &reqwest::Client,
    parallelism: usize,
) -> Result<Tier2Stats> {
    let pending = pending_artworks(conn)?;
    let attempted = pending.len();
    info!(attempted, "resolving pending Tier-2 artwork enrichment");

    let client = client.clone();
    let mut not_found = 0usize;
    let mut mappings_written = 0usize;
    let mut unknown_unit_count = 0u32;

    let mut update_full = conn.prepare(
        "UPDATE artworks SET
            inscription = ?1, provenance = ?2, credit_line = ?3, description = ?4,
            narrative = ?5, all_titles = ?6, height_cm = ?7, width_cm = ?8,
            date_earliest = ?9, date_latest = ?10, tier2_done = 1
         WHERE object_number = ?11",
    )?;
    let mut mark_done = conn.prepare("UPDATE artworks SET tier2_done = 1 WHERE object_number = ?1")?;
    let mut insert_mapping = conn.prepare(
        "INSERT OR IGNORE INTO mappings (object_number, vocab_id, field) VALUES (?1, ?2, ?3)",
    )?;

    let (completed, failed) = dispatcher::run(
        pending,
        parallelism,
        500,
        move |(object_number, linked_art_uri): (String, String)| {
            let client = client.clone();
            async move {
                match fetch_artwork(&client, &linked_art_uri).await {
                    FetchOutcome::Found(data) => {
                        let fields = resolve_tier2(&object_number, &data);
                        Some(ResolvedArtwork {
                            object_number,
                            fields: Some(fields),
                        })
                    }
                    FetchOutcome::NotFound => Some(ResolvedArtwork {
                        object_number,
                        fields: None,
                    }),
                    FetchOutcome::Transient => None,
                }
            }
        },
        |resolved: ResolvedArtwork| match resolved.fields {
            Some(fields) => {
                let _ = update_full.execute((
                    &fields.inscription,
                    &fields.provenance,
                    &fields.credit_line,
                    &fields.description,
                    &fields.narrative,
                    &fields.all_titles,
                    &fields.height_cm,
                    &fields.width_cm,
                    &fields.date_earliest,
                    &fields.date_latest,
                    &resolved.object_number,
                ));
                for m in &fields.mappings {
                    let _ = insert_mapping.execute((&m.object_number, &m.vocab_id, &m.field));
                    mappings_written += 1;
                }
                unknown_unit_count += fields.unknown_unit_count;
            }
            None => {
                let _ = mark_done.execute((&resolved.object_number,));
                not_found += 1;
            }
        },
    )
    .await;

    Ok(Tier2Stats {
        attempted,
        completed,
        not_found,
        failed,
        mappings_written,
        unknown_unit_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;

    #[tokio::test]
    async fn only_pending_artworks_with_a_linked_art_uri_are_attempted() {
        let conn = store::open_in_memory().unwrap();
        store::init_ingest_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO artworks (object_number, linked_art_uri, tier2_done) VALUES
             ('SK-A-1', 'http://127.0.0.1:0/SK-A-1', 0),
             ('SK-A-2', NULL, 0),
             ('SK-A-3', 'http://127.0.0.1:0/SK-A-3', 1)",
            [],
        )
        .unwrap();

        let client = reqwest::Client::new();
        let stats = resolve_pending(&conn, &client, 2).await.unwrap();
        assert_eq!(stats.attempted, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.not_found, 0);
    }
}
