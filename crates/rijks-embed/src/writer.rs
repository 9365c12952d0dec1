//! Streaming embed → quantize → write pipeline (spec.md §4.6), grounded on
//! `generate-embeddings-v2.py::embed_and_write`/`validate`.

use std::collections::HashSet;

use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::text::{load_composite_texts, CompositeText};

/// Flush accumulated rows to disk once this many are pending (spec.md §4.6).
const FLUSH_THRESHOLD: usize = 5000;

#[derive(Debug, Default, Clone)]
pub struct WriteStats {
    pub total_candidates: usize,
    pub encoded: usize,
    pub skipped_existing: usize,
    pub skipped_empty: usize,
    pub dangling_reembedded: usize,
}

struct PendingRow {
    artwork_id: i64,
    object_number: String,
    text: String,
    blob: Vec<u8>,
}

/// Create the `vec0` KNN virtual table if missing. Requires the `vec0`
/// extension already registered on `conn` (see `rijks_core::store`).
pub fn ensure_vec_table(conn: &Connection, dimension: usize) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS vec_artworks USING vec0(
            artwork_id INTEGER PRIMARY KEY,
            embedding int8[{dimension}] distance_metric=cosine
        )"
    ))?;
    Ok(())
}

/// `(in_blob_table, in_knn_table)` artwork ids, for resume-mode diffing.
fn existing_ids(conn: &Connection) -> Result<(HashSet<i64>, HashSet<i64>)> {
    let mut blob_stmt = conn.prepare(
        "SELECT a.surrogate_id FROM artwork_embeddings e
         JOIN artworks a ON a.object_number = e.object_number",
    )?;
    let in_blob: HashSet<i64> = blob_stmt
        .query_map([], |r| r.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    let mut vec_stmt = conn.prepare("SELECT artwork_id FROM vec_artworks")?;
    let in_vec: HashSet<i64> = vec_stmt
        .query_map([], |r| r.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    Ok((in_blob, in_vec))
}

fn flush(conn: &mut Connection, rows: &[PendingRow]) -> Result<()> {
    let tx = conn.transaction()?;
    {
        let mut upsert = tx.prepare(
            "INSERT OR REPLACE INTO artwork_embeddings (object_number, source_text, source_hash, vector)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        // vec0 does not support upsert (sqlite-vec #259): delete then insert.
        let mut delete_vec = tx.prepare("DELETE FROM vec_artworks WHERE artwork_id = ?1")?;
        let mut insert_vec =
            tx.prepare("INSERT INTO vec_artworks (artwork_id, embedding) VALUES (?1, vec_int8(?2))")?;

        for row in rows {
            let hash = format!("{:x}", Sha256::digest(row.text.as_bytes()));
            let hash = &hash[..16];
            upsert.execute((&row.object_number, &row.text, hash, &row.blob))?;
            delete_vec.execute((row.artwork_id,))?;
            insert_vec.execute((row.artwork_id, &row.blob))?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Stream composite texts through `provider`, quantize, and write to both
/// the keyed BLOB table and the `vec0` KNN table.
pub async fn run(
    conn: &mut Connection,
    provider: &dyn EmbeddingProvider,
    batch_size: usize,
    resume: bool,
) -> Result<WriteStats> {
    ensure_vec_table(conn, provider.embedding_dim())?;

    let candidates = load_composite_texts(conn)?;
    let mut stats = WriteStats {
        total_candidates: candidates.len(),
        ..Default::default()
    };

    let skip_ids: HashSet<i64> = if resume {
        let (in_blob, in_vec) = existing_ids(conn)?;
        let existing: HashSet<i64> = in_blob.intersection(&in_vec).copied().collect();
        let dangling: Vec<i64> = in_blob.difference(&existing).copied().collect();
        if !dangling.is_empty() {
            warn!(
                count = dangling.len(),
                "artwork_embeddings rows missing from vec_artworks, will re-embed"
            );
            stats.dangling_reembedded = dangling.len();
        }
        info!(already_embedded = existing.len(), "resume mode");
        existing
    } else {
        HashSet::new()
    };

    let mut pending: Vec<PendingRow> = Vec::new();

    for batch in candidates.chunks(batch_size.max(1)) {
        let to_embed: Vec<&CompositeText> = batch
            .iter()
            .filter(|c| {
                if skip_ids.contains(&c.artwork_id) {
                    stats.skipped_existing += 1;
                    false
                } else if c.text.is_empty() {
                    stats.skipped_empty += 1;
                    false
                } else {
                    true
                }
            })
            .collect();

        if to_embed.is_empty() {
            continue;
        }

        let texts: Vec<String> = to_embed.iter().map(|c| c.text.clone()).collect();
        let embeddings = provider.encode_passages(texts).await?;

        for (candidate, embedding) in to_embed.iter().zip(embeddings.iter()) {
            let blob = crate::quantize::quantize_to_bytes(embedding);
            pending.push(PendingRow {
                artwork_id: candidate.artwork_id,
                object_number: candidate.object_number.clone(),
                text: candidate.text.clone(),
                blob,
            });
            stats.encoded += 1;
        }

        if pending.len() >= FLUSH_THRESHOLD {
            flush(conn, &pending)?;
            pending.clear();
        }
    }

    if !pending.is_empty() {
        flush(conn, &pending)?;
    }

    info!(
        encoded = stats.encoded,
        skipped_existing = stats.skipped_existing,
        skipped_empty = stats.skipped_empty,
        "embedding write complete"
    );
    Ok(stats)
}

/// One validation mismatch between the `vec0` KNN fast path and brute-force
/// cosine distance over `artwork_embeddings`.
#[derive(Debug, Clone)]
pub struct ValidationMismatch {
    pub query: String,
    pub knn_top1: String,
    pub brute_force_top1: String,
}

/// Run `queries` (in query mode) and confirm the KNN top-1 hit matches
/// brute-force cosine distance over the full table (spec.md §4.6).
pub async fn validate(
    conn: &Connection,
    provider: &dyn EmbeddingProvider,
    queries: &[String],
) -> Result<Vec<ValidationMismatch>> {
    let embeddings = provider.encode_queries(queries.to_vec()).await?;
    let mut mismatches = Vec::new();

    for (query, embedding) in queries.iter().zip(embeddings.iter()) {
        let blob = crate::quantize::quantize_to_bytes(embedding);

        let brute_force_top1: Option<String> = conn
            .query_row(
                "SELECT object_number FROM artwork_embeddings
                 ORDER BY vec_distance_cosine(vector, vec_int8(?1)) LIMIT 1",
                (&blob,),
                |r| r.get(0),
            )
            .ok();

        let knn_top1: Option<String> = conn
            .query_row(
                "SELECT e.object_number
                 FROM vec_artworks v
                 JOIN artworks a ON a.surrogate_id = v.artwork_id
                 JOIN artwork_embeddings e ON e.object_number = a.object_number
                 WHERE v.embedding MATCH vec_int8(?1) AND k = 1
                 ORDER BY v.distance LIMIT 1",
                (&blob,),
                |r| r.get(0),
            )
            .ok();

        if let (Some(knn), Some(brute)) = (&knn_top1, &brute_force_top1) {
            if knn != brute {
                mismatches.push(ValidationMismatch {
                    query: query.clone(),
                    knn_top1: knn.clone(),
                    brute_force_top1: brute.clone(),
                });
            }
        }
    }

    Ok(mismatches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rijks_core::{normalize, store};

    use crate::embeddings::{EmbeddingProviderType, ProviderStatus};

    struct FixedProvider {
        dim: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        async fn encode_passages(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| fake_vector(t, self.dim)).collect())
        }
        async fn encode_queries(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            self.encode_passages(texts).await
        }
        async fn check_status(&self) -> Result<ProviderStatus> {
            Ok(ProviderStatus::healthy(EmbeddingProviderType::Local, "CPU"))
        }
        async fn warmup(&self) -> Result<()> {
            Ok(())
        }
        fn embedding_dim(&self) -> usize {
            self.dim
        }
        fn provider_type(&self) -> EmbeddingProviderType {
            EmbeddingProviderType::Local
        }
    }

    fn fake_vector(seed: &str, dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dim];
        let h = seed.bytes().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
        v[(h as usize) % dim] = 1.0;
        v
    }

    fn seeded_store() -> Connection {
        let mut conn = store::open_in_memory().unwrap();
        store::init_ingest_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO artworks (object_number, title, tier2_done) VALUES
             ('SK-A-1', 'Still Life', 1),
             ('SK-A-2', 'Winter Scene', 1)",
            [],
        )
        .unwrap();
        normalize::normalize(&mut conn).unwrap();
        conn
    }

    #[tokio::test]
    async fn writes_to_both_blob_and_knn_tables() {
        let mut conn = seeded_store();
        let provider = FixedProvider { dim: 8 };
        let stats = run(&mut conn, &provider, 32, false).await.unwrap();
        assert_eq!(stats.encoded, 2);

        let blob_count: i64 = conn.query_row("SELECT COUNT(*) FROM artwork_embeddings", [], |r| r.get(0)).unwrap();
        let vec_count: i64 = conn.query_row("SELECT COUNT(*) FROM vec_artworks", [], |r| r.get(0)).unwrap();
        assert_eq!(blob_count, 2);
        assert_eq!(vec_count, 2);
    }

    #[tokio::test]
    async fn resume_skips_rows_present_in_both_tables() {
        let mut conn = seeded_store();
        let provider = FixedProvider { dim: 8 };
        run(&mut conn, &provider, 32, false).await.unwrap();

        let stats = run(&mut conn, &provider, 32, true).await.unwrap();
        assert_eq!(stats.encoded, 0);
        assert_eq!(stats.skipped_existing, 2);
    }

    #[tokio::test]
    async fn dangling_blob_row_without_vec_counterpart_is_reembedded() {
        let mut conn = seeded_store();
        let provider = FixedProvider { dim: 8 };
        run(&mut conn, &provider, 32, false).await.unwrap();

        conn.execute("DELETE FROM vec_artworks WHERE artwork_id = 1", []).unwrap();

        let stats = run(&mut conn, &provider, 32, true).await.unwrap();
        assert_eq!(stats.dangling_reembedded, 1);
        assert_eq!(stats.encoded, 1);
    }

    #[tokio::test]
    async fn validate_reports_no_mismatches_for_a_single_row_table() {
        let mut conn = seeded_store();
        let provider = FixedProvider { dim: 8 };
        run(&mut conn, &provider, 32, false).await.unwrap();

        let mismatches = validate(&conn, &provider, &["Still Life".to_string()]).await.unwrap();
        assert!(mismatches.is_empty());
    }
}
