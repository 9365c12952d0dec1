//! Phase 1a: GeoNames gazetteer lookup, grounded on
//! `geocode_places.py::phase_1a_geonames`.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{clock::DefaultClock, state::{InMemoryState, NotKeyed}, Quota, RateLimiter};
use rusqlite::Connection;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;
use crate::ids::extract_geonames_id;

type GazetteerLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Default)]
pub struct GazetteerStats {
    pub ids_attempted: usize,
    pub updated: usize,
    pub errors: usize,
}

fn ungeocoded_geonames(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT id, external_id FROM vocabulary
         WHERE vocab_type = 'place' AND lat IS NULL AND external_id LIKE '%geonames%'",
    )?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .filter_map(std::result::Result::ok)
        .collect();
    Ok(rows)
}

/// Resolve GeoNames ids to coordinates at `rate_per_sec` requests/second
/// (GeoNames' free tier is 1 req/s), skipping (0, 0) "null island" responses.
pub async fn run(
    conn: &mut Connection,
    client: &reqwest::Client,
    geonames_url: &str,
    username: &str,
    rate_per_sec: u32,
    dry_run: bool,
) -> Result<GazetteerStats> {
    let places = ungeocoded_geonames(conn)?;
    let mut by_id: HashMap<String, Vec<String>> = HashMap::new();
    for (vocab_id, external_id) in &places {
        if let Some(gn_id) = extract_geonames_id(external_id) {
            if gn_id.chars().all(|c| c.is_ascii_digit()) {
                by_id.entry(gn_id.to_string()).or_default().push(vocab_id.clone());
            }
        }
    }
    info!(geonames_ids = by_id.len(), "phase 1a: GeoNames ids to geocode");
    if by_id.is_empty() || dry_run {
        return Ok(GazetteerStats {
            ids_attempted: by_id.len(),
            ..Default::default()
        });
    }

    let limiter: Arc<GazetteerLimiter> = Arc::new(RateLimiter::direct(Quota::per_second(
        NonZeroU32::new(rate_per_sec.max(1)).unwrap(),
    )));

    let mut results: HashMap<String, (f64, f64)> = HashMap::new();
    let mut errors = 0usize;

    for (gn_id, vocab_ids) in &by_id {
        limiter.until_ready().await;
        let url = format!("{geonames_url}?geonameId={gn_id}&username={username}");
        match client.get(&url).send().await.and_then(|r| r.error_for_status()) {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(data) => {
                    let lat = data.get("lat").and_then(|v| v.as_str()).and_then(|s| s.parse::<f64>().ok());
                    let lon = data.get("lng").and_then(|v| v.as_str()).and_then(|s| s.parse::<f64>().ok());
                    match (lat, lon) {
                        (Some(lat), Some(lon)) if lat != 0.0 || lon != 0.0 => {
                            for vid in vocab_ids {
                                results.insert(vid.clone(), (lat, lon));
                            }
                        }
                        (Some(_), Some(_)) => {
                            warn!(gn_id, "geonames returned null island, skipping");
                        }
                        _ => {
                            errors += 1;
                            warn!(gn_id, "geonames response missing lat/lng");
                        }
                    }
                }
                Err(e) => {
                    errors += 1;
                    warn!(gn_id, error = %e, "geonames response not json");
                }
            },
            Err(e) => {
                errors += 1;
                warn!(gn_id, error = %e, "geonames request failed");
            }
        }
    }

    let tx = conn.transaction()?;
    let mut updated = 0usize;
    {
        let mut stmt = tx.prepare(
            "UPDATE vocabulary SET lat = ?1, lon = ?2 WHERE id = ?3 AND lat IS NULL",
        )?;
        for (vocab_id, (lat, lon)) in &results {
            updated += stmt.execute((lat, lon, vocab_id))?;
        }
    }
    tx.commit()?;

    info!(updated, errors, "phase 1a complete");
    Ok(GazetteerStats {
        ids_attempted: by_id.len(),
        updated,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rijks_core::store;

    fn seeded() -> Connection {
        let conn = store::open_in_memory().unwrap();
        store::init_ingest_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO vocabulary (id, vocab_type, external_id) VALUES
             ('p1', 'place', 'http://sws.geonames.org/2759794/'),
             ('p2', 'place', 'https://www.wikidata.org/wiki/Q727')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn filters_to_geonames_places_only() {
        let conn = seeded();
        let places = ungeocoded_geonames(&conn).unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].0, "p1");
    }

    #[tokio::test]
    async fn dry_run_makes_no_requests() {
        let mut conn = seeded();
        let client = reqwest::Client::new();
        let stats = run(&mut conn, &client, "http://127.0.0.1:0", "demo", 5, true)
            .await
            .unwrap();
        assert_eq!(stats.ids_attempted, 1);
        assert_eq!(stats.updated, 0);
    }
}
