//! Phase 2: self-reference resolution, grounded on
//! `geocode_places.py::phase_2_self_refs`. Pure SQL — no network calls: a
//! place whose `external_id` points at another Rijksmuseum vocabulary row
//! inherits that row's coordinates once the target is geocoded.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

#[derive(Debug, Default)]
pub struct SelfRefStats {
    pub updated: usize,
}

pub fn run(conn: &mut Connection, dry_run: bool) -> Result<SelfRefStats> {
    let rows: Vec<(String, f64, f64)> = {
        let mut stmt = conn.prepare(
            "SELECT src.id, tgt.lat, tgt.lon
             FROM vocabulary src
             JOIN vocabulary tgt ON tgt.id = REPLACE(
                 REPLACE(src.external_id, 'https://id.rijksmuseum.nl/', ''),
                 'http://id.rijksmuseum.nl/', ''
             )
             WHERE src.vocab_type = 'place'
               AND src.lat IS NULL
               AND src.external_id LIKE '%id.rijksmuseum.nl%'
               AND tgt.lat IS NOT NULL",
        )?;
        let collected: Vec<(String, f64, f64)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .filter_map(std::result::Result::ok)
            .collect();
        collected
    };
    info!(candidates = rows.len(), "phase 2: self-refs with geocoded targets");

    if dry_run || rows.is_empty() {
        return Ok(SelfRefStats::default());
    }

    let tx = conn.transaction()?;
    let mut updated = 0usize;
    {
        let mut stmt = tx.prepare("UPDATE vocabulary SET lat = ?1, lon = ?2 WHERE id = ?3 AND lat IS NULL")?;
        for (id, lat, lon) in &rows {
            updated += stmt.execute((lat, lon, id))?;
        }
    }
    tx.commit()?;
    info!(updated, "phase 2 complete");
    Ok(SelfRefStats { updated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rijks_core::store;

    #[test]
    fn copies_coords_from_geocoded_target() {
        let mut conn = store::open_in_memory().unwrap();
        store::init_ingest_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO vocabulary (id, vocab_type, lat, lon) VALUES ('42', 'place', 52.37, 4.89)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO vocabulary (id, vocab_type, external_id) VALUES ('p1', 'place', 'https://id.rijksmuseum.nl/42')",
            [],
        )
        .unwrap();

        let stats = run(&mut conn, false).unwrap();
        assert_eq!(stats.updated, 1);
        let (lat, lon): (f64, f64) = conn
            .query_row("SELECT lat, lon FROM vocabulary WHERE id = 'p1'", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!((lat, lon), (52.37, 4.89));
    }
}
