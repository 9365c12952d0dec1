//! Geocoding import CSV (spec.md §6): `id, place_name, label_en, label_nl,
//! external_id, lat, lon, artwork_count`, the hand-edited companion to the
//! reconciliation review CSVs. Updates lat/lon for existing place rows only;
//! `external_id` is overwritten only when the CSV supplies a non-empty value
//! that differs from what's stored.

use std::path::Path;

use rusqlite::Connection;
use serde::Deserialize;
use tracing::info;

use crate::error::Result;

#[derive(Debug, Deserialize)]
struct GeoCsvRow {
    id: String,
    #[allow(dead_code)]
    place_name: Option<String>,
    #[allow(dead_code)]
    label_en: Option<String>,
    #[allow(dead_code)]
    label_nl: Option<String>,
    external_id: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    #[allow(dead_code)]
    artwork_count: Option<i64>,
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub rows_read: usize,
    pub coords_updated: usize,
    pub external_ids_updated: usize,
    pub unknown_ids: usize,
}

/// Import a geocoding CSV into `vocabulary`. Rows whose `id` doesn't match an
/// existing place row are counted as `unknown_ids` and otherwise ignored.
pub fn import_geo_csv(conn: &mut Connection, csv_path: &Path) -> Result<ImportStats> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut stats = ImportStats::default();

    let tx = conn.transaction()?;
    {
        let mut select_existing =
            tx.prepare("SELECT lat, lon, external_id FROM vocabulary WHERE id = ?1 AND vocab_type = 'place'")?;
        let mut update_coords = tx.prepare("UPDATE vocabulary SET lat = ?1, lon = ?2 WHERE id = ?3")?;
        let mut update_external_id = tx.prepare("UPDATE vocabulary SET external_id = ?1 WHERE id = ?2")?;

        for row in reader.deserialize::<GeoCsvRow>() {
            let row = row?;
            stats.rows_read += 1;

            let existing: Option<(Option<f64>, Option<f64>, Option<String>)> = select_existing
                .query_row((&row.id,), |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
                .ok();
            let Some((_current_lat, _current_lon, current_external_id)) = existing else {
                stats.unknown_ids += 1;
                continue;
            };

            if let (Some(lat), Some(lon)) = (row.lat, row.lon) {
                update_coords.execute((lat, lon, &row.id))?;
                stats.coords_updated += 1;
            }

            if let Some(new_id) = row.external_id.filter(|s| !s.is_empty()) {
                if current_external_id.as_deref() != Some(new_id.as_str()) {
                    update_external_id.execute((&new_id, &row.id))?;
                    stats.external_ids_updated += 1;
                }
            }
        }
    }
    tx.commit()?;

    info!(
        rows_read = stats.rows_read,
        coords_updated = stats.coords_updated,
        external_ids_updated = stats.external_ids_updated,
        unknown_ids = stats.unknown_ids,
        "geocoding CSV import complete"
    );
    Ok(stats)
}
