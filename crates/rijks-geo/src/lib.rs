//! Multi-phase geocoding: gazetteer lookup, SPARQL alt-property lookup, Getty
//! TGN cross-reference, self-reference SQL, entity reconciliation, and
//! validation (spec.md §4.5).

pub mod csv_import;
pub mod error;
pub mod gazetteer;
pub mod ids;
pub mod reconcile;
pub mod self_ref;
pub mod sparql;
pub mod validate;
pub mod wikidata_xref;

pub use error::{GeoError, Result};

pub(crate) const USER_AGENT: &str = "rijks-harvest-geocoder/0.1";

/// Coverage of the `place` vocabulary: `(total, with_coords)`.
pub fn coverage(conn: &rusqlite::Connection) -> Result<(i64, i64)> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM vocabulary WHERE vocab_type = 'place'", [], |r| r.get(0))?;
    let with_coords: i64 = conn.query_row(
        "SELECT COUNT(*) FROM vocabulary WHERE vocab_type = 'place' AND lat IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    Ok((total, with_coords))
}
