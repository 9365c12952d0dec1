//! Normalize command: rewrite the ingest-shape store into the narrow
//! surrogate-id shape, rebuild FTS and derived structures, and optionally
//! import a geocoding review CSV.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use rijks_core::normalize;
use rijks_geo::csv_import;

use super::{load_config, open_store};
use crate::progress::{finish_spinner, spinner};
use crate::GlobalOptions;

/// Arguments for the normalize command
#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Import a geocoding CSV (hand-edited `id, place_name, ..., lat, lon,
    /// ...` rows) before rewriting the mapping shape
    #[arg(long)]
    geo_csv: Option<PathBuf>,
}

pub async fn execute(args: NormalizeArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global)?;
    let mut conn = open_store(&config)?;

    if let Some(ref csv_path) = args.geo_csv {
        let pb = spinner("Importing geocoding CSV...", global.quiet);
        let stats =
            csv_import::import_geo_csv(&mut conn, csv_path).context("geocoding CSV import failed")?;
        finish_spinner(
            pb,
            &format!(
                "Imported {} rows: {} coords updated, {} external ids updated, {} unknown ids",
                stats.rows_read, stats.coords_updated, stats.external_ids_updated, stats.unknown_ids
            ),
        );
    }

    let pb = spinner("Normalizing store...", global.quiet);
    let stats = normalize::normalize(&mut conn).context("normalization failed")?;
    if stats.already_normalized {
        finish_spinner(pb, "Store already normalized, nothing to do");
    } else {
        finish_spinner(
            pb,
            &format!(
                "Normalized {} vocabulary terms, {} artworks, {} mapping rows ({} orphaned, dropped)",
                stats.vocab_surrogates_assigned,
                stats.artwork_surrogates_assigned,
                stats.mapping_rows,
                stats.orphaned_mappings
            ),
        );
    }

    Ok(())
}
