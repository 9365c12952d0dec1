//! Geocode command: resolve coordinates for the `place` vocabulary across
//! the gazetteer, Wikidata cross-reference, self-reference, reconciliation,
//! and validation sub-phases.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use rijks_geo::{gazetteer, reconcile, self_ref, validate, wikidata_xref};

use super::{build_client, load_config, open_store};
use crate::progress::{finish_spinner, finish_spinner_warn, spinner};
use crate::GlobalOptions;

/// Arguments for the geocode command
#[derive(Args, Debug)]
pub struct GeocodeArgs {
    /// Run only this sub-phase (1a, 1b, 1c, 2, 3, 4). Omit to run all in order.
    #[arg(long)]
    phase: Option<String>,

    /// Report candidates without writing any coordinates
    #[arg(long)]
    dry_run: bool,

    /// Apply a human-reviewed reconciliation CSV (phase 3 review output,
    /// with an added `accept` column) instead of running phase 3's search
    #[arg(long)]
    apply_reviewed: Option<PathBuf>,

    /// Directory for phase 3's candidate CSVs and phase 4's validation report
    #[arg(long, default_value = "data/geocode")]
    output_dir: PathBuf,

    /// Concurrent Wikidata search requests for phase 3
    #[arg(long, default_value_t = 4)]
    search_concurrency: usize,
}

fn wants(phase: &Option<String>, name: &str) -> bool {
    phase.as_deref().is_none_or(|p| p == name)
}

pub async fn execute(args: GeocodeArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global)?;
    let mut conn = open_store(&config)?;

    if let Some(ref csv_path) = args.apply_reviewed {
        let pb = spinner("Applying reviewed reconciliation CSV...", global.quiet);
        let applied =
            reconcile::apply_reviewed(&mut conn, csv_path, args.dry_run).context("apply-reviewed failed")?;
        finish_spinner(pb, &format!("Applied {applied} reviewed rows"));
        return Ok(());
    }

    let client = build_client()?;

    if wants(&args.phase, "1a") {
        let Some(username) = config.geocoder.effective_geonames_username() else {
            bail!("GeoNames username not configured (set geocoder.geonames_username or GEONAMES_USERNAME)");
        };
        let pb = spinner("Phase 1a: GeoNames gazetteer lookup...", global.quiet);
        let stats = gazetteer::run(
            &mut conn,
            &client,
            &config.geocoder.geonames_url,
            &username,
            config.geocoder.geonames_rate_per_sec,
            args.dry_run,
        )
        .await
        .context("phase 1a failed")?;
        finish_spinner(
            pb,
            &format!(
                "Phase 1a: {} GeoNames ids, {} updated",
                stats.ids_attempted, stats.updated
            ),
        );
    }

    if wants(&args.phase, "1b") {
        let pb = spinner("Phase 1b: Wikidata alt-property lookup...", global.quiet);
        let stats = wikidata_xref::phase_1b_wikidata_alt(
            &mut conn,
            &client,
            &config.geocoder.wikidata_sparql_url,
            args.dry_run,
        )
        .await
        .context("phase 1b failed")?;
        finish_spinner(
            pb,
            &format!(
                "Phase 1b: {} candidates, {} updated",
                stats.candidates, stats.updated
            ),
        );
    }

    if wants(&args.phase, "1c") {
        let pb = spinner("Phase 1c: Getty TGN cross-reference...", global.quiet);
        let stats = wikidata_xref::phase_1c_getty_crossref(
            &mut conn,
            &client,
            &config.geocoder.wikidata_sparql_url,
            args.dry_run,
        )
        .await
        .context("phase 1c failed")?;
        finish_spinner(
            pb,
            &format!(
                "Phase 1c: {} candidates, {} updated",
                stats.candidates, stats.updated
            ),
        );
    }

    if wants(&args.phase, "2") {
        let pb = spinner("Phase 2: self-reference resolution...", global.quiet);
        let stats = self_ref::run(&mut conn, args.dry_run).context("phase 2 failed")?;
        finish_spinner(pb, &format!("Phase 2: {} updated via self-reference", stats.updated));
    }

    if wants(&args.phase, "3") {
        let pb = spinner("Phase 3: Wikidata entity reconciliation...", global.quiet);
        let stats = reconcile::run(
            &mut conn,
            &client,
            &config.geocoder.wikidata_reconcile_url,
            &args.output_dir,
            args.search_concurrency,
            args.dry_run,
        )
        .await
        .context("phase 3 failed")?;
        finish_spinner(
            pb,
            &format!(
                "Phase 3: {} searched, {} accepted, {} need review, {} rejected",
                stats.candidates_searched, stats.accepted, stats.review, stats.rejected
            ),
        );
    }

    if wants(&args.phase, "4") {
        let pb = spinner("Phase 4: validating geocoded places...", global.quiet);
        let issues = validate::run(&conn).context("phase 4 failed")?;
        validate::write_report(&conn, &issues, &args.output_dir).context("failed to write validation report")?;
        if issues.is_empty() {
            finish_spinner(pb, "Phase 4: no issues found");
        } else {
            finish_spinner_warn(pb, &format!("Phase 4: {} issues found, see report", issues.len()));
        }
    }

    let (total, with_coords) = rijks_geo::coverage(&conn)?;
    tracing::info!(
        total,
        with_coords,
        coverage_pct = if total > 0 { with_coords as f64 / total as f64 * 100.0 } else { 0.0 },
        "geocoding coverage"
    );

    Ok(())
}
