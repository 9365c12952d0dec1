//! Harvest command: bulk N-Triples seed, OAI-PMH sets and records, vocabulary
//! and person-name resolution, Tier-2 artwork enrichment.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use rijks_core::checkpoint::CheckpointStore;
use rijks_core::{ntriples, oai, person_names, store, tier2_phase, vocab_phase};
use tracing::info;

use super::{build_client, load_config, open_store};
use crate::progress::{finish_spinner, spinner};
use crate::GlobalOptions;

/// Arguments for the harvest command
#[derive(Args, Debug)]
pub struct HarvestArgs {
    /// Run only this phase (0, 0.5, 1, 2, 2.5, 3, 4). Omit to run all phases in order.
    #[arg(long)]
    phase: Option<String>,

    /// Resume an interrupted harvest (OAI-PMH resumes from checkpoint,
    /// person-name harvest skips already-harvested persons)
    #[arg(long)]
    resume: bool,

    /// Skip Phase 0 (bulk N-Triples dump parse)
    #[arg(long)]
    skip_dump: bool,

    /// Directory containing the extracted N-Triples dump (Phase 0)
    #[arg(long, default_value = "data/dump")]
    dump_dir: PathBuf,
}

fn wants(phase: &Option<String>, name: &str) -> bool {
    phase.as_deref().is_none_or(|p| p == name)
}

pub async fn execute(args: HarvestArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global)?;
    let conn = open_store(&config)?;
    let client = build_client()?;
    let checkpoint = CheckpointStore::new(config.store.db_path.with_extension("checkpoint.json"));
    let threads = config.dispatcher.threads;

    if !args.skip_dump && wants(&args.phase, "0") {
        let pb = spinner("Phase 0: parsing bulk N-Triples dump...", global.quiet);
        let mut count = 0usize;
        for term in ntriples::parse_dump_dir(&args.dump_dir, "concept") {
            store::insert_vocabulary_term(&conn, &term)?;
            count += 1;
        }
        for term in ntriples::external_vocab_seed() {
            store::insert_vocabulary_term(&conn, &term)?;
            count += 1;
        }
        finish_spinner(pb, &format!("Phase 0: seeded {count} vocabulary terms"));
    }

    if wants(&args.phase, "0.5") {
        let pb = spinner("Phase 0.5: harvesting OAI-PMH sets...", global.quiet);
        let stats = oai::harvest_sets(&conn, &client, &config.rijksmuseum.oai_pmh_url)
            .await
            .context("Phase 0.5 failed")?;
        finish_spinner(pb, &format!("Phase 0.5: seeded {} sets", stats.sets));
    }

    if wants(&args.phase, "1") {
        let pb = spinner("Phase 1: harvesting OAI-PMH records...", global.quiet);
        let stats = oai::harvest(
            &conn,
            &client,
            &config.rijksmuseum.oai_pmh_url,
            &checkpoint,
            args.resume,
        )
        .await
        .context("Phase 1 failed")?;
        finish_spinner(
            pb,
            &format!(
                "Phase 1: {} pages, {} artworks, {} mappings",
                stats.pages, stats.artworks, stats.mappings
            ),
        );
    }

    if wants(&args.phase, "2") {
        let pb = spinner("Phase 2: resolving vocabulary terms...", global.quiet);
        let stats = vocab_phase::resolve_missing(
            &conn,
            &client,
            &config.rijksmuseum.linked_art_url,
            threads,
        )
        .await
        .context("Phase 2 failed")?;
        finish_spinner(
            pb,
            &format!(
                "Phase 2: {}/{} vocabulary terms resolved ({} failed)",
                stats.resolved, stats.attempted, stats.failed
            ),
        );

        let pb = spinner("Phase 2: harvesting person name variants...", global.quiet);
        let stats = person_names::harvest(
            &conn,
            &client,
            &config.rijksmuseum.linked_art_url,
            threads,
            args.resume,
        )
        .await
        .context("person name harvest failed")?;
        finish_spinner(
            pb,
            &format!(
                "Phase 2: {} persons fetched, {} names written ({} failed)",
                stats.fetched, stats.names_written, stats.failed
            ),
        );
    }

    if wants(&args.phase, "4") {
        let pb = spinner("Phase 4: resolving Tier-2 artwork enrichment...", global.quiet);
        let stats = tier2_phase::resolve_pending(&conn, &client, threads)
            .await
            .context("Phase 4 failed")?;
        finish_spinner(
            pb,
            &format!(
                "Phase 4: {}/{} artworks enriched, {} not found ({} failed)",
                stats.completed, stats.attempted, stats.not_found, stats.failed
            ),
        );
        if stats.unknown_unit_count > 0 {
            info!(
                unknown_units = stats.unknown_unit_count,
                "Tier-2 enrichment hit dimension units outside the known unit table"
            );
        }
    }

    if wants(&args.phase, "2.5") {
        let pb = spinner(
            "Phase 2-bis: resolving production role / attribution vocabulary...",
            global.quiet,
        );
        let stats = vocab_phase::resolve_missing(
            &conn,
            &client,
            &config.rijksmuseum.linked_art_url,
            threads,
        )
        .await
        .context("Phase 2-bis failed")?;
        finish_spinner(
            pb,
            &format!(
                "Phase 2-bis: {}/{} vocabulary terms resolved ({} failed)",
                stats.resolved, stats.attempted, stats.failed
            ),
        );
    }

    Ok(())
}
