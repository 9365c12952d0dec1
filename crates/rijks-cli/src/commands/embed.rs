//! Embed command: encode artwork composite texts through the local Candle
//! provider, quantize, and write to the embeddings and `vec0` KNN tables.

use anyhow::{Context, Result};
use clap::Args;
use rijks_embed::{create_provider, embed_and_write, validate_embeddings};
use tracing::info;

use super::{load_config, open_store};
use crate::progress::{finish_spinner, spinner};
use crate::GlobalOptions;

/// Queries exercised against the KNN fast path after a write, confirming it
/// agrees with brute-force cosine distance over the full table.
const VALIDATION_QUERIES: &[&str] = &[
    "a portrait of a woman",
    "ships at sea",
    "still life with flowers",
    "a landscape painting",
    "self portrait",
];

/// Arguments for the embed command
#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// Re-embed every artwork, ignoring existing vectors
    #[arg(long)]
    force: bool,

    /// Skip the post-write KNN-vs-brute-force validation pass
    #[arg(long)]
    skip_validate: bool,
}

pub async fn execute(args: EmbedArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global)?;
    let mut conn = open_store(&config)?;

    let pb = spinner("Loading embedding model...", global.quiet);
    let provider = create_provider(&config.embedding).context("failed to load embedding model")?;
    finish_spinner(pb, "Embedding model loaded");

    let pb = spinner("Encoding and writing artwork embeddings...", global.quiet);
    let stats = embed_and_write(&mut conn, provider.as_ref(), config.embedding.batch_size, !args.force)
        .await
        .context("embedding write failed")?;
    finish_spinner(
        pb,
        &format!(
            "Encoded {}/{} artworks ({} already embedded, {} empty text skipped, {} dangling re-embedded)",
            stats.encoded, stats.total_candidates, stats.skipped_existing, stats.skipped_empty, stats.dangling_reembedded
        ),
    );

    if !args.skip_validate {
        let pb = spinner("Validating KNN against brute force...", global.quiet);
        let queries: Vec<String> = VALIDATION_QUERIES.iter().map(|s| s.to_string()).collect();
        let mismatches = validate_embeddings(&conn, provider.as_ref(), &queries)
            .await
            .context("validation failed")?;
        if mismatches.is_empty() {
            finish_spinner(pb, "Validation passed: KNN agrees with brute force on every query");
        } else {
            finish_spinner(pb, &format!("Validation found {} mismatches", mismatches.len()));
            for m in &mismatches {
                info!(query = %m.query, knn = %m.knn_top1, brute_force = %m.brute_force_top1, "KNN/brute-force mismatch");
            }
        }
    }

    Ok(())
}
