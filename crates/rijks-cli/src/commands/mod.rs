//! CLI command implementations

pub mod embed;
pub mod geocode;
pub mod harvest;
pub mod normalize;

use std::time::Duration;

use anyhow::{Context, Result};
use rijks_config::{ConfigLoader, HarvestConfig};
use rusqlite::Connection;

use crate::GlobalOptions;

/// Load configuration, applying global CLI overrides (and a directly
/// specified `--config` file's directory as the local config root).
pub fn load_config(global: &GlobalOptions) -> Result<HarvestConfig> {
    let mut loader = ConfigLoader::new();
    let overrides = global.to_config_overrides();

    if let Some(ref config_path) = global.config {
        let parent = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        let mut config = loader
            .load_local(parent)
            .context("failed to load config file")?
            .unwrap_or_default();
        config.apply_overrides(&overrides);
        config.validate().context("invalid configuration")?;
        return Ok(config);
    }

    let workspace = std::env::current_dir().context("failed to get current directory")?;
    loader
        .load(&workspace, Some(&overrides))
        .context("failed to load configuration")
}

/// Build the shared `reqwest::Client` used by every network-touching phase.
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("rijks-harvest/0.1")
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")
}

/// Open the store at the configured path and ensure the ingest schema exists.
pub fn open_store(config: &HarvestConfig) -> Result<Connection> {
    let conn = rijks_core::store::open(&config.store.db_path, config.store.cache_size_kb)
        .context("failed to open store")?;
    rijks_core::store::init_ingest_schema(&conn).context("failed to initialize schema")?;
    Ok(conn)
}
