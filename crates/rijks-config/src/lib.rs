//! rijks-harvest configuration management.
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.rijks-harvest/config.toml`
//! - Local config: `.rijks-harvest/config.toml` (in the working directory)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global -> local -> CLI overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for rijks-harvest.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HarvestConfig {
    /// SQLite store configuration
    pub store: StoreConfig,

    /// Bounded-concurrency dispatcher configuration
    pub dispatcher: DispatcherConfig,

    /// Rijksmuseum OAI-PMH / Linked Art interfaces
    pub rijksmuseum: RijksmuseumConfig,

    /// Geocoder external services
    pub geocoder: GeocoderConfig,

    /// Local embedding provider
    pub embedding: EmbeddingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// SQLite store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,

    /// `PRAGMA cache_size` in KiB (negative per SQLite convention)
    pub cache_size_kb: i64,

    /// Whether WAL journaling is enabled
    pub wal: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/vocabulary.db"),
            cache_size_kb: -64000,
            wal: true,
        }
    }
}

/// Bounded-concurrency dispatcher configuration (spec.md §4.8/§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of concurrent resolve workers (default matches the original
    /// `RESOLVE_THREADS = 8`)
    pub threads: usize,

    /// Number of records buffered before a batch flush to the writer
    pub batch_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            batch_size: 500,
        }
    }
}

/// Rijksmuseum OAI-PMH harvesting and Linked Art resolution endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RijksmuseumConfig {
    /// OAI-PMH base URL (ListRecords/ListSets/GetRecord)
    pub oai_pmh_url: String,

    /// Linked Art JSON-LD base URL for vocabulary terms and artworks
    pub linked_art_url: String,

    /// N-Triples bulk dump URL (P0)
    pub ntriples_dump_url: String,
}

impl Default for RijksmuseumConfig {
    fn default() -> Self {
        Self {
            oai_pmh_url: "https://data.rijksmuseum.nl/oai-pmh/".to_string(),
            linked_art_url: "https://data.rijksmuseum.nl/object-metadata/linkeddata/".to_string(),
            ntriples_dump_url: "https://data.rijksmuseum.nl/10.5281/zenodo.6984217/dump.nt.gz"
                .to_string(),
        }
    }
}

/// Geocoder external services (spec.md §4.5, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    /// GeoNames account username. Falls back to the `GEONAMES_USERNAME`
    /// environment variable (loaded via `.env` at CLI startup) when unset here.
    pub geonames_username: Option<String>,

    /// GeoNames search endpoint
    pub geonames_url: String,

    /// Wikidata SPARQL query endpoint (phase 1b alt-properties)
    pub wikidata_sparql_url: String,

    /// Wikidata `wbsearchentities` reconciliation endpoint (phase 3)
    pub wikidata_reconcile_url: String,

    /// Getty TGN cross-reference endpoint (phase 1c)
    pub getty_tgn_url: String,

    /// Approximate requests/second ceiling for the GeoNames throttle
    pub geonames_rate_per_sec: u32,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            geonames_username: None,
            geonames_url: "http://api.geonames.org/searchJSON".to_string(),
            wikidata_sparql_url: "https://query.wikidata.org/sparql".to_string(),
            wikidata_reconcile_url: "https://www.wikidata.org/w/api.php".to_string(),
            getty_tgn_url: "https://vocab.getty.edu/sparql.json".to_string(),
            geonames_rate_per_sec: 1,
        }
    }
}

impl GeocoderConfig {
    /// Resolve the effective GeoNames username: explicit config value, else
    /// the `GEONAMES_USERNAME` environment variable.
    pub fn effective_geonames_username(&self) -> Option<String> {
        self.geonames_username
            .clone()
            .or_else(|| std::env::var("GEONAMES_USERNAME").ok())
    }
}

/// Local embedding provider configuration (spec.md §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// HuggingFace Hub model identifier
    pub model_id: String,

    /// Embedding dimension produced by `model_id`
    pub dimension: usize,

    /// Batch size for encoding passes
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: "intfloat/multilingual-e5-small".to_string(),
            dimension: 384,
            batch_size: 32,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// CLI overrides applied over file-based configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override the SQLite database path
    pub db_path: Option<PathBuf>,

    /// Override the dispatcher thread count
    pub threads: Option<usize>,

    /// Override the GeoNames username
    pub geonames_username: Option<String>,

    /// Override the log level
    pub log_level: Option<String>,
}

impl HarvestConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref path) = overrides.db_path {
            self.store.db_path = path.clone();
        }
        if let Some(threads) = overrides.threads {
            self.dispatcher.threads = threads;
        }
        if let Some(ref username) = overrides.geonames_username {
            self.geocoder.geonames_username = Some(username.clone());
        }
        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatcher.threads == 0 {
            return Err(ConfigError::invalid_value(
                "dispatcher.threads",
                "must be at least 1",
            ));
        }
        if self.dispatcher.batch_size == 0 {
            return Err(ConfigError::invalid_value(
                "dispatcher.batch_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HarvestConfig::default();
        assert_eq!(config.dispatcher.threads, 8);
        assert_eq!(config.dispatcher.batch_size, 500);
        assert_eq!(config.store.cache_size_kb, -64000);
        assert_eq!(config.embedding.dimension, 384);
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = HarvestConfig::default();
        let overrides = ConfigOverrides {
            threads: Some(4),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        config.apply_overrides(&overrides);
        assert_eq!(config.dispatcher.threads, 4);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let mut config = HarvestConfig::default();
        config.dispatcher.threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_geonames_username_falls_back_to_env() {
        let config = GeocoderConfig {
            geonames_username: None,
            ..Default::default()
        };
        // SAFETY: single-threaded test
        unsafe {
            std::env::set_var("GEONAMES_USERNAME", "test_user");
        }
        assert_eq!(
            config.effective_geonames_username(),
            Some("test_user".to_string())
        );
        unsafe {
            std::env::remove_var("GEONAMES_USERNAME");
        }
    }
}
