//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.rijks-harvest/config.toml`
//! 2. Local config: `.rijks-harvest/config.toml` (in the working directory)
//! 3. CLI overrides
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{ConfigOverrides, HarvestConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".rijks-harvest";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".rijks-harvest";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.rijks-harvest`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<HarvestConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.rijks-harvest`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a working directory.
    pub fn local_config_path(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a working directory with optional CLI overrides.
    ///
    /// Merges config in order: global -> local -> overrides.
    pub fn load(
        &mut self,
        working_dir: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<HarvestConfig, ConfigError> {
        let mut config = HarvestConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(working_dir)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<HarvestConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;
        self.global_config = Some(config.clone());
        Ok(Some(config))
    }

    /// Load only the local configuration for a working directory.
    pub fn load_local(&self, working_dir: &Path) -> Result<Option<HarvestConfig>, ConfigError> {
        let local_path = self.local_config_path(working_dir);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &HarvestConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        let global_path = global_dir.join(CONFIG_FILE_NAME);
        save_config_file(&global_path, config)
    }

    /// Save configuration to the local config file for a working directory.
    pub fn save_local(
        &self,
        working_dir: &Path,
        config: &HarvestConfig,
    ) -> Result<(), ConfigError> {
        let local_path = self.local_config_path(working_dir);
        save_config_file(&local_path, config)
    }

    /// Initialize local configuration for a working directory.
    ///
    /// Creates `.rijks-harvest/config.toml` with default configuration.
    pub fn init_local(&self, working_dir: &Path) -> Result<PathBuf, ConfigError> {
        let local_dir = working_dir.join(LOCAL_CONFIG_DIR);

        if !local_dir.exists() {
            std::fs::create_dir_all(&local_dir)
                .map_err(|e| ConfigError::create_dir(&local_dir, e))?;
        }

        let config_path = local_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            let default_config = HarvestConfig::default();
            save_config_file(&config_path, &default_config)?;
        }

        Ok(config_path)
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<HarvestConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &HarvestConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// Performs a field-by-field merge, allowing partial configs.
fn merge_configs(base: HarvestConfig, overlay: HarvestConfig) -> HarvestConfig {
    HarvestConfig {
        store: merge_store(base.store, overlay.store),
        dispatcher: merge_dispatcher(base.dispatcher, overlay.dispatcher),
        rijksmuseum: overlay.rijksmuseum,
        geocoder: merge_geocoder(base.geocoder, overlay.geocoder),
        embedding: merge_embedding(base.embedding, overlay.embedding),
        logging: merge_logging(base.logging, overlay.logging),
    }
}

fn merge_store(base: crate::StoreConfig, overlay: crate::StoreConfig) -> crate::StoreConfig {
    let default = crate::StoreConfig::default();
    crate::StoreConfig {
        db_path: if overlay.db_path != default.db_path {
            overlay.db_path
        } else {
            base.db_path
        },
        cache_size_kb: if overlay.cache_size_kb != default.cache_size_kb {
            overlay.cache_size_kb
        } else {
            base.cache_size_kb
        },
        wal: overlay.wal,
    }
}

fn merge_dispatcher(
    base: crate::DispatcherConfig,
    overlay: crate::DispatcherConfig,
) -> crate::DispatcherConfig {
    let default = crate::DispatcherConfig::default();
    crate::DispatcherConfig {
        threads: if overlay.threads != default.threads {
            overlay.threads
        } else {
            base.threads
        },
        batch_size: if overlay.batch_size != default.batch_size {
            overlay.batch_size
        } else {
            base.batch_size
        },
    }
}

fn merge_geocoder(
    base: crate::GeocoderConfig,
    overlay: crate::GeocoderConfig,
) -> crate::GeocoderConfig {
    crate::GeocoderConfig {
        geonames_username: overlay.geonames_username.or(base.geonames_username),
        geonames_url: overlay.geonames_url,
        wikidata_sparql_url: overlay.wikidata_sparql_url,
        wikidata_reconcile_url: overlay.wikidata_reconcile_url,
        getty_tgn_url: overlay.getty_tgn_url,
        geonames_rate_per_sec: overlay.geonames_rate_per_sec,
    }
}

fn merge_embedding(
    base: crate::EmbeddingConfig,
    overlay: crate::EmbeddingConfig,
) -> crate::EmbeddingConfig {
    let default = crate::EmbeddingConfig::default();
    crate::EmbeddingConfig {
        model_id: if overlay.model_id != default.model_id {
            overlay.model_id
        } else {
            base.model_id
        },
        dimension: if overlay.dimension != default.dimension {
            overlay.dimension
        } else {
            base.dimension
        },
        batch_size: if overlay.batch_size != default.batch_size {
            overlay.batch_size
        } else {
            base.batch_size
        },
    }
}

fn merge_logging(base: crate::LoggingConfig, overlay: crate::LoggingConfig) -> crate::LoggingConfig {
    crate::LoggingConfig {
        level: if overlay.level != "info" {
            overlay.level
        } else {
            base.level
        },
    }
}
