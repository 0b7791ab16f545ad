//! Configuration management for the album catalog
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (catalog.toml)
//! - Environment variables (CATALOG__*)
//!
//! ## Example config file (catalog.toml):
//! ```toml
//! [contracts]
//! source = "./contracts"
//!
//! [store]
//! seed = "./albums.json"
//! seed_builtin = false
//! validate_responses = true
//!
//! [logging]
//! filter = "album_catalog=debug"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::error::Result;
use crate::record::{builtin_seed, read_seed_file};
use crate::registry::ContractSource;
use crate::store::StoreOptions;

/// Main configuration for the catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Contract settings
    #[serde(default)]
    pub contracts: ContractsConfig,

    /// Store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where contracts are loaded from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// Contract file or directory; the built-in contracts when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file holding an array of album payloads to start with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<PathBuf>,

    /// Start with the built-in albums when no seed file is set
    #[serde(default = "default_true")]
    pub seed_builtin: bool,

    /// Check returned albums against response contracts
    #[serde(default)]
    pub validate_responses: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when RUST_LOG is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            seed: None,
            seed_builtin: true,
            validate_responses: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl CatalogConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["catalog.toml", ".catalog.toml", "config/catalog.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        let project_dirs = directories::ProjectDirs::from("dev", "familiar", "album-catalog");
        if let Some(config_dir) = project_dirs {
            let xdg_config = config_dir.config_dir().join("catalog.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // CATALOG__STORE__VALIDATE_RESPONSES=true and friends
        builder = builder.add_source(
            Environment::with_prefix("CATALOG")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Contract source to hand to the registry
    pub fn contract_source(&self) -> ContractSource {
        match &self.contracts.source {
            Some(path) => ContractSource::path(path.clone()),
            None => ContractSource::Builtin,
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            validate_responses: self.store.validate_responses,
        }
    }

    /// Album payloads the store starts with
    pub fn seed_payloads(&self) -> Result<Vec<Value>> {
        match &self.store.seed {
            Some(path) => read_seed_file(path),
            None if self.store.seed_builtin => Ok(builtin_seed()),
            None => Ok(Vec::new()),
        }
    }
}
