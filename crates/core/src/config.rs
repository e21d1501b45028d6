//! Application configuration.
//!
//! Values are layered: built-in defaults, then the optional TOML file under
//! the user's config directory, then `TARKOV_LIST_*` environment variables
//! (use `__` between nested keys, e.g. `TARKOV_LIST_PRICING__BASE_CURRENCY`).

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{models::Currency, pricing::ExchangeRates};

/// Directory name used under the platform config/data roots.
pub const APP_DIR: &str = "tarkov-list";
/// File name of the TOML configuration.
pub const CONFIG_FILE: &str = "config.toml";
/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "TARKOV_LIST";

// One year; keeps the chrono duration well inside its range.
const MAX_TTL_MINUTES: u64 = 60 * 24 * 365;

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# tarkov-list configuration

# GraphQL endpoint serving the item catalog.
api_url = "https://api.tarkov.dev/graphql"

# Language passed to the items query.
language = "en"

# Minutes a fetched catalog stays valid before it is refetched.
cache_ttl_minutes = 30

# Maximum number of live search matches.
search_limit = 10

# Timeout for the catalog request, in seconds.
request_timeout_secs = 60

# data_dir = "/path/to/state"

[pricing]
base_currency = "RUB"

[pricing.rates]
USD = 125.0
EUR = 135.0
"#;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// GraphQL endpoint serving the item catalog.
    pub api_url: String,
    /// Language passed to the items query.
    pub language: String,
    /// Catalog validity window in minutes.
    pub cache_ttl_minutes: u64,
    /// Directory holding persisted state and logs.
    pub data_dir: PathBuf,
    /// Maximum number of live search matches.
    pub search_limit: usize,
    /// Timeout for the catalog request, in seconds.
    pub request_timeout_secs: u64,
    /// Currency normalisation settings.
    pub pricing: PricingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.tarkov.dev/graphql".to_string(),
            language: "en".to_string(),
            cache_ttl_minutes: 30,
            data_dir: default_data_dir(),
            search_limit: 10,
            request_timeout_secs: 60,
            pricing: PricingConfig::default(),
        }
    }
}

/// Base currency and static multipliers into it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PricingConfig {
    /// Currency every offer is converted to before comparison.
    pub base_currency: String,
    /// Multiplier per currency code into the base currency.
    pub rates: BTreeMap<String, f64>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let rates = ExchangeRates::default();
        Self {
            base_currency: rates.base().code().to_string(),
            rates: rates
                .iter()
                .map(|(currency, rate)| (currency.code().to_string(), rate))
                .collect(),
        }
    }
}

impl PricingConfig {
    /// Build the rate table used by the price resolver.
    pub fn exchange_rates(&self) -> ExchangeRates {
        ExchangeRates::new(
            Currency::from(self.base_currency.as_str()),
            self.rates
                .iter()
                .map(|(code, rate)| (Currency::from(code.as_str()), *rate)),
        )
    }
}

impl AppConfig {
    /// Load configuration from the default file location and environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load configuration from an explicit file path (which may be absent).
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        settings
            .try_deserialize()
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    /// Catalog validity window.
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cache_ttl_minutes.min(MAX_TTL_MINUTES) as i64)
    }

    /// Location of the key-value storage file.
    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join("storage.json")
    }

    /// Directory receiving log files.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

/// Default configuration file path under the user's config directory.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Write the commented default configuration if no file exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    write_default_config(&path)?;
    Ok(path)
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(())
}
