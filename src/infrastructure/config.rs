//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate:
//! 1. Built-in defaults (the `defaults` module below)
//! 2. Optional TOML file (`config/default.toml` or an explicit path)
//! 3. Environment overrides, e.g. `SEED_HARVESTER__POLITENESS__MIN_DELAY_MS=3000`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "SEED_HARVESTER";
pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crawler: CrawlerConfig,
    pub politeness: PolitenessConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    /// Sellers the binary knows how to crawl
    pub sites: Vec<SiteEntry>,
}

/// Crawler identity and transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Sent on every request, robots.txt included
    pub user_agent: String,
    /// Identity matched against robots.txt `User-agent` groups
    pub robots_token: String,
    pub accept_language: String,
    pub request_timeout_secs: u64,
    pub follow_redirects: bool,
}

/// Delay and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub robots_cache_ttl_secs: u64,
    /// Attempts per page, the first one included
    pub max_fetch_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    /// Log file name inside the log directory
    pub file_name: String,
    /// Module-specific log level filters (e.g., "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

/// One configured seller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteEntry {
    pub seller: String,
    /// Storefront family: "woocommerce", "magento" or "shopify"
    pub adapter: String,
    pub source_url: String,
    /// Defaults to the origin of `source_url`
    #[serde(default)]
    pub base_url: Option<String>,
}

impl SiteEntry {
    pub fn base_url(&self) -> String {
        if let Some(base) = &self.base_url {
            return base.trim_end_matches('/').to_string();
        }
        url::Url::parse(&self.source_url)
            .map(|url| url.origin().ascii_serialization())
            .unwrap_or_else(|_| self.source_url.clone())
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            robots_token: defaults::ROBOTS_TOKEN.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            follow_redirects: true,
        }
    }
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: defaults::MIN_DELAY_MS,
            max_delay_ms: defaults::MAX_DELAY_MS,
            robots_cache_ttl_secs: defaults::ROBOTS_CACHE_TTL_SECS,
            max_fetch_attempts: defaults::MAX_FETCH_ATTEMPTS,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: ConfigManager::default_database_url(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("html5ever".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

impl PolitenessConfig {
    pub fn robots_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_cache_ttl_secs)
    }
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AppConfig {
    /// Load defaults, then `path` (or `config/default.toml` when present), then env
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = config::Config::try_from(&Self::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        match path {
            Some(path) => {
                info!("📋 Loading configuration from {:?}", path);
                builder = builder.add_source(config::File::from(path));
            }
            None => {
                debug!("Looking for optional {}", DEFAULT_CONFIG_FILE);
                builder = builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false));
            }
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(ConfigError::validation("crawler.user_agent must not be empty"));
        }
        if self.crawler.robots_token.trim().is_empty() {
            return Err(ConfigError::validation("crawler.robots_token must not be empty"));
        }
        if !(30..=90).contains(&self.crawler.request_timeout_secs) {
            return Err(ConfigError::validation(format!(
                "crawler.request_timeout_secs must be within 30..=90, got {}",
                self.crawler.request_timeout_secs
            )));
        }
        if self.politeness.min_delay_ms > self.politeness.max_delay_ms {
            return Err(ConfigError::validation(
                "politeness.min_delay_ms cannot be greater than max_delay_ms",
            ));
        }
        if !(2..=3).contains(&self.politeness.max_fetch_attempts) {
            return Err(ConfigError::validation(format!(
                "politeness.max_fetch_attempts must be 2 or 3, got {}",
                self.politeness.max_fetch_attempts
            )));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::validation("database.max_connections must be positive"));
        }

        let mut sellers = std::collections::HashSet::new();
        for site in &self.sites {
            if url::Url::parse(&site.source_url).is_err() {
                return Err(ConfigError::validation(format!(
                    "site '{}' has invalid source_url '{}'",
                    site.seller, site.source_url
                )));
            }
            if !sellers.insert(site.seller.to_lowercase()) {
                return Err(ConfigError::validation(format!(
                    "site '{}' is configured twice",
                    site.seller
                )));
            }
        }
        Ok(())
    }

    /// Case-insensitive lookup of a configured seller
    pub fn site(&self, seller: &str) -> Option<&SiteEntry> {
        self.sites
            .iter()
            .find(|site| site.seller.eq_ignore_ascii_case(seller))
    }
}

/// Directory helpers
pub struct ConfigManager;

impl ConfigManager {
    /// Get application data directory
    pub fn get_app_data_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join(defaults::APP_DIR_NAME))
    }

    pub fn get_log_dir() -> PathBuf {
        Self::get_app_data_dir()
            .map(|dir| dir.join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    fn default_database_url() -> String {
        match Self::get_app_data_dir() {
            Some(dir) => format!("sqlite:{}", dir.join("database").join("catalog.db").display()),
            None => "sqlite:catalog.db".to_string(),
        }
    }
}

/// Default configuration values
pub mod defaults {
    pub const APP_DIR_NAME: &str = "seed-harvester";

    pub const USER_AGENT: &str =
        "Mozilla/5.0 (compatible; SeedHarvester/0.3; +https://github.com/seed-harvester/seed-harvester)";

    pub const ROBOTS_TOKEN: &str = "SeedHarvester";

    pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

    /// Per-request timeout in seconds
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Politeness window when robots.txt gives no Crawl-delay
    pub const MIN_DELAY_MS: u64 = 2000;
    pub const MAX_DELAY_MS: u64 = 5000;

    pub const ROBOTS_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

    pub const MAX_FETCH_ATTEMPTS: u32 = 3;

    pub const DB_MAX_CONNECTIONS: u32 = 5;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_FILE_NAME: &str = "seed-harvester.log";
}
