//! Configuration management for the oracle feeder
//!
//! Loads from YAML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::types::Venue;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Venues to start, in construction order
    pub provider_priority: Vec<String>,
    /// Per-venue settings keyed by venue id
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    pub oracle: OracleConfig,
    pub report: ReportConfig,
    pub log: LogConfig,
}

type Builder = ConfigBuilder<config::builder::DefaultState>;

fn with_defaults() -> Result<Builder> {
    let builder = Config::builder()
        .set_default("provider_priority", Vec::<String>::new())?
        // Oracle defaults
        .set_default("oracle.reconnect_delay_ms", 3000)?
        .set_default("oracle.ack_timeout_ms", 10000)?
        .set_default("oracle.fetch_workers", 16)?
        // Reporting defaults
        .set_default("report.interval_secs", 30)?
        .set_default("log.json", false)?;
    Ok(builder)
}

fn finish(builder: Builder) -> Result<AppConfig> {
    let config = builder.build().context("Failed to build configuration")?;

    let app_config: AppConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    app_config.validate()?;
    Ok(app_config)
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let builder = with_defaults()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (ORACLE_FEEDER__*)
            .add_source(
                Environment::with_prefix("ORACLE_FEEDER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("provider_priority")
                    .try_parsing(true),
            );

        finish(builder)
    }

    /// Build a configuration from an inline YAML document on top of the defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let builder = with_defaults()?.add_source(File::from_str(yaml, FileFormat::Yaml));
        finish(builder)
    }

    /// Venues in priority order
    pub fn venues(&self) -> Result<Vec<Venue>> {
        self.provider_priority
            .iter()
            .map(|name| {
                name.parse::<Venue>()
                    .with_context(|| format!("provider_priority entry {:?}", name))
            })
            .collect()
    }

    pub fn provider(&self, venue: Venue) -> Option<&ProviderConfig> {
        self.providers.get(venue.id())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.oracle.reconnect_delay_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle.ack_timeout_ms)
    }

    /// Reject unknown venues and venues without a provider section
    pub fn validate(&self) -> Result<()> {
        if self.provider_priority.is_empty() {
            bail!("provider_priority must list at least one venue");
        }
        for venue in self.venues()? {
            let Some(provider) = self.provider(venue) else {
                bail!("provider_priority lists {} but providers.{} is missing", venue, venue);
            };
            if provider.symbols.is_empty() {
                bail!("providers.{}.symbols is empty", venue);
            }
            if provider.interval == 0 {
                bail!("providers.{}.interval must be positive", venue);
            }
        }
        if self.oracle.fetch_workers == 0 {
            bail!("oracle.fetch_workers must be positive");
        }
        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        let symbols: usize = self
            .provider_priority
            .iter()
            .filter_map(|v| self.providers.get(v.as_str()))
            .map(|p| p.symbols.len())
            .sum();
        format!(
            "providers={:?} symbols={} reconnect_ms={} ack_timeout_ms={} workers={}",
            self.provider_priority,
            symbols,
            self.oracle.reconnect_delay_ms,
            self.oracle.ack_timeout_ms,
            self.oracle.fetch_workers
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
provider_priority: [binance, coingecko]
providers:
  binance:
    symbols: [BTCUSDT, ETHUSDT]
  coingecko:
    symbols: [bitcoin]
    interval: 30
"#;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let cfg = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.oracle.reconnect_delay_ms, 3000);
        assert_eq!(cfg.oracle.ack_timeout_ms, 10000);
        assert_eq!(cfg.oracle.fetch_workers, 16);
        assert_eq!(cfg.report.interval_secs, 30);
        assert!(!cfg.log.json);

        let binance = cfg.provider(Venue::Binance).unwrap();
        assert_eq!(binance.interval, 10);
        assert_eq!(binance.timeout, 15);
        assert_eq!(cfg.provider(Venue::Coingecko).unwrap().interval, 30);
    }

    #[test]
    fn test_venues_keep_priority_order() {
        let cfg = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.venues().unwrap(), vec![Venue::Binance, Venue::Coingecko]);
        assert!(cfg.digest().contains("symbols=3"));
    }

    #[test]
    fn test_unknown_venue_rejected() {
        let yaml = r#"
provider_priority: [mtgox]
providers:
  mtgox:
    symbols: [BTCUSD]
"#;
        assert!(AppConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_missing_provider_section_rejected() {
        let yaml = r#"
provider_priority: [kraken]
providers:
  binance:
    symbols: [BTCUSDT]
"#;
        let err = AppConfig::from_yaml(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("providers.kraken is missing"));
    }
}
