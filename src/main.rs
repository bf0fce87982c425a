//! Oracle feeder entry point
//!
//! Starts every configured provider, then logs the averaged price table on
//! a fixed interval until Ctrl-C.

use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use oracle_feeder::config::AppConfig;
use oracle_feeder::oracle::ProviderManager;
use oracle_feeder::shutdown::Shutdown;

fn setup_log(json: bool) {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    if result.is_err() {
        eprintln!("tracing subscriber already installed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    setup_log(config.log.json);

    info!("🚀 Starting oracle feeder");
    info!(config = %config, "Configuration loaded");

    let (shutdown, _signal) = Shutdown::new();
    let manager = ProviderManager::start(&config, &shutdown).await?;
    info!(providers = manager.len(), "✅ All providers started");

    let mut report = tokio::time::interval(Duration::from_secs(config.report.interval_secs.max(1)));
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                break;
            }
            _ = report.tick() => {
                let table = manager.prices();
                info!(coins = table.prices.len(), timestamp = %table.timestamp, "📊 Price table");
                for coin in &table.prices {
                    info!(denom = %coin.denom, price = coin.price, "  price");
                }
            }
        }
    }

    info!("🛑 Shutting down");
    shutdown.trigger();
    // Let adapters send their close frames
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(())
}
