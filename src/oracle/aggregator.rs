//! Provider Manager - Combines price data from every venue
//!
//! Two stages: first the plain mean of each canonical pair across venues,
//! then one USD price per coin, bridging non-USD quotes through the
//! averaged `QUOTE/USD` pair.

use std::collections::HashMap;

use crate::config::AppConfig;
use crate::error::{FeedError, FeedResult};
use crate::oracle::provider::{build_provider, PriceProvider};
use crate::shutdown::Shutdown;
use crate::types::{now_ms, CoinPrice, PairPrice, PriceResponse, PricesResponse, Venue, USD};

/// Owns every running adapter and serves the averaged price table
pub struct ProviderManager {
    providers: Vec<Box<dyn PriceProvider>>,
}

impl ProviderManager {
    /// Start one adapter per venue in `provider_priority` order
    ///
    /// Any construction failure aborts startup.
    pub async fn start(config: &AppConfig, shutdown: &Shutdown) -> FeedResult<Self> {
        let mut providers = Vec::new();
        for name in &config.provider_priority {
            let venue: Venue = name.parse()?;
            let settings = config
                .provider(venue)
                .ok_or(FeedError::MissingConfig(venue))?;
            let provider = build_provider(venue, settings, config, shutdown.subscribe()).await?;
            tracing::info!(venue = %venue, "✅ Provider ready");
            providers.push(provider);
        }
        Ok(Self::from_providers(providers))
    }

    pub fn from_providers(providers: Vec<Box<dyn PriceProvider>>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Averaged USD price of every coin with at least one usable quote
    pub fn prices(&self) -> PricesResponse {
        let snapshots: Vec<HashMap<String, PairPrice>> =
            self.providers.iter().map(|p| p.get_prices()).collect();
        let by_pair = average_price_by_pair(&snapshots);
        let by_coin = average_price_by_coin(&by_pair);

        let now = now_ms();
        let mut prices: Vec<CoinPrice> = by_coin
            .into_iter()
            .map(|(denom, price)| CoinPrice {
                denom,
                price,
                timestamp_ms: now,
            })
            .collect();
        prices.sort_by(|a, b| a.denom.cmp(&b.denom));

        PricesResponse::new(prices)
    }

    /// Single coin lookup, case-insensitive
    pub fn price(&self, denom: &str) -> Option<PriceResponse> {
        let table = self.prices();
        let price = table.get(denom)?.clone();
        Some(PriceResponse {
            timestamp: table.timestamp,
            price,
        })
    }
}

/// Stage 1: unweighted mean per canonical pair across venue snapshots
///
/// The averaged timestamp is the newest contributing observation.
pub fn average_price_by_pair(
    snapshots: &[HashMap<String, PairPrice>],
) -> HashMap<String, PairPrice> {
    let mut sums: HashMap<&str, (PairPrice, f64, usize)> = HashMap::new();
    for snapshot in snapshots {
        for (key, price) in snapshot {
            let entry = sums
                .entry(key.as_str())
                .or_insert_with(|| (price.clone(), 0.0, 0));
            entry.1 += price.price;
            entry.2 += 1;
            entry.0.observed_at_ms = entry.0.observed_at_ms.max(price.observed_at_ms);
        }
    }

    sums.into_iter()
        .map(|(key, (mut pair, sum, count))| {
            pair.price = sum / count as f64;
            (key.to_string(), pair)
        })
        .collect()
}

/// Stage 2: one USD price per base coin
///
/// USD-quoted pairs count directly. Other quotes are bridged through the
/// stage-1 `QUOTE/USD` price; pairs without a positive bridge are skipped.
pub fn average_price_by_coin(by_pair: &HashMap<String, PairPrice>) -> HashMap<String, f64> {
    let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();
    for price in by_pair.values() {
        let pair = &price.pair;
        let usd_price = if pair.is_usd_quoted() {
            price.price
        } else {
            let bridge_key = format!("{}/{}", pair.quote, USD);
            match by_pair.get(&bridge_key).map(|b| b.price) {
                Some(bridge) if bridge > 0.0 => price.price * bridge,
                _ => {
                    tracing::debug!(pair = %pair, bridge = %bridge_key, "No USD bridge, skipping pair");
                    continue;
                }
            }
        };
        let entry = sums.entry(pair.base.as_str()).or_insert((0.0, 0));
        entry.0 += usd_price;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(coin, (sum, count))| (coin.to_string(), sum / count as f64))
        .collect()
}
