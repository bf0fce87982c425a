//! On-chain pool adapter (Osmosis)
//!
//! Queries a whitelist of liquidity pools through public LCD endpoints,
//! prices every pool in OSMO, then converts to USDC through the OSMO/USDC
//! pool. A tick without a usable OSMO price is rejected as a whole.

use futures_util::{stream, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::error::{FeedError, FeedResult};
use crate::oracle::cache::VenueCache;
use crate::oracle::provider::PriceProvider;
use crate::oracle::sources::{get_json, keep_normalized, sample};
use crate::shutdown::ShutdownSignal;
use crate::types::{now_ms, PairPrice, PriceSample, Venue};

pub const OSMOSIS_ENDPOINTS: [&str; 2] = [
    "https://osmosis-api.polkachu.com",
    "https://lcd.osmosis.zone",
];

/// Symbol of the pool that prices the bridge asset
pub const BRIDGE_SYMBOL: &str = "OSMO/USDC";
const BRIDGE_ASSET: &str = "OSMO";

/// Fixed-point inputs keep at most this many significant digits
pub const MAX_SIGNIFICANT_DIGITS: usize = 18;

/// Decimal supports at most 28 fractional digits
const MAX_SCALE: i64 = 28;

/// One whitelisted pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSpec {
    pub symbol: &'static str,
    pub pool_id: u64,
    /// The pair's base is the second asset (token1) of the pool
    pub base_second: bool,
}

const fn pool(symbol: &'static str, pool_id: u64) -> PoolSpec {
    PoolSpec {
        symbol,
        pool_id,
        base_second: false,
    }
}

pub const POOL_WHITELIST: &[PoolSpec] = &[
    pool("ATOM/USDC", 1),
    pool("AKT/USDC", 3),
    pool("JUNO/USDC", 497),
    pool("SCRT/USDC", 584),
    pool("STARS/USDC", 604),
    PoolSpec {
        symbol: BRIDGE_SYMBOL,
        pool_id: 678,
        base_second: true,
    },
    pool("INJ/USDC", 725),
    pool("LUNA/USDC", 726),
    pool("KAVA/USDC", 730),
    pool("LINK/USDC", 731),
    pool("LUNC/USDC", 800),
];

pub fn whitelisted(symbol: &str) -> Option<&'static PoolSpec> {
    POOL_WHITELIST
        .iter()
        .find(|p| p.symbol.eq_ignore_ascii_case(symbol))
}

/// Round-robin over endpoints; each is handed out once per cycle
#[derive(Debug)]
pub struct EndpointRotator {
    endpoints: Vec<(String, bool)>,
}

impl EndpointRotator {
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(|e| (e.into(), false)).collect(),
        }
    }

    pub fn next(&mut self) -> Option<String> {
        if let Some((url, used)) = self.endpoints.iter_mut().find(|(_, used)| !*used) {
            *used = true;
            return Some(url.clone());
        }
        // Full cycle done: reset and start over from the first
        for (_, used) in self.endpoints.iter_mut() {
            *used = false;
        }
        let (url, used) = self.endpoints.first_mut()?;
        *used = true;
        Some(url.clone())
    }
}

/// Parse a fixed-point string keeping at most 18 significant digits
///
/// Extra digits are truncated, not rounded. Returns `None` for anything that
/// is not a plain unsigned decimal.
pub fn parse_truncated(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    let (int_part, frac_part) = raw.split_once('.').unwrap_or((raw, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(int_part) || !is_digits(frac_part) {
        return None;
    }

    let digits = format!("{}{}", int_part, frac_part);
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return Some(Decimal::ZERO);
    }

    let keep = significant.len().min(MAX_SIGNIFICANT_DIGITS);
    let mut mantissa: i128 = significant[..keep].parse().ok()?;
    // value = mantissa * 10^-scale
    let mut scale = frac_part.len() as i64 - (significant.len() - keep) as i64;

    if scale > MAX_SCALE {
        let shift = u32::try_from(scale - MAX_SCALE).ok()?;
        mantissa = 10i128.checked_pow(shift).map_or(0, |div| mantissa / div);
        scale = MAX_SCALE;
    }

    if scale >= 0 {
        Some(Decimal::from_i128_with_scale(mantissa, scale as u32))
    } else {
        let factor = 10i128.checked_pow(u32::try_from(-scale).ok()?)?;
        let value = mantissa.checked_mul(factor)?;
        Decimal::try_from_i128_with_scale(value, 0).ok()
    }
}

#[derive(Debug, Deserialize)]
struct PoolResponse {
    pool: Pool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "@type")]
enum Pool {
    /// Constant-product (balancer) pool
    #[serde(rename = "/osmosis.gamm.v1beta1.Pool")]
    ConstantProduct { pool_assets: Vec<PoolAsset> },
    #[serde(rename = "/osmosis.concentratedliquidity.v1beta1.Pool")]
    Concentrated { current_sqrt_price: String },
}

#[derive(Debug, Deserialize)]
struct PoolAsset {
    token: Token,
}

#[derive(Debug, Deserialize)]
struct Token {
    amount: String,
}

fn amount(raw: &str) -> FeedResult<Decimal> {
    parse_truncated(raw)
        .ok_or_else(|| FeedError::parse(Venue::Osmosis, format!("invalid fixed-point value {:?}", raw)))
}

/// Price of the pair's base in units of the other pool asset
fn pool_price(spec: &PoolSpec, pool: &Pool) -> FeedResult<Decimal> {
    let price = match pool {
        Pool::ConstantProduct { pool_assets } => {
            let [first, second] = pool_assets.as_slice() else {
                return Err(FeedError::parse(
                    Venue::Osmosis,
                    format!("pool {} has {} assets", spec.pool_id, pool_assets.len()),
                ));
            };
            let first = amount(&first.token.amount)?;
            let second = amount(&second.token.amount)?;
            if spec.base_second {
                first.checked_div(second)
            } else {
                second.checked_div(first)
            }
        }
        Pool::Concentrated { current_sqrt_price } => {
            let sqrt = amount(current_sqrt_price)?;
            let price = sqrt.checked_mul(sqrt);
            if spec.base_second {
                price.and_then(|p| Decimal::ONE.checked_div(p))
            } else {
                price
            }
        }
    };
    price
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| FeedError::parse(Venue::Osmosis, format!("pool {} has no liquidity", spec.pool_id)))
}

/// Convert bridge-denominated pool prices into quote prices
///
/// Fails without producing anything when the bridge pool is missing or
/// priced at zero.
fn bridge_prices(
    pool_prices: &HashMap<&'static str, Decimal>,
    observed_at_ms: u64,
) -> FeedResult<Vec<PriceSample>> {
    let bridge = pool_prices
        .get(BRIDGE_SYMBOL)
        .copied()
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| FeedError::BridgeUnresolved {
            venue: Venue::Osmosis,
            bridge: BRIDGE_ASSET.to_string(),
        })?;

    let samples = pool_prices
        .iter()
        .filter_map(|(symbol, price)| {
            let quoted = if *symbol == BRIDGE_SYMBOL {
                *price
            } else {
                price.checked_mul(bridge)?
            };
            let quoted = quoted.to_f64()?;
            keep_normalized(sample(Venue::Osmosis, symbol, quoted, observed_at_ms))
        })
        .collect();
    Ok(samples)
}

/// Pool queries for one provider
struct PoolQuery {
    pools: Vec<&'static PoolSpec>,
    rotator: EndpointRotator,
    workers: usize,
}

impl PoolQuery {
    fn new(symbols: &[String], endpoints: EndpointRotator, workers: usize) -> Self {
        let mut pools: Vec<&'static PoolSpec> = Vec::new();
        for symbol in symbols {
            match whitelisted(symbol) {
                Some(spec) if !pools.contains(&spec) => pools.push(spec),
                Some(_) => {}
                None => {
                    tracing::warn!(venue = %Venue::Osmosis, symbol = %symbol, "Symbol has no whitelisted pool, skipping");
                }
            }
        }
        // The bridge pool is always needed
        if let Some(bridge) = whitelisted(BRIDGE_SYMBOL) {
            if !pools.contains(&bridge) {
                pools.push(bridge);
            }
        }
        Self {
            pools,
            rotator: endpoints,
            workers,
        }
    }

    async fn fetch(&mut self, http: &reqwest::Client) -> FeedResult<Vec<PriceSample>> {
        let endpoint = self
            .rotator
            .next()
            .ok_or_else(|| FeedError::parse(Venue::Osmosis, "no endpoints configured"))?;

        let requests: Vec<_> = self
            .pools
            .iter()
            .copied()
            .map(|spec| {
                let url = format!("{}/osmosis/poolmanager/v1beta1/pools/{}", endpoint, spec.pool_id);
                async move { (spec, get_json::<PoolResponse>(Venue::Osmosis, http, &url).await) }
            })
            .collect();
        let results: Vec<(&'static PoolSpec, FeedResult<PoolResponse>)> = stream::iter(requests)
            .buffer_unordered(self.workers.max(1))
            .collect()
            .await;

        let mut pool_prices = HashMap::with_capacity(results.len());
        for (spec, result) in results {
            match result.and_then(|resp| pool_price(spec, &resp.pool)) {
                Ok(price) => {
                    pool_prices.insert(spec.symbol, price);
                }
                Err(e) => {
                    tracing::warn!(venue = %Venue::Osmosis, pool = spec.pool_id, error = %e, "Pool query failed");
                }
            }
        }

        bridge_prices(&pool_prices, now_ms())
    }
}

/// Merge a tick's outcome into the cache; a failed tick changes nothing
fn record_tick(cache: &VenueCache, result: FeedResult<Vec<PriceSample>>) -> usize {
    match result {
        Ok(samples) => cache.merge(samples),
        Err(e) => {
            tracing::warn!(venue = %Venue::Osmosis, error = %e, "Pool tick rejected, keeping cached prices");
            0
        }
    }
}

/// Timer-driven on-chain pool adapter
pub struct PoolProvider {
    cache: Arc<VenueCache>,
}

impl PoolProvider {
    pub async fn start(
        http: reqwest::Client,
        symbols: Vec<String>,
        interval: Duration,
        workers: usize,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self::start_with(
            http,
            symbols,
            EndpointRotator::new(OSMOSIS_ENDPOINTS),
            interval,
            workers,
            shutdown,
        )
        .await
    }

    pub async fn start_with(
        http: reqwest::Client,
        symbols: Vec<String>,
        endpoints: EndpointRotator,
        interval: Duration,
        workers: usize,
        mut shutdown: ShutdownSignal,
    ) -> Self {
        let cache = Arc::new(VenueCache::new());
        let mut query = PoolQuery::new(&symbols, endpoints, workers);

        record_tick(&cache, query.fetch(&http).await);

        let task_cache = Arc::clone(&cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!(venue = %Venue::Osmosis, "Pool poller stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let merged = record_tick(&task_cache, query.fetch(&http).await);
                        tracing::debug!(venue = %Venue::Osmosis, merged, "Pool tick merged");
                    }
                }
            }
        });

        Self { cache }
    }
}

impl PriceProvider for PoolProvider {
    fn venue(&self) -> Venue {
        Venue::Osmosis
    }

    fn get_prices(&self) -> HashMap<String, PairPrice> {
        self.cache.pair_prices()
    }
}
