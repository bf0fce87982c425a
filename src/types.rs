//! Core types used throughout the oracle feeder
//!
//! Venues, canonical currency pairs, per-venue price samples and the
//! published price table.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FeedError;

/// Quote currency every published coin price is expressed in
pub const USD: &str = "USD";

/// How a venue delivers its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VenueFamily {
    /// Persistent WebSocket subscription
    Streaming,
    /// Timer-driven REST requests
    Polled,
    /// Timer-driven liquidity pool queries
    OnChain,
}

/// Supported market data venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    Bybit,
    Okx,
    Kucoin,
    Huobi,
    Bitfinex,
    Kraken,
    Coinbase,
    Coingecko,
    Bitstamp,
    Bittrex,
    Fer,
    Osmosis,
}

impl Venue {
    pub const ALL: [Venue; 13] = [
        Venue::Binance,
        Venue::Bybit,
        Venue::Okx,
        Venue::Kucoin,
        Venue::Huobi,
        Venue::Bitfinex,
        Venue::Kraken,
        Venue::Coinbase,
        Venue::Coingecko,
        Venue::Bitstamp,
        Venue::Bittrex,
        Venue::Fer,
        Venue::Osmosis,
    ];

    /// Lowercase identifier used in configuration
    pub fn id(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Bybit => "bybit",
            Venue::Okx => "okx",
            Venue::Kucoin => "kucoin",
            Venue::Huobi => "huobi",
            Venue::Bitfinex => "bitfinex",
            Venue::Kraken => "kraken",
            Venue::Coinbase => "coinbase",
            Venue::Coingecko => "coingecko",
            Venue::Bitstamp => "bitstamp",
            Venue::Bittrex => "bittrex",
            Venue::Fer => "fer",
            Venue::Osmosis => "osmosis",
        }
    }

    pub fn family(&self) -> VenueFamily {
        match self {
            Venue::Binance
            | Venue::Bybit
            | Venue::Okx
            | Venue::Kucoin
            | Venue::Huobi
            | Venue::Bitfinex
            | Venue::Kraken
            | Venue::Coinbase => VenueFamily::Streaming,
            Venue::Coingecko | Venue::Bitstamp | Venue::Bittrex | Venue::Fer => {
                VenueFamily::Polled
            }
            Venue::Osmosis => VenueFamily::OnChain,
        }
    }
}

impl FromStr for Venue {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Venue::ALL
            .iter()
            .copied()
            .find(|v| v.id() == wanted)
            .ok_or_else(|| FeedError::UnknownVenue(s.to_string()))
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Venue-independent (base, quote) pair of uppercase currency codes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Canonical key, e.g. `BTC/USDT`
    pub fn key(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    pub fn is_usd_quoted(&self) -> bool {
        self.quote == USD
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// One venue's latest observation of one trading symbol
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSample {
    pub venue: Venue,
    /// Venue-specific symbol, e.g. `XBT/USD` on Kraken
    pub symbol: String,
    pub pair: CurrencyPair,
    pub price: f64,
    pub observed_at_ms: u64,
}

impl PriceSample {
    pub fn new(
        venue: Venue,
        symbol: impl Into<String>,
        pair: CurrencyPair,
        price: f64,
        observed_at_ms: u64,
    ) -> Self {
        Self {
            venue,
            symbol: symbol.into(),
            pair,
            price,
            observed_at_ms,
        }
    }

    /// Negative, NaN and infinite prices never enter a cache
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price >= 0.0
    }
}

/// Price of a canonical pair, either from one venue or averaged across venues
#[derive(Debug, Clone, PartialEq)]
pub struct PairPrice {
    pub pair: CurrencyPair,
    pub price: f64,
    pub observed_at_ms: u64,
}

/// Published USD price of one coin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinPrice {
    pub denom: String,
    pub price: f64,
    pub timestamp_ms: u64,
}

/// Full price table handed to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricesResponse {
    /// RFC3339 creation time
    pub timestamp: String,
    #[serde(default)]
    pub prices: Vec<CoinPrice>,
}

impl PricesResponse {
    pub fn new(prices: Vec<CoinPrice>) -> Self {
        Self {
            timestamp: rfc3339_now(),
            prices,
        }
    }

    pub fn get(&self, denom: &str) -> Option<&CoinPrice> {
        self.prices
            .iter()
            .find(|p| p.denom.eq_ignore_ascii_case(denom))
    }
}

/// Single-coin lookup result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceResponse {
    pub timestamp: String,
    pub price: CoinPrice,
}

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

pub fn rfc3339_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
