//! Bittrex candles venue
//!
//! Fetches the recent one-minute trade candles per market and prices the
//! newest one by VWAP.

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

use crate::error::{FeedError, FeedResult};
use crate::oracle::candles::{vwap, MINUTE_MS};
use crate::oracle::polling::fetch_each;
use crate::oracle::sources::{get_json, num, sample, RestVenue};
use crate::types::{PriceSample, Venue};

const BITTREX_URL: &str = "https://api.bittrex.com/v3";

#[derive(Debug, Clone)]
pub struct BittrexVenue {
    base_url: String,
    workers: usize,
}

impl BittrexVenue {
    pub fn new(workers: usize) -> Self {
        Self::with_url(BITTREX_URL, workers)
    }

    pub fn with_url(base_url: impl Into<String>, workers: usize) -> Self {
        Self {
            base_url: base_url.into(),
            workers,
        }
    }

    async fn fetch_symbol(&self, http: &reqwest::Client, symbol: &str) -> FeedResult<PriceSample> {
        let url = format!("{}/markets/{}/candles/trade/MINUTE_1/recent", self.base_url, symbol);
        let candles: Vec<TradeCandle> = get_json(Venue::Bittrex, http, &url).await?;
        parse_candles(symbol, &candles)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeCandle {
    starts_at: String,
    open: String,
    close: String,
    volume: String,
    quote_volume: String,
}

fn parse_candles(symbol: &str, candles: &[TradeCandle]) -> FeedResult<PriceSample> {
    let candle = candles
        .last()
        .ok_or(FeedError::EmptyResponse { venue: Venue::Bittrex })?;
    let starts_at = DateTime::parse_from_rfc3339(&candle.starts_at)
        .map_err(|e| FeedError::parse(Venue::Bittrex, format!("invalid startsAt {}: {}", candle.starts_at, e)))?
        .timestamp_millis()
        .max(0) as u64;

    let price = vwap(
        num(Venue::Bittrex, "open", &candle.open)?,
        num(Venue::Bittrex, "close", &candle.close)?,
        num(Venue::Bittrex, "volume", &candle.volume)?,
        num(Venue::Bittrex, "quoteVolume", &candle.quote_volume)?,
    );
    Ok(sample(Venue::Bittrex, symbol, price, starts_at + MINUTE_MS)?)
}

#[async_trait]
impl RestVenue for BittrexVenue {
    fn venue(&self) -> Venue {
        Venue::Bittrex
    }

    async fn fetch_and_parse(
        &self,
        http: &reqwest::Client,
        symbols: &[String],
    ) -> FeedResult<Vec<PriceSample>> {
        fetch_each(Venue::Bittrex, symbols, self.workers, |symbol| {
            self.fetch_symbol(http, symbol)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_candle_priced_by_vwap() {
        let candles: Vec<TradeCandle> = serde_json::from_str(
            r#"[
                {"startsAt":"2023-11-14T22:12:00Z","open":"1","high":"1","low":"1","close":"1","volume":"1","quoteVolume":"1"},
                {"startsAt":"2023-11-14T22:13:00Z","open":"36000","high":"36100","low":"35900","close":"36050","volume":"2","quoteVolume":"72050"}
            ]"#,
        )
        .unwrap();
        let s = parse_candles("BTC-USDT", &candles).unwrap();
        assert_eq!(s.pair.key(), "BTC/USDT");
        assert_eq!(s.price, 36025.0);
        // 22:14:00 UTC
        assert_eq!(s.observed_at_ms, 1_700_000_040_000);
    }

    #[test]
    fn test_no_candles() {
        assert!(matches!(
            parse_candles("BTC-USDT", &[]),
            Err(FeedError::EmptyResponse { venue: Venue::Bittrex })
        ));
    }
}
