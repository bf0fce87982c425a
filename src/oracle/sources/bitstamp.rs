//! Bitstamp OHLC venue
//!
//! One request per symbol for the latest one-minute candle. Bitstamp has no
//! quote volume on this endpoint, so the price is the open/close midpoint.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{FeedError, FeedResult};
use crate::oracle::polling::fetch_each;
use crate::oracle::sources::{get_json, num, sample, RestVenue};
use crate::types::{PriceSample, Venue};

const BITSTAMP_URL: &str = "https://www.bitstamp.net/api/v2/ohlc";

#[derive(Debug, Clone)]
pub struct BitstampVenue {
    base_url: String,
    workers: usize,
}

impl BitstampVenue {
    pub fn new(workers: usize) -> Self {
        Self::with_url(BITSTAMP_URL, workers)
    }

    pub fn with_url(base_url: impl Into<String>, workers: usize) -> Self {
        Self {
            base_url: base_url.into(),
            workers,
        }
    }

    async fn fetch_symbol(&self, http: &reqwest::Client, symbol: &str) -> FeedResult<PriceSample> {
        let url = format!("{}/{}/?step=60&limit=1", self.base_url, symbol);
        let body: OhlcResponse = get_json(Venue::Bitstamp, http, &url).await?;
        parse_ohlc(symbol, body)
    }
}

#[derive(Debug, Deserialize)]
struct OhlcResponse {
    data: OhlcData,
}

#[derive(Debug, Deserialize)]
struct OhlcData {
    #[serde(default)]
    ohlc: Vec<Ohlc>,
}

#[derive(Debug, Deserialize)]
struct Ohlc {
    open: String,
    close: String,
    /// Unix seconds
    timestamp: String,
}

fn parse_ohlc(symbol: &str, body: OhlcResponse) -> FeedResult<PriceSample> {
    let candle = body
        .data
        .ohlc
        .first()
        .ok_or(FeedError::EmptyResponse { venue: Venue::Bitstamp })?;
    let open = num(Venue::Bitstamp, "open", &candle.open)?;
    let close = num(Venue::Bitstamp, "close", &candle.close)?;
    let ts_secs = candle
        .timestamp
        .parse::<u64>()
        .map_err(|_| FeedError::parse(Venue::Bitstamp, format!("invalid timestamp {}", candle.timestamp)))?;
    Ok(sample(Venue::Bitstamp, symbol, (open + close) / 2.0, ts_secs * 1_000)?)
}

#[async_trait]
impl RestVenue for BitstampVenue {
    fn venue(&self) -> Venue {
        Venue::Bitstamp
    }

    async fn fetch_and_parse(
        &self,
        http: &reqwest::Client,
        symbols: &[String],
    ) -> FeedResult<Vec<PriceSample>> {
        fetch_each(Venue::Bitstamp, symbols, self.workers, |symbol| {
            self.fetch_symbol(http, symbol)
        })
        .await
    }
}
