//! Venue implementations
//!
//! Streaming venues implement `StreamingVenue` and are driven by
//! `oracle::streaming`. Polled venues implement `RestVenue` and are driven by
//! `oracle::polling`. Each venue only knows its own wire format.

mod binance;
mod bitfinex;
mod bitstamp;
mod bittrex;
mod bybit;
mod coinbase;
mod coingecko;
mod fer;
mod huobi;
mod kraken;
mod kucoin;
mod okx;

pub use binance::BinanceVenue;
pub use bitfinex::BitfinexVenue;
pub use bitstamp::BitstampVenue;
pub use bittrex::BittrexVenue;
pub use bybit::BybitVenue;
pub use coinbase::CoinbaseVenue;
pub use coingecko::CoingeckoVenue;
pub use fer::FerVenue;
pub use huobi::HuobiVenue;
pub use kraken::KrakenVenue;
pub use kucoin::KucoinVenue;
pub use okx::OkxVenue;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{FeedError, FeedResult, NormalizationError};
use crate::oracle::symbols;
use crate::types::{PriceSample, Venue};

/// One outbound subscribe command
#[derive(Debug, Clone, PartialEq)]
pub struct Subscribe {
    pub payload: String,
    /// Acknowledgements the venue sends for this command (0 = do not wait)
    pub acks: usize,
}

impl Subscribe {
    pub fn new(payload: impl Into<String>, acks: usize) -> Self {
        Self {
            payload: payload.into(),
            acks,
        }
    }
}

/// What a single inbound text frame meant
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Closed-interval prices ready for the cache
    Samples(Vec<PriceSample>),
    /// Subscription acknowledged
    Ack,
    /// Venue heartbeat or keep-alive reply
    Heartbeat,
    /// Valid but not price-bearing (open candle, info event, ...)
    Ignored,
    /// Venue reported an error for a request
    Rejected(String),
    /// Payload to send straight back, e.g. an application-level pong
    Reply(String),
}

impl Frame {
    pub fn sample(sample: PriceSample) -> Self {
        Frame::Samples(vec![sample])
    }
}

/// Wire format and handshake rules of one streaming venue
#[async_trait]
pub trait StreamingVenue: Send + Sync + 'static {
    /// Per-connection state, reset on every reconnect
    type Session: Default + Send + 'static;

    fn venue(&self) -> Venue;

    /// WebSocket URL for the next connection attempt
    async fn endpoint(&self) -> FeedResult<String>;

    /// Whether the server speaks first
    fn expects_hello(&self) -> bool {
        false
    }

    /// Validate the server hello
    fn check_hello(&self, _text: &str) -> FeedResult<()> {
        Ok(())
    }

    /// Subscribe commands for the configured symbols
    fn subscriptions(&self, symbols: &[String]) -> Vec<Subscribe>;

    /// Text carried by a binary frame; binary frames are ignored by default
    fn decode_binary(&self, _data: &[u8]) -> FeedResult<Option<String>> {
        Ok(None)
    }

    /// Client keep-alive interval and payload
    fn keepalive(&self) -> Option<(Duration, String)> {
        None
    }

    fn parse_frame(&self, session: &mut Self::Session, text: &str) -> FeedResult<Frame>;
}

/// Request and response handling of one polled venue
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RestVenue: Send + Sync + 'static {
    fn venue(&self) -> Venue;

    /// One tick: fetch every symbol and return whatever parsed
    async fn fetch_and_parse(
        &self,
        http: &reqwest::Client,
        symbols: &[String],
    ) -> FeedResult<Vec<PriceSample>>;
}

/// Build a sample, normalizing the raw symbol
pub(crate) fn sample(
    venue: Venue,
    symbol: &str,
    price: f64,
    observed_at_ms: u64,
) -> Result<PriceSample, NormalizationError> {
    let pair = symbols::normalize(venue, symbol)?;
    Ok(PriceSample::new(venue, symbol, pair, price, observed_at_ms))
}

/// Parse a decimal field that venues send as a JSON string
pub(crate) fn num(venue: Venue, field: &str, raw: &str) -> FeedResult<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| FeedError::parse(venue, format!("{} is not a number: {:?}", field, raw)))
}

pub(crate) fn decode<T: DeserializeOwned>(venue: Venue, text: &str) -> FeedResult<T> {
    serde_json::from_str(text).map_err(|e| FeedError::parse(venue, e.to_string()))
}

/// Split symbols into groups of at most `size`
pub(crate) fn batches(symbols: &[String], size: usize) -> impl Iterator<Item = &[String]> {
    symbols.chunks(size.max(1))
}

/// GET a JSON document, mapping transport and status failures
pub(crate) async fn get_json<T: DeserializeOwned>(
    venue: Venue,
    http: &reqwest::Client,
    url: &str,
) -> FeedResult<T> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| FeedError::http(venue, e))?;

    if !response.status().is_success() {
        return Err(FeedError::Status {
            venue,
            status: response.status().as_u16(),
            url: url.split('?').next().unwrap_or(url).to_string(),
        });
    }

    response.json().await.map_err(|e| FeedError::http(venue, e))
}

/// Log a normalization failure and drop the sample
pub(crate) fn keep_normalized(
    result: Result<PriceSample, NormalizationError>,
) -> Option<PriceSample> {
    match result {
        Ok(sample) => Some(sample),
        Err(e) => {
            tracing::warn!(venue = %e.venue, symbol = %e.symbol, error = %e, "Dropping unnormalizable symbol");
            None
        }
    }
}
