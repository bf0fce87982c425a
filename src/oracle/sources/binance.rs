//! Binance WebSocket venue
//!
//! Subscribes to one-minute klines on the combined stream endpoint and
//! publishes the VWAP of every closed kline.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::{FeedError, FeedResult};
use crate::oracle::candles::vwap;
use crate::oracle::sources::{decode, num, sample, Frame, StreamingVenue, Subscribe};
use crate::types::Venue;

const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/stream";
const SUBSCRIBE_ID: u64 = 9527;

#[derive(Debug, Clone)]
pub struct BinanceVenue {
    url: String,
}

impl BinanceVenue {
    pub fn new() -> Self {
        Self::with_url(BINANCE_WS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn stream_name(symbol: &str) -> String {
        format!("{}@kline_1m", symbol.to_lowercase())
    }
}

impl Default for BinanceVenue {
    fn default() -> Self {
        Self::new()
    }
}

/// Combined stream wrapper: {"stream":"btcusdt@kline_1m","data":{...}}
#[derive(Debug, Deserialize)]
struct StreamMessage {
    data: KlineEvent,
}

#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "k")]
    kline: Kline,
}

#[derive(Debug, Deserialize)]
struct Kline {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "T")]
    close_time: u64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "q")]
    quote_volume: String,
    #[serde(rename = "x")]
    closed: bool,
}

#[async_trait]
impl StreamingVenue for BinanceVenue {
    type Session = ();

    fn venue(&self) -> Venue {
        Venue::Binance
    }

    async fn endpoint(&self) -> FeedResult<String> {
        Ok(self.url.clone())
    }

    fn subscriptions(&self, symbols: &[String]) -> Vec<Subscribe> {
        if symbols.is_empty() {
            return Vec::new();
        }
        let params: Vec<String> = symbols.iter().map(|s| Self::stream_name(s)).collect();
        let command = json!({
            "id": SUBSCRIBE_ID,
            "method": "SUBSCRIBE",
            "params": params,
        });
        vec![Subscribe::new(command.to_string(), 1)]
    }

    fn parse_frame(&self, _session: &mut (), text: &str) -> FeedResult<Frame> {
        let value: serde_json::Value = decode(Venue::Binance, text)?;

        if let Some(err) = value.get("error") {
            return Ok(Frame::Rejected(err.to_string()));
        }
        // Subscription reply: {"result":null,"id":9527}
        if value.get("id").is_some() && value.get("result").is_some() {
            return Ok(Frame::Ack);
        }
        if value.get("stream").is_none() {
            tracing::debug!(venue = %Venue::Binance, frame = %text, "Unrecognized frame");
            return Ok(Frame::Ignored);
        }

        let msg: StreamMessage = serde_json::from_value(value)
            .map_err(|e| FeedError::parse(Venue::Binance, e.to_string()))?;
        let k = msg.data.kline;
        if !k.closed {
            return Ok(Frame::Ignored);
        }

        let price = vwap(
            num(Venue::Binance, "o", &k.open)?,
            num(Venue::Binance, "c", &k.close)?,
            num(Venue::Binance, "v", &k.volume)?,
            num(Venue::Binance, "q", &k.quote_volume)?,
        );
        Ok(Frame::sample(sample(Venue::Binance, &k.symbol, price, k.close_time)?))
    }
}
