//! Coinbase Exchange WebSocket venue
//!
//! Coinbase publishes trades only (`matches` channel). Trades are rolled into
//! one-minute candles per product, and a candle's VWAP is published once the
//! next minute's first trade arrives.

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;

use crate::error::{FeedError, FeedResult};
use crate::oracle::candles::CandleBuilder;
use crate::oracle::sources::{decode, num, sample, Frame, StreamingVenue, Subscribe};
use crate::types::Venue;

const COINBASE_WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";

#[derive(Debug, Clone)]
pub struct CoinbaseVenue {
    url: String,
}

impl CoinbaseVenue {
    pub fn new() -> Self {
        Self::with_url(COINBASE_WS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for CoinbaseVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct CoinbaseMessage {
    #[serde(rename = "type")]
    msg_type: String,
    product_id: Option<String>,
    price: Option<String>,
    size: Option<String>,
    time: Option<String>,
    message: Option<String>,
    reason: Option<String>,
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> FeedResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| FeedError::parse(Venue::Coinbase, format!("match without {}", field)))
}

#[async_trait]
impl StreamingVenue for CoinbaseVenue {
    type Session = CandleBuilder;

    fn venue(&self) -> Venue {
        Venue::Coinbase
    }

    async fn endpoint(&self) -> FeedResult<String> {
        Ok(self.url.clone())
    }

    fn subscriptions(&self, symbols: &[String]) -> Vec<Subscribe> {
        if symbols.is_empty() {
            return Vec::new();
        }
        let command = json!({
            "type": "subscribe",
            "channels": [{ "name": "matches", "product_ids": symbols }],
        });
        vec![Subscribe::new(command.to_string(), 1)]
    }

    fn parse_frame(&self, candles: &mut CandleBuilder, text: &str) -> FeedResult<Frame> {
        let msg: CoinbaseMessage = decode(Venue::Coinbase, text)?;
        match msg.msg_type.as_str() {
            "subscriptions" => Ok(Frame::Ack),
            "heartbeat" => Ok(Frame::Heartbeat),
            "error" => {
                let reason = [msg.message, msg.reason].into_iter().flatten().collect::<Vec<_>>().join(": ");
                Ok(Frame::Rejected(reason))
            }
            "match" | "last_match" => {
                let symbol = required("product_id", &msg.product_id)?;
                let price = num(Venue::Coinbase, "price", required("price", &msg.price)?)?;
                let size = num(Venue::Coinbase, "size", required("size", &msg.size)?)?;
                let time = required("time", &msg.time)?;
                let ts = DateTime::parse_from_rfc3339(time)
                    .map_err(|e| FeedError::parse(Venue::Coinbase, format!("invalid time {}: {}", time, e)))?
                    .timestamp_millis()
                    .max(0) as u64;

                match candles.add_trade(symbol, ts, price, size) {
                    Some(candle) => Ok(Frame::sample(sample(
                        Venue::Coinbase,
                        &candle.symbol,
                        candle.vwap(),
                        candle.close_time,
                    )?)),
                    None => Ok(Frame::Ignored),
                }
            }
            _ => {
                tracing::debug!(venue = %Venue::Coinbase, frame = %text, "Unrecognized frame");
                Ok(Frame::Ignored)
            }
        }
    }
}
