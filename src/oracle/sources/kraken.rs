//! Kraken WebSocket venue
//!
//! Legacy v1 public feed, `ohlc` subscription with a one-minute interval.
//! Kraken reports a VWAP per candle, so no local computation is needed.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{FeedError, FeedResult};
use crate::oracle::sources::{batches, decode, num, sample, Frame, StreamingVenue, Subscribe};
use crate::types::Venue;

const KRAKEN_WS_URL: &str = "wss://ws.kraken.com";
const PAIRS_PER_REQUEST: usize = 100;

#[derive(Debug, Clone)]
pub struct KrakenVenue {
    url: String,
}

impl KrakenVenue {
    pub fn new() -> Self {
        Self::with_url(KRAKEN_WS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for KrakenVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct Event {
    event: String,
    status: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[async_trait]
impl StreamingVenue for KrakenVenue {
    type Session = ();

    fn venue(&self) -> Venue {
        Venue::Kraken
    }

    async fn endpoint(&self) -> FeedResult<String> {
        Ok(self.url.clone())
    }

    fn subscriptions(&self, symbols: &[String]) -> Vec<Subscribe> {
        batches(symbols, PAIRS_PER_REQUEST)
            .map(|group| {
                let command = json!({
                    "event": "subscribe",
                    "pair": group,
                    "subscription": { "interval": 1, "name": "ohlc" },
                });
                // One subscriptionStatus per pair
                Subscribe::new(command.to_string(), group.len())
            })
            .collect()
    }

    fn parse_frame(&self, _session: &mut (), text: &str) -> FeedResult<Frame> {
        if text.trim_start().starts_with('{') {
            let event: Event = decode(Venue::Kraken, text)?;
            return Ok(match event.event.as_str() {
                "heartbeat" => Frame::Heartbeat,
                "subscriptionStatus" if event.status.as_deref() == Some("error") => {
                    Frame::Rejected(event.error_message.unwrap_or_else(|| text.to_string()))
                }
                "subscriptionStatus" => Frame::Ack,
                "systemStatus" => Frame::Ignored,
                _ => {
                    tracing::debug!(venue = %Venue::Kraken, frame = %text, "Unrecognized event");
                    Frame::Ignored
                }
            });
        }

        // [channelID, [time, etime, open, high, low, close, vwap, volume, count], "ohlc-1", "XBT/USD"]
        let arr: Vec<Value> = decode(Venue::Kraken, text)?;
        if arr.len() != 4 {
            return Err(FeedError::parse(Venue::Kraken, format!("expected 4 elements, got {}", arr.len())));
        }
        let name = arr[2].as_str().unwrap_or_default();
        if !name.starts_with("ohlc") {
            return Ok(Frame::Ignored);
        }
        let symbol = arr[3]
            .as_str()
            .ok_or_else(|| FeedError::parse(Venue::Kraken, "pair is not a string"))?;
        let candle = arr[1]
            .as_array()
            .filter(|c| c.len() == 9)
            .ok_or_else(|| FeedError::parse(Venue::Kraken, "expected 9 candle fields"))?;
        let field = |i: usize| candle[i].as_str().unwrap_or_default();

        let time_secs = num(Venue::Kraken, "time", field(0))?;
        let price = num(Venue::Kraken, "vwap", field(6))?;
        Ok(Frame::sample(sample(
            Venue::Kraken,
            symbol,
            price,
            (time_secs * 1_000.0) as u64,
        )?))
    }
}
