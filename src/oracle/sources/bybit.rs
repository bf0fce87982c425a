//! Bybit WebSocket venue
//!
//! Spot v5 public stream, one-minute klines. Bybit drops idle connections,
//! so a client ping goes out every 15 seconds.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::error::{FeedError, FeedResult};
use crate::oracle::candles::vwap;
use crate::oracle::sources::{batches, decode, num, sample, Frame, StreamingVenue, Subscribe};
use crate::types::Venue;

const BYBIT_WS_URL: &str = "wss://stream.bybit.com/v5/public/spot";
const REQ_ID: &str = "oracle-feeder";
const TOPICS_PER_REQUEST: usize = 10;
const PING_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct BybitVenue {
    url: String,
}

impl BybitVenue {
    pub fn new() -> Self {
        Self::with_url(BYBIT_WS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for BybitVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct OpReply {
    op: String,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    ret_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KlineMessage {
    topic: String,
    data: Vec<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    end: u64,
    open: String,
    close: String,
    volume: String,
    turnover: String,
    confirm: bool,
}

#[async_trait]
impl StreamingVenue for BybitVenue {
    type Session = ();

    fn venue(&self) -> Venue {
        Venue::Bybit
    }

    async fn endpoint(&self) -> FeedResult<String> {
        Ok(self.url.clone())
    }

    fn subscriptions(&self, symbols: &[String]) -> Vec<Subscribe> {
        batches(symbols, TOPICS_PER_REQUEST)
            .map(|group| {
                let args: Vec<String> = group.iter().map(|s| format!("kline.1.{}", s)).collect();
                let command = json!({ "req_id": REQ_ID, "op": "subscribe", "args": args });
                Subscribe::new(command.to_string(), 1)
            })
            .collect()
    }

    fn keepalive(&self) -> Option<(Duration, String)> {
        Some((
            PING_INTERVAL,
            json!({ "req_id": REQ_ID, "op": "ping" }).to_string(),
        ))
    }

    fn parse_frame(&self, _session: &mut (), text: &str) -> FeedResult<Frame> {
        let value: serde_json::Value = decode(Venue::Bybit, text)?;

        if value.get("op").is_some() {
            let reply: OpReply = serde_json::from_value(value)
                .map_err(|e| FeedError::parse(Venue::Bybit, e.to_string()))?;
            return Ok(match (reply.op.as_str(), reply.success) {
                (_, false) => Frame::Rejected(reply.ret_msg.unwrap_or_else(|| text.to_string())),
                ("subscribe", true) => Frame::Ack,
                ("ping", true) | ("pong", true) => Frame::Heartbeat,
                _ => Frame::Ignored,
            });
        }
        if value.get("topic").is_none() {
            tracing::debug!(venue = %Venue::Bybit, frame = %text, "Unrecognized frame");
            return Ok(Frame::Ignored);
        }

        let msg: KlineMessage = serde_json::from_value(value)
            .map_err(|e| FeedError::parse(Venue::Bybit, e.to_string()))?;
        let parts: Vec<&str> = msg.topic.split('.').collect();
        if parts.len() != 3 {
            return Err(FeedError::parse(Venue::Bybit, format!("invalid topic {}", msg.topic)));
        }
        let symbol = parts[2];
        let [candle] = msg.data.as_slice() else {
            return Err(FeedError::parse(Venue::Bybit, "expected exactly one kline"));
        };
        if !candle.confirm {
            return Ok(Frame::Ignored);
        }

        let price = vwap(
            num(Venue::Bybit, "open", &candle.open)?,
            num(Venue::Bybit, "close", &candle.close)?,
            num(Venue::Bybit, "volume", &candle.volume)?,
            num(Venue::Bybit, "turnover", &candle.turnover)?,
        );
        Ok(Frame::sample(sample(Venue::Bybit, symbol, price, candle.end)?))
    }
}
