//! OKX WebSocket venue
//!
//! Public v5 `candle1m` channel. OKX expects a plain-text `ping` at least
//! every 30 seconds and answers with `pong`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::error::{FeedError, FeedResult};
use crate::oracle::candles::vwap;
use crate::oracle::sources::{decode, num, sample, Frame, StreamingVenue, Subscribe};
use crate::types::Venue;

const OKX_WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";
const PING_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct OkxVenue {
    url: String,
}

impl OkxVenue {
    pub fn new() -> Self {
        Self::with_url(OKX_WS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for OkxVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct Message {
    event: Option<String>,
    msg: Option<String>,
    arg: Option<Arg>,
    data: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Deserialize)]
struct Arg {
    #[serde(rename = "instId")]
    inst_id: String,
}

#[async_trait]
impl StreamingVenue for OkxVenue {
    type Session = ();

    fn venue(&self) -> Venue {
        Venue::Okx
    }

    async fn endpoint(&self) -> FeedResult<String> {
        Ok(self.url.clone())
    }

    fn subscriptions(&self, symbols: &[String]) -> Vec<Subscribe> {
        if symbols.is_empty() {
            return Vec::new();
        }
        let args: Vec<serde_json::Value> = symbols
            .iter()
            .map(|s| json!({ "channel": "candle1m", "instId": s }))
            .collect();
        let command = json!({ "op": "subscribe", "args": args });
        // One `subscribe` event per argument
        vec![Subscribe::new(command.to_string(), symbols.len())]
    }

    fn keepalive(&self) -> Option<(Duration, String)> {
        Some((PING_INTERVAL, "ping".to_string()))
    }

    fn parse_frame(&self, _session: &mut (), text: &str) -> FeedResult<Frame> {
        if text == "pong" {
            return Ok(Frame::Heartbeat);
        }
        let msg: Message = decode(Venue::Okx, text)?;

        if let Some(event) = msg.event.as_deref() {
            return Ok(match event {
                "subscribe" => Frame::Ack,
                "error" => Frame::Rejected(msg.msg.unwrap_or_else(|| text.to_string())),
                _ => Frame::Ignored,
            });
        }
        let (Some(arg), Some(data)) = (msg.arg, msg.data) else {
            tracing::debug!(venue = %Venue::Okx, frame = %text, "Unrecognized frame");
            return Ok(Frame::Ignored);
        };

        // [ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]
        let [candle] = data.as_slice() else {
            return Err(FeedError::parse(Venue::Okx, format!("expected one candle, got {}", data.len())));
        };
        if candle.len() != 9 {
            return Err(FeedError::parse(Venue::Okx, format!("expected 9 candle fields, got {}", candle.len())));
        }
        if candle[8] != "1" {
            return Ok(Frame::Ignored);
        }

        let ts = candle[0]
            .parse::<u64>()
            .map_err(|_| FeedError::parse(Venue::Okx, format!("invalid ts {}", candle[0])))?;
        let price = vwap(
            num(Venue::Okx, "o", &candle[1])?,
            num(Venue::Okx, "c", &candle[4])?,
            num(Venue::Okx, "vol", &candle[5])?,
            num(Venue::Okx, "volCcyQuote", &candle[7])?,
        );
        Ok(Frame::sample(sample(Venue::Okx, &arg.inst_id, price, ts)?))
    }
}
