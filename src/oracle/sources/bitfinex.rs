//! Bitfinex WebSocket venue
//!
//! Data frames are bare arrays tagged only with a channel id, so the
//! `subscribed` events are remembered per connection to map ids back to
//! symbols.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::{FeedError, FeedResult};
use crate::oracle::sources::{decode, sample, Frame, StreamingVenue, Subscribe};
use crate::types::Venue;

const BITFINEX_WS_URL: &str = "wss://api-pub.bitfinex.com/ws/2";

#[derive(Debug, Clone)]
pub struct BitfinexVenue {
    url: String,
}

impl BitfinexVenue {
    pub fn new() -> Self {
        Self::with_url(BITFINEX_WS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for BitfinexVenue {
    fn default() -> Self {
        Self::new()
    }
}

/// Channel id → raw symbol for the current connection
#[derive(Debug, Default)]
pub struct BitfinexSession {
    channels: HashMap<u64, String>,
}

#[derive(Debug, Deserialize)]
struct Event {
    event: String,
    #[serde(rename = "chanId")]
    chan_id: Option<u64>,
    key: Option<String>,
    msg: Option<String>,
}

/// [mts, open, close, high, low, volume]
fn candle_price(venue: Venue, candle: &[Value]) -> FeedResult<(u64, f64)> {
    if candle.len() != 6 {
        return Err(FeedError::parse(venue, format!("expected 6 candle fields, got {}", candle.len())));
    }
    let field = |i: usize| {
        candle[i]
            .as_f64()
            .ok_or_else(|| FeedError::parse(venue, format!("candle field {} is not a number", i)))
    };
    let mts = field(0)? as u64;
    // No quote volume on this feed, so VWAP is always the midpoint.
    Ok((mts, (field(1)? + field(2)?) / 2.0))
}

impl BitfinexVenue {
    fn handle_event(&self, session: &mut BitfinexSession, text: &str) -> FeedResult<Frame> {
        let event: Event = decode(Venue::Bitfinex, text)?;
        match event.event.as_str() {
            "subscribed" => {
                let (Some(chan_id), Some(key)) = (event.chan_id, event.key) else {
                    return Err(FeedError::parse(Venue::Bitfinex, "subscribed event without chanId/key"));
                };
                let parts: Vec<&str> = key.split(':').collect();
                if parts.len() != 3 {
                    return Err(FeedError::parse(Venue::Bitfinex, format!("invalid key {}", key)));
                }
                session.channels.insert(chan_id, parts[2].to_string());
                Ok(Frame::Ack)
            }
            "error" => Ok(Frame::Rejected(event.msg.unwrap_or_else(|| text.to_string()))),
            "info" | "conf" => Ok(Frame::Ignored),
            _ => {
                tracing::debug!(venue = %Venue::Bitfinex, frame = %text, "Unrecognized event");
                Ok(Frame::Ignored)
            }
        }
    }

    fn handle_data(&self, session: &BitfinexSession, text: &str) -> FeedResult<Frame> {
        let arr: Vec<Value> = decode(Venue::Bitfinex, text)?;
        if arr.len() != 2 {
            return Err(FeedError::parse(Venue::Bitfinex, format!("expected 2 elements, got {}", arr.len())));
        }
        if arr[1].as_str() == Some("hb") {
            return Ok(Frame::Heartbeat);
        }
        let chan_id = arr[0]
            .as_u64()
            .ok_or_else(|| FeedError::parse(Venue::Bitfinex, "channel id is not a number"))?;
        let Some(symbol) = session.channels.get(&chan_id) else {
            return Err(FeedError::parse(Venue::Bitfinex, format!("no channel for {}", chan_id)));
        };
        let items = arr[1]
            .as_array()
            .ok_or_else(|| FeedError::parse(Venue::Bitfinex, "payload is not an array"))?;

        // Either one candle or a snapshot of candles
        let (mts, price) = if items.first().map_or(false, Value::is_array) {
            let mut newest: Option<(u64, f64)> = None;
            for candle in items.iter().filter_map(Value::as_array) {
                let parsed = candle_price(Venue::Bitfinex, candle)?;
                if newest.map_or(true, |(ts, _)| parsed.0 > ts) {
                    newest = Some(parsed);
                }
            }
            match newest {
                Some(p) => p,
                None => return Ok(Frame::Ignored),
            }
        } else if items.is_empty() {
            return Ok(Frame::Ignored);
        } else {
            candle_price(Venue::Bitfinex, items)?
        };

        Ok(Frame::sample(sample(Venue::Bitfinex, symbol, price, mts)?))
    }
}

#[async_trait]
impl StreamingVenue for BitfinexVenue {
    type Session = BitfinexSession;

    fn venue(&self) -> Venue {
        Venue::Bitfinex
    }

    async fn endpoint(&self) -> FeedResult<String> {
        Ok(self.url.clone())
    }

    fn subscriptions(&self, symbols: &[String]) -> Vec<Subscribe> {
        symbols
            .iter()
            .map(|symbol| {
                let command = json!({
                    "event": "subscribe",
                    "channel": "candles",
                    "key": format!("trade:1m:{}", symbol),
                });
                Subscribe::new(command.to_string(), 1)
            })
            .collect()
    }

    fn parse_frame(&self, session: &mut BitfinexSession, text: &str) -> FeedResult<Frame> {
        match text.trim_start().chars().next() {
            Some('[') => self.handle_data(session, text),
            Some('{') => self.handle_event(session, text),
            _ => {
                tracing::debug!(venue = %Venue::Bitfinex, frame = %text, "Unrecognized frame");
                Ok(Frame::Ignored)
            }
        }
    }
}
