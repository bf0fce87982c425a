//! Huobi WebSocket venue
//!
//! Every server frame is gzip-compressed JSON in a binary message. The
//! server pings with `{"ping": n}` and drops clients that do not answer
//! `{"pong": n}`.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::json;
use std::io::Read;

use crate::error::{FeedError, FeedResult};
use crate::oracle::candles::vwap;
use crate::oracle::sources::{decode, sample, Frame, StreamingVenue, Subscribe};
use crate::types::Venue;

const HUOBI_WS_URL: &str = "wss://api.huobi.pro/ws";
const CLIENT_ID: &str = "oracle-feeder";

#[derive(Debug, Clone)]
pub struct HuobiVenue {
    url: String,
}

impl HuobiVenue {
    pub fn new() -> Self {
        Self::with_url(HUOBI_WS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for HuobiVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct Message {
    ping: Option<u64>,
    status: Option<String>,
    #[serde(rename = "err-msg")]
    err_msg: Option<String>,
    ch: Option<String>,
    ts: Option<u64>,
    tick: Option<Tick>,
}

#[derive(Debug, Deserialize)]
struct Tick {
    open: f64,
    close: f64,
    /// Base volume
    amount: f64,
    /// Quote volume
    vol: f64,
}

/// `market.btcusdt.kline.1min` → `btcusdt`
fn channel_symbol(ch: &str) -> FeedResult<&str> {
    let parts: Vec<&str> = ch.split('.').collect();
    match parts.as_slice() {
        ["market", symbol, "kline", _] if !symbol.is_empty() => Ok(*symbol),
        _ => Err(FeedError::parse(Venue::Huobi, format!("unexpected channel {}", ch))),
    }
}

#[async_trait]
impl StreamingVenue for HuobiVenue {
    type Session = ();

    fn venue(&self) -> Venue {
        Venue::Huobi
    }

    async fn endpoint(&self) -> FeedResult<String> {
        Ok(self.url.clone())
    }

    fn subscriptions(&self, symbols: &[String]) -> Vec<Subscribe> {
        symbols
            .iter()
            .map(|s| {
                let command = json!({
                    "sub": format!("market.{}.kline.1min", s.to_lowercase()),
                    "id": CLIENT_ID,
                });
                Subscribe::new(command.to_string(), 1)
            })
            .collect()
    }

    fn decode_binary(&self, data: &[u8]) -> FeedResult<Option<String>> {
        let mut text = String::new();
        GzDecoder::new(data)
            .read_to_string(&mut text)
            .map_err(|e| FeedError::parse(Venue::Huobi, format!("gzip: {}", e)))?;
        Ok(Some(text))
    }

    fn parse_frame(&self, _session: &mut (), text: &str) -> FeedResult<Frame> {
        let msg: Message = decode(Venue::Huobi, text)?;

        if let Some(ping) = msg.ping {
            return Ok(Frame::Reply(json!({ "pong": ping }).to_string()));
        }
        if let Some(status) = msg.status.as_deref() {
            return Ok(match status {
                "ok" => Frame::Ack,
                _ => Frame::Rejected(msg.err_msg.unwrap_or_else(|| text.to_string())),
            });
        }
        let Some(ch) = msg.ch.as_deref() else {
            tracing::debug!(venue = %Venue::Huobi, frame = %text, "Unrecognized frame");
            return Ok(Frame::Ignored);
        };

        let symbol = channel_symbol(ch)?;
        let tick = msg
            .tick
            .ok_or_else(|| FeedError::parse(Venue::Huobi, "kline frame without tick"))?;
        let ts = msg
            .ts
            .ok_or_else(|| FeedError::parse(Venue::Huobi, "kline frame without ts"))?;
        let price = vwap(tick.open, tick.close, tick.amount, tick.vol);
        Ok(Frame::sample(sample(Venue::Huobi, symbol, price, ts)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_gzip_frame_decodes() {
        let text = r#"{"ping":1492420473027}"#;
        let decoded = HuobiVenue::new().decode_binary(&gzip(text)).unwrap();
        assert_eq!(decoded.as_deref(), Some(text));
    }

    #[test]
    fn test_corrupt_gzip_is_parse_error() {
        let result = HuobiVenue::new().decode_binary(b"not gzip");
        assert!(matches!(result, Err(FeedError::Parse { venue: Venue::Huobi, .. })));
    }

    #[test]
    fn test_ping_answered_with_pong() {
        let frame = HuobiVenue::new().parse_frame(&mut (), r#"{"ping":1492420473027}"#).unwrap();
        let Frame::Reply(payload) = frame else {
            panic!("expected reply");
        };
        let pong: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(pong, json!({ "pong": 1492420473027u64 }));
    }

    #[test]
    fn test_status_replies() {
        let venue = HuobiVenue::new();
        assert_eq!(
            venue
                .parse_frame(&mut (), r#"{"id":"oracle-feeder","status":"ok","subbed":"market.btcusdt.kline.1min","ts":1}"#)
                .unwrap(),
            Frame::Ack
        );
        assert_eq!(
            venue
                .parse_frame(&mut (), r#"{"status":"error","err-code":"bad-request","err-msg":"invalid topic market.x.kline.1min","ts":1}"#)
                .unwrap(),
            Frame::Rejected("invalid topic market.x.kline.1min".to_string())
        );
    }

    #[test]
    fn test_kline_frame() {
        let text = r#"{"ch":"market.btcusdt.kline.1min","ts":1700000000123,
            "tick":{"id":1700000000,"open":100.0,"close":104.0,"low":99.0,"high":105.0,"amount":2.0,"vol":204.0,"count":12}}"#;
        let frame = HuobiVenue::new().parse_frame(&mut (), text).unwrap();
        let Frame::Samples(samples) = frame else {
            panic!("expected samples");
        };
        assert_eq!(samples[0].pair.key(), "BTC/USDT");
        assert_eq!(samples[0].symbol, "btcusdt");
        assert_eq!(samples[0].price, 102.0);
        assert_eq!(samples[0].observed_at_ms, 1_700_000_000_123);
    }

    #[test]
    fn test_bad_channel_and_unknown_frames() {
        let venue = HuobiVenue::new();
        assert!(venue
            .parse_frame(&mut (), r#"{"ch":"market.btcusdt","ts":1,"tick":{"open":1,"close":1,"amount":1,"vol":1}}"#)
            .is_err());
        assert_eq!(venue.parse_frame(&mut (), r#"{"id":"x","rep":"market.btcusdt.detail"}"#).unwrap(), Frame::Ignored);
    }

    #[test]
    fn test_one_subscribe_per_symbol() {
        let subs = HuobiVenue::new().subscriptions(&["BTCUSDT".into(), "ethusdt".into()]);
        assert_eq!(subs.len(), 2);
        let cmd: serde_json::Value = serde_json::from_str(&subs[0].payload).unwrap();
        assert_eq!(cmd["sub"], "market.btcusdt.kline.1min");
        assert_eq!(subs[1].acks, 1);
    }
}
