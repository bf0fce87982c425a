//! KuCoin WebSocket venue
//!
//! Every connection starts with a REST call for a public token and server
//! endpoint. The server greets with a `welcome` message before anything
//! may be sent.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{FeedError, FeedResult};
use crate::oracle::candles::vwap;
use crate::oracle::sources::{batches, decode, num, sample, Frame, StreamingVenue, Subscribe};
use crate::types::Venue;

const KUCOIN_TOKEN_URL: &str = "https://openapi-v2.kucoin.com/api/v1/bullet-public";
const KUCOIN_OK: &str = "200000";
const CLIENT_ID: &str = "oracle-feeder";
const TOPICS_PER_REQUEST: usize = 100;
const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct KucoinVenue {
    http: reqwest::Client,
    token_url: String,
    /// Skip the token call and connect here directly
    ws_override: Option<String>,
    ping_interval: Duration,
}

impl KucoinVenue {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            token_url: KUCOIN_TOKEN_URL.to_string(),
            ws_override: None,
            ping_interval: PING_INTERVAL,
        }
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: KUCOIN_TOKEN_URL.to_string(),
            ws_override: Some(url.into()),
            ping_interval: PING_INTERVAL,
        }
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    async fn fetch_token(&self) -> FeedResult<(String, String)> {
        let response = self
            .http
            .post(&self.token_url)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| FeedError::http(Venue::Kucoin, e))?;

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| FeedError::http(Venue::Kucoin, e))?;
        parse_token(body)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenData {
    token: String,
    instance_servers: Vec<InstanceServer>,
}

#[derive(Debug, Deserialize)]
struct InstanceServer {
    endpoint: String,
}

fn parse_token(body: TokenResponse) -> FeedResult<(String, String)> {
    if body.code != KUCOIN_OK {
        return Err(FeedError::Connect {
            venue: Venue::Kucoin,
            reason: format!("token request failed: {} {}", body.code, body.msg.unwrap_or_default()),
        });
    }
    let data = body.data.ok_or_else(|| FeedError::parse(Venue::Kucoin, "token response without data"))?;
    let server = data
        .instance_servers
        .into_iter()
        .next()
        .ok_or_else(|| FeedError::parse(Venue::Kucoin, "token response without instance servers"))?;
    Ok((server.endpoint, data.token))
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CandleData {
    symbol: String,
    /// [start, open, close, high, low, volume, turnover]
    candles: Vec<String>,
    /// Microseconds
    time: u64,
}

#[async_trait]
impl StreamingVenue for KucoinVenue {
    type Session = ();

    fn venue(&self) -> Venue {
        Venue::Kucoin
    }

    async fn endpoint(&self) -> FeedResult<String> {
        let connect_id = Uuid::new_v4();
        if let Some(url) = &self.ws_override {
            return Ok(format!("{}?connectId={}", url, connect_id));
        }
        let (endpoint, token) = self.fetch_token().await?;
        Ok(format!("{}?token={}&connectId={}", endpoint, token, connect_id))
    }

    fn expects_hello(&self) -> bool {
        true
    }

    fn check_hello(&self, text: &str) -> FeedResult<()> {
        let hello: Envelope = decode(Venue::Kucoin, text)?;
        if hello.kind == "welcome" {
            Ok(())
        } else {
            Err(FeedError::Handshake {
                venue: Venue::Kucoin,
                reason: text.to_string(),
            })
        }
    }

    fn subscriptions(&self, symbols: &[String]) -> Vec<Subscribe> {
        batches(symbols, TOPICS_PER_REQUEST)
            .map(|group| {
                let topics: Vec<String> = group.iter().map(|s| format!("{}_1min", s)).collect();
                let command = json!({
                    "id": CLIENT_ID,
                    "type": "subscribe",
                    "topic": format!("/market/candles:{}", topics.join(",")),
                    "privateChannel": false,
                    "response": true,
                });
                Subscribe::new(command.to_string(), 1)
            })
            .collect()
    }

    fn keepalive(&self) -> Option<(Duration, String)> {
        Some((
            self.ping_interval,
            json!({ "id": CLIENT_ID, "type": "ping" }).to_string(),
        ))
    }

    fn parse_frame(&self, _session: &mut (), text: &str) -> FeedResult<Frame> {
        let envelope: Envelope = decode(Venue::Kucoin, text)?;
        match envelope.kind.as_str() {
            "ack" => Ok(Frame::Ack),
            "pong" | "welcome" => Ok(Frame::Heartbeat),
            "error" => Ok(Frame::Rejected(text.to_string())),
            "message" => {
                let data = envelope
                    .data
                    .ok_or_else(|| FeedError::parse(Venue::Kucoin, "message without data"))?;
                let candle: CandleData = serde_json::from_value(data)
                    .map_err(|e| FeedError::parse(Venue::Kucoin, e.to_string()))?;
                if candle.candles.len() != 7 {
                    return Err(FeedError::parse(
                        Venue::Kucoin,
                        format!("expected 7 candle fields, got {}", candle.candles.len()),
                    ));
                }
                let c = &candle.candles;
                let price = vwap(
                    num(Venue::Kucoin, "open", &c[1])?,
                    num(Venue::Kucoin, "close", &c[2])?,
                    num(Venue::Kucoin, "volume", &c[5])?,
                    num(Venue::Kucoin, "turnover", &c[6])?,
                );
                Ok(Frame::sample(sample(
                    Venue::Kucoin,
                    &candle.symbol,
                    price,
                    candle.time / 1_000,
                )?))
            }
            _ => {
                tracing::debug!(venue = %Venue::Kucoin, frame = %text, "Unrecognized frame");
                Ok(Frame::Ignored)
            }
        }
    }
}
