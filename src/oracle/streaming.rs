//! Streaming adapter
//!
//! Drives a `StreamingVenue` through
//! `Disconnected → Connecting → HandshakeWait → Subscribed → Streaming`.
//! The first connection happens inside `StreamingProvider::start` and its
//! failure is returned to the caller. After that a supervisor task
//! reconnects after a constant delay for as long as the process runs.

use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::error::{FeedError, FeedResult};
use crate::oracle::cache::VenueCache;
use crate::oracle::provider::PriceProvider;
use crate::oracle::sources::{Frame, StreamingVenue};
use crate::shutdown::ShutdownSignal;
use crate::types::{PairPrice, Venue};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    HandshakeWait,
    Subscribed,
    Streaming,
}

/// Why a streaming session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// Shutdown was requested; do not reconnect
    Shutdown,
    /// Connection lost or broken; reconnect after the delay
    Retry(FeedError),
}

#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub reconnect_delay: Duration,
    pub ack_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(3000),
            ack_timeout: Duration::from_millis(10000),
        }
    }
}

/// Long-lived WebSocket adapter
pub struct StreamingProvider {
    venue: Venue,
    cache: Arc<VenueCache>,
    state: watch::Receiver<StreamState>,
}

impl StreamingProvider {
    /// Connect, handshake and subscribe, then hand the connection to a
    /// background supervisor
    pub async fn start<V: StreamingVenue>(
        venue: V,
        symbols: Vec<String>,
        settings: StreamSettings,
        shutdown: ShutdownSignal,
    ) -> FeedResult<Self> {
        let id = venue.venue();
        let cache = Arc::new(VenueCache::new());
        let (state_tx, state_rx) = watch::channel(StreamState::Disconnected);

        let runner = Runner {
            venue,
            symbols,
            settings,
            cache: Arc::clone(&cache),
            state: state_tx,
        };

        let mut session = V::Session::default();
        let ws = runner.establish(&mut session).await.map_err(|e| {
            runner.set_state(StreamState::Disconnected);
            e
        })?;

        tokio::spawn(runner.supervise(ws, session, shutdown));

        Ok(Self {
            venue: id,
            cache,
            state: state_rx,
        })
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }
}

impl PriceProvider for StreamingProvider {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn get_prices(&self) -> HashMap<String, PairPrice> {
        self.cache.pair_prices()
    }
}

struct Runner<V: StreamingVenue> {
    venue: V,
    symbols: Vec<String>,
    settings: StreamSettings,
    cache: Arc<VenueCache>,
    state: watch::Sender<StreamState>,
}

impl<V: StreamingVenue> Runner<V> {
    fn id(&self) -> Venue {
        self.venue.venue()
    }

    fn set_state(&self, next: StreamState) {
        let prev = *self.state.borrow();
        if prev != next {
            tracing::debug!(venue = %self.id(), from = ?prev, to = ?next, "Stream state");
            self.state.send_replace(next);
        }
    }

    /// Connecting → HandshakeWait → Subscribed
    async fn establish(&self, session: &mut V::Session) -> FeedResult<WsStream> {
        let venue = self.id();

        self.set_state(StreamState::Connecting);
        let url = self.venue.endpoint().await?;
        tracing::info!(
            venue = %venue,
            url = %url.split('?').next().unwrap_or(url.as_str()),
            "Connecting to WebSocket..."
        );

        let (mut ws, _) = tokio::time::timeout(self.settings.ack_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| FeedError::Connect {
                venue,
                reason: "connect timed out".to_string(),
            })?
            .map_err(|e| FeedError::Connect {
                venue,
                reason: e.to_string(),
            })?;

        self.set_state(StreamState::HandshakeWait);
        if self.venue.expects_hello() {
            let hello = self.next_text(&mut ws, "handshake").await?;
            self.venue.check_hello(&hello)?;
        }

        for command in self.venue.subscriptions(&self.symbols) {
            ws.send(Message::Text(command.payload))
                .await
                .map_err(|e| FeedError::ws(venue, e))?;

            let mut acked = 0;
            while acked < command.acks {
                let text = self.next_text(&mut ws, "subscribe").await?;
                match self.apply(session, &text) {
                    Some(Frame::Ack) => acked += 1,
                    Some(Frame::Rejected(reason)) => {
                        return Err(FeedError::Rejected { venue, reason });
                    }
                    Some(Frame::Reply(payload)) => {
                        ws.send(Message::Text(payload))
                            .await
                            .map_err(|e| FeedError::ws(venue, e))?;
                    }
                    _ => {}
                }
            }
        }
        self.set_state(StreamState::Subscribed);

        tracing::info!(venue = %venue, symbols = self.symbols.len(), "✅ Subscribed");
        Ok(ws)
    }

    /// Next text frame during setup, answering pings on the way
    async fn next_text(&self, ws: &mut WsStream, stage: &'static str) -> FeedResult<String> {
        let venue = self.id();
        let deadline = Instant::now() + self.settings.ack_timeout;
        loop {
            let msg = match tokio::time::timeout_at(deadline, ws.next()).await {
                Ok(msg) => msg,
                Err(_) if stage == "handshake" => {
                    return Err(FeedError::Handshake {
                        venue,
                        reason: "timed out waiting for server hello".to_string(),
                    })
                }
                Err(_) => return Err(FeedError::AckTimeout { venue }),
            };
            match msg {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(data))) => {
                    if let Some(text) = self.venue.decode_binary(&data)? {
                        return Ok(text);
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    ws.send(Message::Pong(data))
                        .await
                        .map_err(|e| FeedError::ws(venue, e))?;
                }
                Some(Ok(Message::Close(_))) | None => return Err(FeedError::Closed { venue, stage }),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(FeedError::ws(venue, e)),
            }
        }
    }

    /// Parse one frame and write any samples to the cache
    fn apply(&self, session: &mut V::Session, text: &str) -> Option<Frame> {
        match self.venue.parse_frame(session, text) {
            Ok(Frame::Samples(samples)) => {
                self.cache.merge(samples);
                Some(Frame::Samples(Vec::new()))
            }
            Ok(Frame::Rejected(reason)) => {
                tracing::warn!(venue = %self.id(), reason = %reason, "Venue rejected request");
                Some(Frame::Rejected(reason))
            }
            Ok(frame) => Some(frame),
            Err(FeedError::Normalization(e)) => {
                tracing::warn!(venue = %self.id(), symbol = %e.symbol, error = %e, "Dropping unnormalizable symbol");
                None
            }
            Err(e) => {
                tracing::warn!(venue = %self.id(), error = %e, "Failed to parse message");
                None
            }
        }
    }

    /// Streaming until the connection breaks or shutdown fires
    async fn stream(
        &self,
        ws: WsStream,
        mut session: V::Session,
        shutdown: &mut ShutdownSignal,
    ) -> SessionEnd {
        let venue = self.id();
        let (mut write, mut read) = ws.split();
        let mut keepalive = self.venue.keepalive().map(|(period, payload)| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            (ticker, payload)
        });

        self.set_state(StreamState::Streaming);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    let _ = write.send(Message::Close(None)).await;
                    tracing::info!(venue = %venue, "Stream stopped");
                    return SessionEnd::Shutdown;
                }
                payload = next_keepalive(&mut keepalive) => {
                    if let Err(e) = write.send(Message::Text(payload)).await {
                        return SessionEnd::Retry(FeedError::ws(venue, e));
                    }
                }
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Binary(data))) => match self.venue.decode_binary(&data) {
                            Ok(Some(text)) => text,
                            Ok(None) => continue,
                            Err(e) => {
                                tracing::warn!(venue = %venue, error = %e, "Failed to decode binary frame");
                                continue;
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return SessionEnd::Retry(FeedError::ws(venue, e));
                            }
                            continue;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return SessionEnd::Retry(FeedError::Closed { venue, stage: "streaming" });
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            return SessionEnd::Retry(FeedError::ws(venue, e));
                        }
                    };
                    if let Some(Frame::Reply(payload)) = self.apply(&mut session, &text) {
                        if let Err(e) = write.send(Message::Text(payload)).await {
                            return SessionEnd::Retry(FeedError::ws(venue, e));
                        }
                    }
                }
            }
        }
    }

    /// Outer reconnect loop
    async fn supervise(self, ws: WsStream, session: V::Session, mut shutdown: ShutdownSignal) {
        let venue = self.id();
        let mut current = Some((ws, session));

        loop {
            let (ws, session) = match current.take() {
                Some(connection) => connection,
                None => {
                    self.set_state(StreamState::Disconnected);
                    tokio::select! {
                        _ = shutdown.recv() => return,
                        _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
                    }

                    let mut session = V::Session::default();
                    let attempt = tokio::select! {
                        _ = shutdown.recv() => return,
                        attempt = self.establish(&mut session) => attempt,
                    };
                    match attempt {
                        Ok(ws) => (ws, session),
                        Err(e) => {
                            tracing::warn!(
                                venue = %venue,
                                error = %e,
                                delay_ms = self.settings.reconnect_delay.as_millis() as u64,
                                "Reconnect failed, retrying"
                            );
                            continue;
                        }
                    }
                }
            };

            match self.stream(ws, session, &mut shutdown).await {
                SessionEnd::Shutdown => {
                    self.set_state(StreamState::Disconnected);
                    return;
                }
                SessionEnd::Retry(e) => {
                    tracing::warn!(
                        venue = %venue,
                        error = %e,
                        delay_ms = self.settings.reconnect_delay.as_millis() as u64,
                        "🔄 Connection lost, reconnecting"
                    );
                }
            }
        }
    }
}

async fn next_keepalive(keepalive: &mut Option<(Interval, String)>) -> String {
    match keepalive {
        Some((ticker, payload)) => {
            ticker.tick().await;
            payload.clone()
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::sources::{BinanceVenue, HuobiVenue, KucoinVenue};
    use crate::shutdown::Shutdown;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn settings() -> StreamSettings {
        StreamSettings {
            reconnect_delay: Duration::from_millis(20),
            ack_timeout: Duration::from_millis(500),
        }
    }

    fn closed_kline(close: &str) -> String {
        json!({
            "stream": "btcusdt@kline_1m",
            "data": {
                "e": "kline",
                "s": "BTCUSDT",
                "k": {
                    "s": "BTCUSDT",
                    "T": 1_700_000_000_000u64,
                    "o": close,
                    "c": close,
                    "v": "0",
                    "q": "0",
                    "x": true
                }
            }
        })
        .to_string()
    }

    async fn wait_for_price(provider: &StreamingProvider, expected: f64) {
        for _ in 0..200 {
            if provider.get_prices().get("BTC/USDT").map(|p| p.price) == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("price {} never arrived", expected);
    }

    /// Accept one client, ack its subscribe, then send the given frames
    async fn serve_once(listener: &TcpListener, frames: Vec<String>, hold_open: bool) {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        let Some(Ok(Message::Text(sub))) = ws.next().await else {
            panic!("expected subscribe command");
        };
        let sub: serde_json::Value = serde_json::from_str(&sub).unwrap();
        assert_eq!(sub["method"], "SUBSCRIBE");
        ws.send(Message::Text(json!({ "result": null, "id": sub["id"] }).to_string()))
            .await
            .unwrap();
        for frame in frames {
            ws.send(Message::Text(frame)).await.unwrap();
        }
        if hold_open {
            while let Some(Ok(_)) = ws.next().await {}
        } else {
            let _ = ws.close(None).await;
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            serve_once(&listener, vec![closed_kline("101.5")], true).await;
        });

        let (shutdown, signal) = Shutdown::new();
        let provider = StreamingProvider::start(
            BinanceVenue::with_url(url),
            vec!["BTCUSDT".to_string()],
            settings(),
            signal,
        )
        .await
        .unwrap();

        wait_for_price(&provider, 101.5).await;
        assert_eq!(provider.state(), StreamState::Streaming);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server should see the close frame")
            .unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            serve_once(&listener, vec![closed_kline("100")], false).await;
            serve_once(&listener, vec![closed_kline("200")], true).await;
        });

        let (shutdown, signal) = Shutdown::new();
        let provider = StreamingProvider::start(
            BinanceVenue::with_url(url),
            vec!["BTCUSDT".to_string()],
            settings(),
            signal,
        )
        .await
        .unwrap();

        wait_for_price(&provider, 200.0).await;
        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_rejected_subscription_is_fatal_on_start() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let _ = ws.next().await;
            let reply = json!({ "error": { "code": 2, "msg": "Invalid request" }, "id": 9527 });
            ws.send(Message::Text(reply.to_string())).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (_shutdown, signal) = Shutdown::new();
        let result = StreamingProvider::start(
            BinanceVenue::with_url(url),
            vec!["BTCUSDT".to_string()],
            settings(),
            signal,
        )
        .await;
        assert!(matches!(result, Err(FeedError::Rejected { venue: Venue::Binance, .. })));
    }

    #[tokio::test]
    async fn test_missing_ack_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (_shutdown, signal) = Shutdown::new();
        let result = StreamingProvider::start(
            BinanceVenue::with_url(url),
            vec!["BTCUSDT".to_string()],
            settings(),
            signal,
        )
        .await;
        assert!(matches!(result, Err(FeedError::AckTimeout { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_fatal_on_start() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let (_shutdown, signal) = Shutdown::new();
        let result = StreamingProvider::start(
            BinanceVenue::with_url(format!("ws://127.0.0.1:{}", port)),
            vec!["BTCUSDT".to_string()],
            settings(),
            signal,
        )
        .await;
        assert!(matches!(result, Err(FeedError::Connect { .. })));
    }

    fn kucoin_candle() -> String {
        json!({
            "type": "message",
            "topic": "/market/candles:BTC-USDT_1min",
            "subject": "trade.candles.update",
            "data": {
                "symbol": "BTC-USDT",
                "candles": ["1700000000", "100", "102", "103", "99", "2", "202"],
                "time": 1_700_000_000_000_000u64
            }
        })
        .to_string()
    }

    /// Accept one KuCoin client: greet, ack its subscribe, send a candle
    async fn accept_kucoin(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        ws.send(Message::Text(json!({ "id": "hello", "type": "welcome" }).to_string()))
            .await
            .unwrap();
        let Some(Ok(Message::Text(sub))) = ws.next().await else {
            panic!("expected subscribe command");
        };
        let sub: serde_json::Value = serde_json::from_str(&sub).unwrap();
        assert_eq!(sub["type"], "subscribe");
        assert_eq!(sub["topic"], "/market/candles:BTC-USDT_1min");
        ws.send(Message::Text(json!({ "id": sub["id"], "type": "ack" }).to_string()))
            .await
            .unwrap();
        ws.send(Message::Text(kucoin_candle())).await.unwrap();
        ws
    }

    #[tokio::test]
    async fn test_kucoin_welcome_subscribe_and_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut ws = accept_kucoin(&listener).await;
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (shutdown, signal) = Shutdown::new();
        let provider = StreamingProvider::start(
            KucoinVenue::with_url(url),
            vec!["BTC-USDT".to_string()],
            settings(),
            signal,
        )
        .await
        .unwrap();

        wait_for_price(&provider, 101.0).await;
        assert_eq!(provider.get_prices()["BTC/USDT"].observed_at_ms, 1_700_000_000_000);
        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_kucoin_bad_hello_is_handshake_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let reply = json!({ "id": "hello", "type": "error", "code": 401, "data": "token is invalid" });
            ws.send(Message::Text(reply.to_string())).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (_shutdown, signal) = Shutdown::new();
        let result = StreamingProvider::start(
            KucoinVenue::with_url(url),
            vec!["BTC-USDT".to_string()],
            settings(),
            signal,
        )
        .await;
        assert!(matches!(result, Err(FeedError::Handshake { venue: Venue::Kucoin, .. })));
    }

    #[tokio::test]
    async fn test_kucoin_pong_echoes_ping_and_keepalive_is_sent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let mut ws = accept_kucoin(&listener).await;
            ws.send(Message::Ping(vec![7, 7])).await.unwrap();

            let (mut pong, mut keepalive) = (false, false);
            while !(pong && keepalive) {
                match ws.next().await {
                    Some(Ok(Message::Pong(data))) => {
                        assert_eq!(data, vec![7, 7]);
                        pong = true;
                    }
                    Some(Ok(Message::Text(text))) => {
                        let cmd: serde_json::Value = serde_json::from_str(&text).unwrap();
                        if cmd["type"] == "ping" {
                            keepalive = true;
                        }
                    }
                    Some(Ok(_)) => {}
                    _ => panic!("client went away"),
                }
            }
        });

        let (shutdown, signal) = Shutdown::new();
        let provider = StreamingProvider::start(
            KucoinVenue::with_url(url).with_ping_interval(Duration::from_millis(50)),
            vec!["BTC-USDT".to_string()],
            settings(),
            signal,
        )
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server should see a pong and a keepalive")
            .unwrap();
        assert_eq!(provider.state(), StreamState::Streaming);
        shutdown.trigger();
    }

    fn gzip(value: serde_json::Value) -> Message {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(value.to_string().as_bytes()).unwrap();
        Message::Binary(encoder.finish().unwrap())
    }

    #[tokio::test]
    async fn test_huobi_gzip_frames_and_pong_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let Some(Ok(Message::Text(sub))) = ws.next().await else {
                panic!("expected subscribe command");
            };
            let sub: serde_json::Value = serde_json::from_str(&sub).unwrap();
            assert_eq!(sub["sub"], "market.btcusdt.kline.1min");

            ws.send(gzip(json!({ "ping": 41 }))).await.unwrap();
            let Some(Ok(Message::Text(pong))) = ws.next().await else {
                panic!("expected pong during subscribe");
            };
            assert_eq!(serde_json::from_str::<serde_json::Value>(&pong).unwrap(), json!({ "pong": 41 }));

            ws.send(gzip(json!({ "id": sub["id"], "status": "ok", "subbed": sub["sub"], "ts": 1 })))
                .await
                .unwrap();
            ws.send(gzip(json!({
                "ch": "market.btcusdt.kline.1min",
                "ts": 1_700_000_000_123u64,
                "tick": { "id": 1, "open": 100.0, "close": 104.0, "low": 99.0, "high": 105.0, "amount": 2.0, "vol": 204.0 }
            })))
            .await
            .unwrap();

            ws.send(gzip(json!({ "ping": 42 }))).await.unwrap();
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(pong))) => {
                        let pong: serde_json::Value = serde_json::from_str(&pong).unwrap();
                        assert_eq!(pong, json!({ "pong": 42 }));
                        break;
                    }
                    Some(Ok(_)) => {}
                    _ => panic!("client went away"),
                }
            }
            ws
        });

        let (shutdown, signal) = Shutdown::new();
        let provider = StreamingProvider::start(
            HuobiVenue::with_url(url),
            vec!["btcusdt".to_string()],
            settings(),
            signal,
        )
        .await
        .unwrap();

        wait_for_price(&provider, 102.0).await;
        let _ws = tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server should see the streaming pong")
            .unwrap();
        shutdown.trigger();
    }
}
