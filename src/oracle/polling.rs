//! Polled adapter
//!
//! Runs a `RestVenue` on a fixed interval and merges whatever each tick
//! parsed into the venue cache. A failed tick leaves the cache as it was.

use futures_util::{stream, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::error::{FeedError, FeedResult};
use crate::oracle::cache::VenueCache;
use crate::oracle::provider::PriceProvider;
use crate::oracle::sources::RestVenue;
use crate::shutdown::ShutdownSignal;
use crate::types::{PairPrice, PriceSample, Venue};

/// Timer-driven REST adapter
pub struct PolledProvider {
    venue: Venue,
    cache: Arc<VenueCache>,
}

impl PolledProvider {
    /// Fetch once, then keep polling every `interval` until shutdown
    pub async fn start<V: RestVenue>(
        venue: V,
        http: reqwest::Client,
        symbols: Vec<String>,
        interval: Duration,
        mut shutdown: ShutdownSignal,
    ) -> Self {
        let id = venue.venue();
        let cache = Arc::new(VenueCache::new());

        poll_once(&venue, &http, &symbols, &cache).await;

        let task_cache = Arc::clone(&cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately and the initial fetch already ran.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!(venue = %id, "Poller stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        poll_once(&venue, &http, &symbols, &task_cache).await;
                    }
                }
            }
        });

        Self { venue: id, cache }
    }
}

impl PriceProvider for PolledProvider {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn get_prices(&self) -> HashMap<String, PairPrice> {
        self.cache.pair_prices()
    }
}

/// One fetch-and-parse tick. Returns how many samples were merged.
pub async fn poll_once<V: RestVenue + ?Sized>(
    venue: &V,
    http: &reqwest::Client,
    symbols: &[String],
    cache: &VenueCache,
) -> usize {
    match venue.fetch_and_parse(http, symbols).await {
        Ok(samples) => {
            let merged = cache.merge(samples);
            tracing::debug!(venue = %venue.venue(), merged, "Poll tick merged");
            merged
        }
        Err(e) => {
            tracing::warn!(venue = %venue.venue(), error = %e, "Poll tick failed, keeping cached prices");
            0
        }
    }
}

/// Fetch every symbol with at most `workers` requests in flight
///
/// A failing symbol is logged and skipped. Errors only when nothing came back.
pub async fn fetch_each<'a, F, Fut>(
    venue: Venue,
    symbols: &'a [String],
    workers: usize,
    fetch: F,
) -> FeedResult<Vec<PriceSample>>
where
    F: Fn(&'a str) -> Fut,
    Fut: Future<Output = FeedResult<PriceSample>>,
{
    let requests: Vec<_> = symbols
        .iter()
        .map(|symbol| {
            let request = fetch(symbol.as_str());
            async move { (symbol.as_str(), request.await) }
        })
        .collect();
    let results: Vec<(&str, FeedResult<PriceSample>)> = stream::iter(requests)
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

    let mut samples = Vec::with_capacity(results.len());
    for (symbol, result) in results {
        match result {
            Ok(sample) => samples.push(sample),
            Err(FeedError::Normalization(e)) => {
                tracing::warn!(venue = %venue, symbol = %symbol, error = %e, "Dropping unnormalizable symbol");
            }
            Err(e) => {
                tracing::warn!(venue = %venue, symbol = %symbol, error = %e, "Symbol fetch failed");
            }
        }
    }

    if samples.is_empty() && !symbols.is_empty() {
        return Err(FeedError::EmptyResponse { venue });
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::sources::MockRestVenue;
    use crate::types::CurrencyPair;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample(symbol: &str, price: f64) -> PriceSample {
        PriceSample::new(Venue::Bitstamp, symbol, CurrencyPair::new("BTC", "USD"), price, 1)
    }

    #[tokio::test]
    async fn test_failed_tick_keeps_previous_prices() {
        let mut venue = MockRestVenue::new();
        venue.expect_venue().return_const(Venue::Bitstamp);
        let mut seq = mockall::Sequence::new();
        venue
            .expect_fetch_and_parse()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(vec![sample("btcusd", 100.0)]));
        venue
            .expect_fetch_and_parse()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(FeedError::EmptyResponse { venue: Venue::Bitstamp }));

        let http = reqwest::Client::new();
        let cache = VenueCache::new();
        let symbols = vec!["btcusd".to_string()];

        assert_eq!(poll_once(&venue, &http, &symbols, &cache).await, 1);
        assert_eq!(poll_once(&venue, &http, &symbols, &cache).await, 0);

        let prices = cache.pair_prices();
        assert_eq!(prices["BTC/USD"].price, 100.0);
    }

    #[tokio::test]
    async fn test_start_fetches_before_returning() {
        let mut venue = MockRestVenue::new();
        venue.expect_venue().return_const(Venue::Bitstamp);
        venue
            .expect_fetch_and_parse()
            .returning(|_, _| Ok(vec![sample("btcusd", 50.0)]));

        let (shutdown, signal) = crate::shutdown::Shutdown::new();
        let provider = PolledProvider::start(
            venue,
            reqwest::Client::new(),
            vec!["btcusd".to_string()],
            Duration::from_secs(3600),
            signal,
        )
        .await;

        assert_eq!(provider.venue(), Venue::Bitstamp);
        assert_eq!(provider.get_prices()["BTC/USD"].price, 50.0);
        shutdown.trigger();
    }

    #[tokio::test]
    async fn test_shutdown_stops_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut venue = MockRestVenue::new();
        venue.expect_venue().return_const(Venue::Bitstamp);
        venue.expect_fetch_and_parse().returning(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![sample("btcusd", 50.0)])
        });

        let (shutdown, signal) = crate::shutdown::Shutdown::new();
        let _provider = PolledProvider::start(
            venue,
            reqwest::Client::new(),
            vec!["btcusd".to_string()],
            Duration::from_millis(10),
            signal,
        )
        .await;

        while calls.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.trigger();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let stopped_at = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), stopped_at);
    }

    #[tokio::test]
    async fn test_fetch_each_isolates_failures_and_bounds_concurrency() {
        let symbols: Vec<String> = (0..40).map(|i| format!("s{}", i)).collect();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let samples = fetch_each(Venue::Bitstamp, &symbols, 4, |symbol| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let symbol = symbol.to_string();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                if symbol == "s7" {
                    Err(FeedError::parse(Venue::Bitstamp, "bad body"))
                } else {
                    Ok(sample(&symbol, 1.0))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(samples.len(), 39);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_fetch_each_all_failed() {
        let symbols = vec!["a".to_string()];
        let result = fetch_each(Venue::Bittrex, &symbols, 16, |_| async {
            Err(FeedError::parse(Venue::Bittrex, "down"))
        })
        .await;
        assert!(matches!(result, Err(FeedError::EmptyResponse { venue: Venue::Bittrex })));
    }
}
