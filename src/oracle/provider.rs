//! Provider construction
//!
//! Every adapter exposes the same read path, `PriceProvider`. Which adapter
//! backs a venue is decided here from the venue's family.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::{AppConfig, ProviderConfig};
use crate::error::{FeedError, FeedResult};
use crate::oracle::polling::PolledProvider;
use crate::oracle::pools::PoolProvider;
use crate::oracle::sources::{
    BinanceVenue, BitfinexVenue, BitstampVenue, BittrexVenue, BybitVenue, CoinbaseVenue,
    CoingeckoVenue, FerVenue, HuobiVenue, KrakenVenue, KucoinVenue, OkxVenue,
};
use crate::oracle::streaming::{StreamSettings, StreamingProvider};
use crate::shutdown::ShutdownSignal;
use crate::types::{PairPrice, Venue};

/// Read side of a venue adapter
pub trait PriceProvider: Send + Sync {
    fn venue(&self) -> Venue;

    /// Latest price per canonical pair. Never blocks on I/O.
    fn get_prices(&self) -> HashMap<String, PairPrice>;
}

/// Build and start the adapter for one venue
///
/// Streaming venues connect before this returns; polled and pool venues have
/// run their first tick.
pub async fn build_provider(
    venue: Venue,
    settings: &ProviderConfig,
    config: &AppConfig,
    shutdown: ShutdownSignal,
) -> FeedResult<Box<dyn PriceProvider>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout))
        .build()
        .map_err(|e| FeedError::http(venue, e))?;

    let symbols = settings.symbols.clone();
    let interval = Duration::from_secs(settings.interval);
    let workers = config.oracle.fetch_workers;
    let stream = StreamSettings {
        reconnect_delay: config.reconnect_delay(),
        ack_timeout: config.ack_timeout(),
    };

    tracing::info!(venue = %venue, family = ?venue.family(), symbols = symbols.len(), "Starting provider");

    let provider: Box<dyn PriceProvider> = match venue {
        Venue::Binance => {
            Box::new(StreamingProvider::start(BinanceVenue::new(), symbols, stream, shutdown).await?)
        }
        Venue::Bybit => {
            Box::new(StreamingProvider::start(BybitVenue::new(), symbols, stream, shutdown).await?)
        }
        Venue::Okx => {
            Box::new(StreamingProvider::start(OkxVenue::new(), symbols, stream, shutdown).await?)
        }
        Venue::Kucoin => Box::new(
            StreamingProvider::start(KucoinVenue::new(http), symbols, stream, shutdown).await?,
        ),
        Venue::Bitfinex => {
            Box::new(StreamingProvider::start(BitfinexVenue::new(), symbols, stream, shutdown).await?)
        }
        Venue::Kraken => {
            Box::new(StreamingProvider::start(KrakenVenue::new(), symbols, stream, shutdown).await?)
        }
        Venue::Huobi => {
            Box::new(StreamingProvider::start(HuobiVenue::new(), symbols, stream, shutdown).await?)
        }
        Venue::Coinbase => {
            Box::new(StreamingProvider::start(CoinbaseVenue::new(), symbols, stream, shutdown).await?)
        }
        Venue::Coingecko => Box::new(
            PolledProvider::start(CoingeckoVenue::new(), http, symbols, interval, shutdown).await,
        ),
        Venue::Bitstamp => Box::new(
            PolledProvider::start(BitstampVenue::new(workers), http, symbols, interval, shutdown)
                .await,
        ),
        Venue::Bittrex => Box::new(
            PolledProvider::start(BittrexVenue::new(workers), http, symbols, interval, shutdown)
                .await,
        ),
        Venue::Fer => {
            Box::new(PolledProvider::start(FerVenue::new(), http, symbols, interval, shutdown).await)
        }
        Venue::Osmosis => {
            Box::new(PoolProvider::start(http, symbols, interval, workers, shutdown).await)
        }
    };

    Ok(provider)
}
