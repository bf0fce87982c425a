//! Oracle module - Multi-venue price collection
//!
//! Venue adapters keep a per-venue cache of normalized prices; the
//! `ProviderManager` averages them into one USD price per coin.

mod aggregator;
pub mod cache;
pub mod candles;
pub mod polling;
pub mod pools;
pub mod provider;
pub mod sources;
pub mod streaming;
pub mod symbols;

pub use aggregator::{average_price_by_coin, average_price_by_pair, ProviderManager};
pub use cache::VenueCache;
pub use candles::CandleBuilder;
pub use polling::PolledProvider;
pub use pools::PoolProvider;
pub use provider::{build_provider, PriceProvider};
pub use streaming::{StreamState, StreamingProvider};
pub use symbols::normalize;
