//! Error types for the price feed
//!
//! `FeedError` covers adapter construction, transport and parsing failures.
//! `NormalizationError` is kept separate because it is always per-symbol and
//! never stops a batch.

use thiserror::Error;

use crate::types::Venue;

/// A raw venue symbol that cannot be mapped to a canonical pair
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot normalize {venue} symbol {symbol:?}: {reason}")]
pub struct NormalizationError {
    pub venue: Venue,
    pub symbol: String,
    pub reason: &'static str,
}

impl NormalizationError {
    pub fn new(venue: Venue, symbol: impl Into<String>, reason: &'static str) -> Self {
        Self {
            venue,
            symbol: symbol.into(),
            reason,
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown venue: {0}")]
    UnknownVenue(String),

    #[error("no provider configuration for {0}")]
    MissingConfig(Venue),

    #[error("{venue}: connection failed: {reason}")]
    Connect { venue: Venue, reason: String },

    #[error("{venue}: handshake rejected: {reason}")]
    Handshake { venue: Venue, reason: String },

    #[error("{venue}: venue rejected request: {reason}")]
    Rejected { venue: Venue, reason: String },

    #[error("{venue}: timed out waiting for subscription ack")]
    AckTimeout { venue: Venue },

    #[error("{venue}: connection closed during {stage}")]
    Closed { venue: Venue, stage: &'static str },

    #[error("{venue}: websocket error: {source}")]
    WebSocket {
        venue: Venue,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("{venue}: http error: {source}")]
    Http {
        venue: Venue,
        #[source]
        source: reqwest::Error,
    },

    #[error("{venue}: http status {status} from {url}")]
    Status {
        venue: Venue,
        status: u16,
        url: String,
    },

    #[error("{venue}: failed to parse payload: {reason}")]
    Parse { venue: Venue, reason: String },

    #[error("{venue}: response contained no usable prices")]
    EmptyResponse { venue: Venue },

    #[error("{venue}: bridge price for {bridge} unavailable, tick rejected")]
    BridgeUnresolved { venue: Venue, bridge: String },

    #[error(transparent)]
    Normalization(#[from] NormalizationError),
}

impl FeedError {
    pub fn parse(venue: Venue, reason: impl Into<String>) -> Self {
        FeedError::Parse {
            venue,
            reason: reason.into(),
        }
    }

    pub fn http(venue: Venue, source: reqwest::Error) -> Self {
        FeedError::Http { venue, source }
    }

    pub fn ws(venue: Venue, source: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::WebSocket { venue, source }
    }
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;
