//! Oracle Feeder Library
//!
//! Multi-venue price feed: streaming, polled and on-chain pool adapters
//! averaged into one USD price per coin

pub mod config;
pub mod error;
pub mod oracle;
pub mod shutdown;
pub mod types;
