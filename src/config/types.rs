//! Configuration section types

use serde::Deserialize;

fn default_interval() -> u64 {
    10
}

fn default_timeout() -> u64 {
    15
}

/// Settings for one venue adapter
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Raw venue symbols to subscribe to or poll
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Poll interval in seconds (ignored by streaming venues)
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Delay between streaming reconnect attempts in milliseconds
    pub reconnect_delay_ms: u64,
    /// How long to wait for each subscription ack in milliseconds
    pub ack_timeout_ms: u64,
    /// Concurrent requests for per-symbol polled venues
    pub fetch_workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Seconds between price table log lines
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Emit JSON log lines instead of the human format
    pub json: bool,
}
