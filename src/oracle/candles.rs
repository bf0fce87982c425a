//! Candle Builder - Builds one-minute OHLCV candles from a trade stream
//!
//! Used for venues that only publish trades. A candle is complete once a
//! trade for the same symbol lands in a later minute.

use std::collections::HashMap;

/// One minute, in milliseconds
pub const MINUTE_MS: u64 = 60_000;

/// Completed candle for one raw symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub open_time: u64,
    pub close_time: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Base-asset volume
    pub volume: f64,
    /// Quote-asset volume (sum of price * size)
    pub quote_volume: f64,
    pub trades: u64,
}

impl Candle {
    pub fn vwap(&self) -> f64 {
        vwap(self.open, self.close, self.volume, self.quote_volume)
    }
}

/// Volume-weighted price of a candle
///
/// Falls back to the open/close midpoint when either volume is zero.
pub fn vwap(open: f64, close: f64, base_volume: f64, quote_volume: f64) -> f64 {
    if base_volume > 0.0 && quote_volume > 0.0 {
        quote_volume / base_volume
    } else {
        (open + close) / 2.0
    }
}

#[derive(Debug, Clone)]
struct BuildingCandle {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    quote_volume: f64,
    trade_count: u64,
    start_ts: u64,
    end_ts: u64,
}

impl BuildingCandle {
    fn new(start_ts: u64, ts: u64, price: f64, size: f64) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume: size,
            quote_volume: price * size,
            trade_count: 1,
            start_ts,
            end_ts: ts,
        }
    }

    fn update(&mut self, ts: u64, price: f64, size: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += size;
        self.quote_volume += price * size;
        self.trade_count += 1;
        self.end_ts = ts;
    }

    fn finalize(&self, symbol: &str) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            open_time: self.start_ts,
            close_time: self.start_ts + MINUTE_MS,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            quote_volume: self.quote_volume,
            trades: self.trade_count,
        }
    }
}

/// Candle builder that aggregates trades into one-minute candles
#[derive(Debug, Default)]
pub struct CandleBuilder {
    /// Current incomplete candle per raw symbol
    current: HashMap<String, BuildingCandle>,
}

impl CandleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trade and return the previous candle if this trade closed it
    ///
    /// Trades older than the open bucket are dropped.
    pub fn add_trade(&mut self, symbol: &str, ts: u64, price: f64, size: f64) -> Option<Candle> {
        let bucket = Self::candle_start(ts);

        match self.current.get_mut(symbol) {
            Some(current) if current.start_ts == bucket => {
                current.update(ts, price, size);
                None
            }
            Some(current) if current.start_ts > bucket => None,
            Some(current) => {
                let completed = current.finalize(symbol);
                *current = BuildingCandle::new(bucket, ts, price, size);
                Some(completed)
            }
            None => {
                self.current
                    .insert(symbol.to_string(), BuildingCandle::new(bucket, ts, price, size));
                None
            }
        }
    }

    /// Start of the one-minute bucket containing `ts`
    fn candle_start(ts: u64) -> u64 {
        ts - ts % MINUTE_MS
    }

    pub fn open_symbols(&self) -> usize {
        self.current.len()
    }
}
