//! CoinGecko simple-price venue
//!
//! One batched request per tick for every configured coin id.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{FeedError, FeedResult};
use crate::oracle::sources::{get_json, keep_normalized, sample, RestVenue};
use crate::types::{now_ms, PriceSample, Venue};

const COINGECKO_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// id → { "usd": price }
type SimplePrice = HashMap<String, HashMap<String, f64>>;

#[derive(Debug, Clone)]
pub struct CoingeckoVenue {
    url: String,
}

impl CoingeckoVenue {
    pub fn new() -> Self {
        Self::with_url(COINGECKO_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn request_url(&self, symbols: &[String]) -> String {
        format!(
            "{}?ids={}&vs_currencies=usd&precision=18",
            self.url,
            symbols.join(",")
        )
    }
}

impl Default for CoingeckoVenue {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_prices(body: SimplePrice, now: u64) -> Vec<PriceSample> {
    body.into_iter()
        .filter_map(|(id, quotes)| {
            let Some(price) = quotes.get("usd").copied() else {
                tracing::debug!(venue = %Venue::Coingecko, id = %id, "No usd quote");
                return None;
            };
            keep_normalized(sample(Venue::Coingecko, &id, price, now))
        })
        .collect()
}

#[async_trait]
impl RestVenue for CoingeckoVenue {
    fn venue(&self) -> Venue {
        Venue::Coingecko
    }

    async fn fetch_and_parse(
        &self,
        http: &reqwest::Client,
        symbols: &[String],
    ) -> FeedResult<Vec<PriceSample>> {
        let body: SimplePrice = get_json(Venue::Coingecko, http, &self.request_url(symbols)).await?;
        let samples = parse_prices(body, now_ms());
        if samples.is_empty() {
            return Err(FeedError::EmptyResponse { venue: Venue::Coingecko });
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url() {
        let url = CoingeckoVenue::new().request_url(&["bitcoin".into(), "cosmos".into()]);
        assert_eq!(
            url,
            "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin,cosmos&vs_currencies=usd&precision=18"
        );
    }

    #[test]
    fn test_parse_prices_skips_unknown_ids() {
        let body: SimplePrice = serde_json::from_str(
            r#"{"bitcoin":{"usd":37000.5},"cosmos":{"usd":9.1},"dogecoin":{"usd":0.07},"tether":{}}"#,
        )
        .unwrap();
        let mut samples = parse_prices(body, 42);
        samples.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].pair.key(), "BTC/USD");
        assert_eq!(samples[0].price, 37000.5);
        assert_eq!(samples[1].pair.key(), "ATOM/USD");
        assert!(samples.iter().all(|s| s.observed_at_ms == 42));
    }
}
