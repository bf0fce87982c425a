//! Foreign exchange rates venue (api.fer.ee)
//!
//! Rates come back USD-based (`1 USD = r XXX`) and are inverted into
//! `XXX/USD` prices.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{FeedError, FeedResult};
use crate::oracle::sources::{get_json, keep_normalized, sample, RestVenue};
use crate::types::{now_ms, PriceSample, Venue, USD};

const FER_URL: &str = "https://api.fer.ee/latest";

#[derive(Debug, Clone)]
pub struct FerVenue {
    url: String,
}

impl FerVenue {
    pub fn new() -> Self {
        Self::with_url(FER_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Configured symbols look like `EUR/USD`; only the base is requested
    fn request_url(&self, symbols: &[String]) -> String {
        let bases: Vec<&str> = symbols
            .iter()
            .filter_map(|s| s.split('/').next())
            .filter(|b| !b.is_empty())
            .collect();
        format!("{}?base={}&to={}", self.url, USD, bases.join(","))
    }
}

impl Default for FerVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    rates: Option<HashMap<String, f64>>,
}

fn parse_rates(body: RatesResponse, now: u64) -> FeedResult<Vec<PriceSample>> {
    let rates = body.rates.ok_or_else(|| FeedError::parse(Venue::Fer, "response without rates"))?;
    Ok(rates
        .into_iter()
        .filter(|(_, rate)| *rate > 0.0)
        .filter_map(|(code, rate)| {
            let symbol = format!("{}/{}", code, USD);
            keep_normalized(sample(Venue::Fer, &symbol, 1.0 / rate, now))
        })
        .collect())
}

#[async_trait]
impl RestVenue for FerVenue {
    fn venue(&self) -> Venue {
        Venue::Fer
    }

    async fn fetch_and_parse(
        &self,
        http: &reqwest::Client,
        symbols: &[String],
    ) -> FeedResult<Vec<PriceSample>> {
        let body: RatesResponse = get_json(Venue::Fer, http, &self.request_url(symbols)).await?;
        let samples = parse_rates(body, now_ms())?;
        if samples.is_empty() {
            return Err(FeedError::EmptyResponse { venue: Venue::Fer });
        }
        Ok(samples)
    }
}
