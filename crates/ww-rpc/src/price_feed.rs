//! USD prices from a CoinGecko-compatible `simple/price` endpoint.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use ww_core::constants::HTTP_TIMEOUT_SECS;
use ww_core::error::UpstreamError;
use ww_core::traits::PriceFeed;

pub const DEFAULT_PRICE_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Symbol → CoinGecko id for the assets the dashboard knows about.
pub fn default_ids() -> HashMap<String, String> {
    [
        ("ETH", "ethereum"),
        ("BTC", "bitcoin"),
        ("SOL", "solana"),
        ("USDC", "usd-coin"),
    ]
    .into_iter()
    .map(|(s, id)| (s.to_string(), id.to_string()))
    .collect()
}

pub struct HttpPriceFeed {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    ids: HashMap<String, String>,
}

impl HttpPriceFeed {
    pub fn new(base_url: &str, api_key: Option<String>, ids: HashMap<String, String>) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| UpstreamError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            ids,
        })
    }

    /// Ids to request, deduplicated, for the symbols the map knows.
    fn ids_for(&self, symbols: &[String]) -> Vec<String> {
        let mut ids: Vec<String> = symbols
            .iter()
            .filter_map(|s| self.ids.get(&s.to_uppercase()).cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Pick `usd` prices out of a `{ "<id>": { "usd": 1.23 } }` body.
fn parse_prices(
    body: &Value,
    symbols: &[String],
    ids: &HashMap<String, String>,
) -> Result<HashMap<String, f64>, UpstreamError> {
    let by_id = body
        .as_object()
        .ok_or_else(|| UpstreamError::InvalidResponse("expected a json object".into()))?;
    Ok(symbols
        .iter()
        .filter_map(|symbol| {
            let symbol = symbol.to_uppercase();
            let price = by_id.get(ids.get(&symbol)?)?.get("usd")?.as_f64()?;
            Some((symbol, price))
        })
        .collect())
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn batch_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>, UpstreamError> {
        let ids = self.ids_for(symbols);
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut req = self
            .http
            .get(format!("{}/simple/price", self.base_url))
            .query(&[("ids", ids.join(",")), ("vs_currencies", "usd".to_string())]);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-demo-api-key", key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(UpstreamError::Unavailable(format!("price api returned {}", resp.status())));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
        let prices = parse_prices(&body, symbols, &self.ids)?;
        debug!(requested = symbols.len(), priced = prices.len(), "price batch fetched");
        Ok(prices)
    }
}
