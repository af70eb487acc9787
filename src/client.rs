use std::time::Duration;

use tracing::{error, warn};

use crate::config::{Config, FETCH_TIMEOUT_SECS};
use crate::error::Result;

/// REST client for the Polymarket CLOB markets listing.
///
/// Deliberately infallible from the caller's perspective: any transport,
/// status or shape failure logs and yields an empty batch, and the next
/// scheduled cycle tries again. No retries at this layer.
pub struct PolymarketClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    fetch_limit: usize,
}

impl PolymarketClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.clob_api_url.clone(),
            api_key: cfg.api_key.clone(),
            fetch_limit: cfg.fetch_limit,
        })
    }

    /// Fetch the current active-market listing as weakly-typed records.
    /// The response is either `{"data": [...]}` or a bare array; anything
    /// else is logged and treated as empty.
    pub async fn fetch_active_markets(&self) -> Vec<serde_json::Value> {
        let url = format!("{}/markets", self.base_url);
        let limit = self.fetch_limit.to_string();

        let resp = match self
            .http
            .get(&url)
            .header("POLY-API-KEY", &self.api_key)
            .query(&[
                ("limit", limit.as_str()),
                ("active", "true"),
                ("next_cursor", ""),
                ("order", "volume_24hr"),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!("Failed to fetch markets from Polymarket: {e}");
                return Vec::new();
            }
        };

        if !resp.status().is_success() {
            error!(
                status = %resp.status(),
                "Polymarket /markets returned non-success status"
            );
            return Vec::new();
        }

        let body: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to parse Polymarket /markets response: {e}");
                return Vec::new();
            }
        };

        if let Some(data) = body.get("data").and_then(|d| d.as_array()) {
            return data.clone();
        }
        if let Some(items) = body.as_array() {
            return items.clone();
        }

        warn!("Unexpected Polymarket API response format, treating as empty");
        Vec::new()
    }
}
