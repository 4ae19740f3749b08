use anyhow::{Context, Result};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::models::SymbolFilters;

pub const BINANCE_FUTURES_REST: &str = "https://fapi.binance.com";
const RATE_LIMIT_RPM: u32 = 60; // exchangeInfo weight is high, stay well under the cap
const MAX_RETRIES: u32 = 3;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Response from /fapi/v1/exchangeInfo
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    pub quote_asset: String,
    #[serde(default)]
    pub filters: Vec<FilterInfo>,
}

/// Only the two filter kinds used for rounding are decoded
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum FilterInfo {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price { tick_size: String },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { step_size: String },
    #[serde(other)]
    Other,
}

impl SymbolInfo {
    pub fn is_tradable_usdt(&self) -> bool {
        self.status == "TRADING" && self.quote_asset == "USDT"
    }

    /// None unless both PRICE_FILTER and LOT_SIZE parse
    pub fn symbol_filters(&self) -> Option<SymbolFilters> {
        let mut tick_size = None;
        let mut step_size = None;
        for filter in &self.filters {
            match filter {
                FilterInfo::Price { tick_size: t } => tick_size = t.parse::<f64>().ok(),
                FilterInfo::LotSize { step_size: s } => step_size = s.parse::<f64>().ok(),
                FilterInfo::Other => {}
            }
        }
        Some(SymbolFilters {
            tick_size: tick_size?,
            step_size: step_size?,
        })
    }
}

/// Public (unsigned) Binance USDⓈ-M futures REST endpoints
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct BinanceRestClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
}

impl BinanceRestClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Rate-limited GET with retry on 429/5xx and network errors
    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    if (status.as_u16() == 429 || status.is_server_error()) && attempt < MAX_RETRIES
                    {
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "Binance returned {}, retrying in {}s (attempt {}/{})",
                            status,
                            backoff_secs,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    anyhow::bail!("Binance API error ({}): {}", status, error_text);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "Network error: {}, retrying in {}s (attempt {}/{})",
                        e,
                        backoff_secs,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                }
                Err(e) => anyhow::bail!("Network error after {} retries: {}", MAX_RETRIES, e),
            }
        }

        anyhow::bail!("Failed after {} retries", MAX_RETRIES)
    }

    pub async fn exchange_info(&self) -> Result<ExchangeInfo> {
        let response = self.get("/fapi/v1/exchangeInfo").await?;
        response
            .json()
            .await
            .context("Failed to parse exchangeInfo")
    }

    /// Tradable USDT-quoted symbols, in exchange order, capped at `max`
    pub async fn usdt_symbols(&self, max: usize) -> Result<Vec<String>> {
        let info = self.exchange_info().await?;
        Ok(info
            .symbols
            .iter()
            .filter(|s| s.is_tradable_usdt())
            .map(|s| s.symbol.clone())
            .take(max)
            .collect())
    }

    /// Tick and step sizes for every symbol that has both filters
    pub async fn symbol_filters(&self) -> Result<HashMap<String, SymbolFilters>> {
        let info = self.exchange_info().await?;
        let filters: HashMap<String, SymbolFilters> = info
            .symbols
            .iter()
            .filter_map(|s| s.symbol_filters().map(|f| (s.symbol.clone(), f)))
            .collect();

        tracing::debug!("Loaded filters for {} symbols", filters.len());
        Ok(filters)
    }
}
