use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;

use super::binance::BinanceRestClient;
use crate::models::SymbolFilters;

#[derive(Debug, Default)]
struct CacheInner {
    filters: HashMap<String, SymbolFilters>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Shared tick/step size lookup
///
/// Readers never wait on the network; the refresh task swaps in a new map.
/// A failed refresh keeps the previous entries.
#[derive(Debug, Clone, Default)]
pub struct SymbolFilterCache {
    inner: Arc<RwLock<CacheInner>>,
}

impl SymbolFilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(filters: HashMap<String, SymbolFilters>) -> Self {
        let cache = Self::new();
        cache.replace(filters);
        cache
    }

    pub fn get(&self, symbol: &str) -> Option<SymbolFilters> {
        // A poisoned lock only means a writer panicked mid-swap; the map is still whole
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.filters.get(symbol).copied()
    }

    /// Copy of every cached entry
    pub fn entries(&self) -> HashMap<String, SymbolFilters> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.filters.clone()
    }

    pub fn replace(&self, filters: HashMap<String, SymbolFilters>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.filters = filters;
        inner.refreshed_at = Some(Utc::now());
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .filters
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .refreshed_at
    }

    /// Fetch once and swap in the result
    pub async fn refresh(&self, client: &BinanceRestClient) -> anyhow::Result<usize> {
        let filters = client.symbol_filters().await?;
        if filters.is_empty() {
            anyhow::bail!("exchangeInfo returned no symbol filters");
        }
        let count = filters.len();
        self.replace(filters);
        Ok(count)
    }
}

/// Refresh the cache on a fixed period until shutdown
pub async fn run_filter_refresh(
    cache: SymbolFilterCache,
    client: BinanceRestClient,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick fires immediately; main already loaded the cache
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match cache.refresh(&client).await {
                    Ok(count) => tracing::debug!("🔄 Refreshed filters for {} symbols", count),
                    Err(e) => tracing::warn!("⚠️  Filter refresh failed, keeping stale entries: {}", e),
                }
            }
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
    }

    tracing::debug!("Filter refresh task stopped");
}
