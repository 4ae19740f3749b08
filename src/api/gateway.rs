use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::models::{Side, SymbolFilters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<f64>, // Required for LIMIT
    pub quantity: f64,
    pub time_in_force: Option<TimeInForce>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: Side, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            price: None,
            quantity,
            time_in_force: None,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: Side, price: f64, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            quantity,
            time_in_force: Some(TimeInForce::Gtc),
        }
    }
}

/// A position the exchange reports for the account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: String,
    pub amount: f64, // Signed: negative is short
    pub entry_price: f64,
    pub mark_price: f64,
}

/// Order routing and symbol metadata for one exchange account
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn get_symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, GatewayError>;

    /// Returns the exchange order id
    async fn place_order(&self, request: OrderRequest) -> Result<String, GatewayError>;

    /// Order that may only shrink an existing position
    async fn place_reduce_only_order(&self, request: OrderRequest)
        -> Result<String, GatewayError>;

    async fn cancel_all_open_orders(&self, symbol: &str) -> Result<(), GatewayError>;

    async fn get_open_positions(&self) -> Result<Vec<ExchangePosition>, GatewayError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), GatewayError>;
}
