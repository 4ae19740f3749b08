use thiserror::Error;

use crate::models::Pattern;

/// Failures while turning raw feed payloads into typed values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("JSON error: {0}")]
    Json(String),
    #[error("invalid number in field `{field}`: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("invalid candle: {0}")]
    InvalidCandle(String),
    #[error("unknown timeframe: {0}")]
    UnknownTimeframe(String),
    #[error("unknown pattern: {0}")]
    UnknownPattern(String),
}

/// Why a detected pattern was not allowed to become an order
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalRejection {
    #[error("volume too low ({volume:.0} < {min_volume:.0})")]
    VolumeTooLow { volume: f64, min_volume: f64 },
    #[error("volume spike too weak for {pattern} (ratio {ratio:.2} < {threshold})")]
    WeakVolumeSpike {
        pattern: Pattern,
        ratio: f64,
        threshold: f64,
    },
    #[error("invalid validator input: volume={volume}, average_volume={average_volume}")]
    InvalidInput { volume: f64, average_volume: f64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SizingError {
    #[error("invalid price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: f64 },
    #[error("{pattern} is in neither the bullish nor the bearish set")]
    NoDirection { pattern: Pattern },
    #[error("quantity for {symbol} rounds to zero (raw {raw}, step {step})")]
    QuantityTooSmall { symbol: String, raw: f64, step: f64 },
}

/// Order book invariant violations. None of these mutate state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("order already open for {symbol}")]
    AlreadyOpen { symbol: String },
    #[error("exchange already holds a position for {symbol}")]
    ExternalPosition { symbol: String },
    #[error("max open orders reached ({limit})")]
    MaxOpenOrders { limit: usize },
    #[error("no open order for {symbol}")]
    NoOpenOrder { symbol: String },
    #[error("no pending order {order_id} for {symbol}")]
    NoPendingOrder { symbol: String, order_id: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("order rejected: {0}")]
    Rejected(String),
    #[error("no filters for symbol {0}")]
    UnknownSymbol(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("connection closed by peer")]
    Closed,
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::Json(err.to_string())
    }
}
