// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod feed;
pub mod market;
pub mod models;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use error::{FeedError, GatewayError, OrderError, ParseError, SignalRejection, SizingError};
pub use models::*;
