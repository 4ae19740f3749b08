// Exchange collaborators: order routing, symbol metadata
pub mod binance;
pub mod filter_cache;
pub mod gateway;
pub mod paper;

pub use binance::BinanceRestClient;
pub use filter_cache::SymbolFilterCache;
pub use gateway::{ExchangeGateway, ExchangePosition, OrderRequest, OrderType, TimeInForce};
pub use paper::PaperGateway;
