// Market data feed: stream decoding, reader tasks, websocket transport
pub mod binance_ws;
pub mod events;
pub mod reader;

pub use binance_ws::BinanceWsConnector;
pub use events::{decode_message, FeedEvent};
pub use reader::{
    batch, kline_streams, run_feed_reader, FeedConnector, ReaderStats, ReconnectPolicy,
    MARK_PRICE_STREAM,
};
