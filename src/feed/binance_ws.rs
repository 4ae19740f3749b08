use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::reader::{FeedConnector, MessageStream};
use crate::error::FeedError;

pub const BINANCE_FUTURES_WS: &str = "wss://fstream.binance.com";

/// Combined-stream websocket connection to Binance futures
#[derive(Debug, Clone)]
pub struct BinanceWsConnector {
    base_url: String,
}

impl BinanceWsConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn stream_url(&self, streams: &[String]) -> String {
        format!("{}/stream?streams={}", self.base_url, streams.join("/"))
    }
}

impl Default for BinanceWsConnector {
    fn default() -> Self {
        Self::new(BINANCE_FUTURES_WS)
    }
}

#[async_trait]
impl FeedConnector for BinanceWsConnector {
    async fn connect(&self, streams: &[String]) -> Result<MessageStream, FeedError> {
        if streams.is_empty() {
            return Err(FeedError::Connection("no streams requested".to_string()));
        }

        let url = self.stream_url(streams);
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| FeedError::Connection(e.to_string()))?;

        // Pings are answered by tungstenite while the stream is polled
        let messages = ws.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(_)) => Some(Err(FeedError::Closed)),
                Ok(_) => None,
                Err(e) => Some(Err(FeedError::Transport(e.to_string()))),
            }
        });

        Ok(messages.boxed())
    }
}
