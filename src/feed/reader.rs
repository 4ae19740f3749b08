use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use super::events::{decode_message, FeedEvent};
use crate::error::FeedError;
use crate::models::Timeframe;

/// Futures mark price stream for every symbol
pub const MARK_PRICE_STREAM: &str = "!markPrice@arr";

pub type MessageStream = BoxStream<'static, Result<String, FeedError>>;

/// Opens one upstream connection delivering raw text frames
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self, streams: &[String]) -> Result<MessageStream, FeedError>;
}

/// Reconnect delays: exponential, capped, with jitter
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64, // 0.2 = ±20%
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64());

        let jitter = if self.jitter_factor > 0.0 {
            rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor)
        } else {
            0.0
        };

        Duration::from_secs_f64((capped_secs * (1.0 + jitter)).max(0.001))
    }
}

/// Counters for one reader task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReaderStats {
    pub messages: u64,
    pub events: u64,
    pub malformed: u64,
    pub connections: u64,
    pub failed_connects: u64,
}

/// Stream names for kline updates of each symbol
pub fn kline_streams(symbols: &[String], timeframe: Timeframe) -> Vec<String> {
    symbols
        .iter()
        .map(|s| format!("{}@kline_{}", s.to_lowercase(), timeframe))
        .collect()
}

/// Split items into groups of at most `size` (one group per connection)
pub fn batch<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(|c| c.to_vec()).collect()
}

/// Resolves once the shutdown flag is set or its sender is gone
pub async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Read one connection's worth of streams into the event queue until shutdown
///
/// Malformed frames are logged and dropped. Disconnects are retried per
/// `policy`; the backoff resets once a new connection delivers a frame.
/// Returns early if the event queue has been closed.
pub async fn run_feed_reader<C>(
    name: String,
    connector: Arc<C>,
    streams: Vec<String>,
    events: mpsc::Sender<FeedEvent>,
    policy: ReconnectPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> ReaderStats
where
    C: FeedConnector + ?Sized,
{
    let mut stats = ReaderStats::default();
    let mut attempt: u32 = 0;

    'outer: loop {
        if *shutdown.borrow() {
            break;
        }

        let connected = tokio::select! {
            result = connector.connect(&streams) => result,
            _ = stopped(&mut shutdown) => break,
        };

        match connected {
            Ok(mut stream) => {
                stats.connections += 1;
                tracing::info!(
                    reader = %name,
                    streams = streams.len(),
                    "📡 Feed connected"
                );
                let mut received_any = false;

                loop {
                    let next = tokio::select! {
                        next = stream.next() => next,
                        _ = stopped(&mut shutdown) => break 'outer,
                    };

                    match next {
                        Some(Ok(text)) => {
                            stats.messages += 1;
                            if !received_any {
                                received_any = true;
                                attempt = 0;
                            }

                            match decode_message(&text) {
                                Ok(decoded) => {
                                    for event in decoded {
                                        // Blocks while the queue is full
                                        if events.send(event).await.is_err() {
                                            tracing::debug!(reader = %name, "Event queue closed");
                                            break 'outer;
                                        }
                                        stats.events += 1;
                                    }
                                }
                                Err(e) => {
                                    stats.malformed += 1;
                                    tracing::warn!(reader = %name, error = %e, "Dropping malformed message");
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(reader = %name, error = %e, "Feed error, reconnecting");
                            break;
                        }
                        None => {
                            tracing::warn!(reader = %name, "Feed stream ended, reconnecting");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                stats.failed_connects += 1;
                tracing::warn!(reader = %name, error = %e, attempt = attempt + 1, "Feed connect failed");
            }
        }

        let delay = policy.delay(attempt);
        attempt = attempt.saturating_add(1);
        tracing::info!(
            reader = %name,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting after backoff"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stopped(&mut shutdown) => break,
        }
    }

    tracing::info!(
        reader = %name,
        messages = stats.messages,
        events = stats.events,
        malformed = stats.malformed,
        "🛑 Feed reader stopped"
    );
    stats
}
