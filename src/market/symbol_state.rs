use super::candle_window::CandleWindow;
use crate::models::{Candle, Pattern, Timeframe};
use std::collections::VecDeque;

/// Number of candle volumes kept for the rolling average
pub const VOLUME_HISTORY_LEN: usize = 20;

/// Everything the engine tracks about one trading symbol
#[derive(Debug, Clone)]
pub struct SymbolState {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub higher_timeframe: Timeframe,
    window: CandleWindow,
    volume_history: VecDeque<f64>,
    average_volume: f64,
    current_price: Option<f64>,
    prev_candle: Option<(f64, f64)>, // (open, close) of the last completed candle
    higher_tf_open_price: Option<f64>,
    last_update_time: Option<i64>,
    last_candle_start: Option<i64>,
    candles_seen: u64,
}

/// Result of offering a completed candle to a symbol
#[derive(Debug, Clone, PartialEq)]
pub enum CandleUpdate {
    /// Candle was new; carries the three-candle label, if any
    Accepted { reversal: Option<Pattern> },
    /// Start time at or before the last accepted candle
    Duplicate { start_time: i64, last_start: i64 },
}

impl SymbolState {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, higher_timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            higher_timeframe,
            window: CandleWindow::new(),
            volume_history: VecDeque::with_capacity(VOLUME_HISTORY_LEN + 1),
            average_volume: 0.0,
            current_price: None,
            prev_candle: None,
            higher_tf_open_price: None,
            last_update_time: None,
            last_candle_start: None,
            candles_seen: 0,
        }
    }

    /// Record a completed candle
    ///
    /// Rejects replays (same or older start time) without touching any state.
    /// On acceptance updates price, volume history, the higher-timeframe open
    /// and the candle window. `prev_candle` is NOT updated here so two-candle
    /// shapes can still see the previous candle; call [`Self::finish_candle`]
    /// once evaluation is done.
    pub fn apply_candle(&mut self, candle: &Candle) -> CandleUpdate {
        if let Some(last_start) = self.last_candle_start {
            if candle.start_time <= last_start {
                return CandleUpdate::Duplicate {
                    start_time: candle.start_time,
                    last_start,
                };
            }
        }

        self.last_candle_start = Some(candle.start_time);
        self.candles_seen += 1;
        self.current_price = Some(candle.close);
        self.update_volume_history(candle.volume);
        self.update_higher_timeframe_open(candle.start_time, candle.open);

        let reversal = self.window.push(*candle);
        CandleUpdate::Accepted { reversal }
    }

    /// Remember the candle for the next two-candle comparison
    pub fn finish_candle(&mut self, candle: &Candle) {
        self.prev_candle = Some((candle.open, candle.close));
    }

    /// Append a volume and recompute the mean of the last 20
    pub fn update_volume_history(&mut self, volume: f64) {
        if !volume.is_finite() {
            tracing::warn!(symbol = %self.symbol, volume, "Ignoring non-finite volume");
            return;
        }

        self.volume_history.push_back(volume);
        while self.volume_history.len() > VOLUME_HISTORY_LEN {
            self.volume_history.pop_front();
        }

        self.average_volume = if self.volume_history.is_empty() {
            0.0
        } else {
            self.volume_history.iter().sum::<f64>() / self.volume_history.len() as f64
        };
    }

    /// Sample the open price whenever a candle starts a new higher-timeframe bucket
    pub fn update_higher_timeframe_open(&mut self, start_time: i64, open_price: f64) {
        let interval = self.higher_timeframe.interval_ms();
        let bucket = start_time.div_euclid(interval);
        let new_bucket = match self.last_update_time {
            Some(last) => last.div_euclid(interval) != bucket,
            None => true,
        };

        if new_bucket {
            self.higher_tf_open_price = Some(open_price);
            self.last_update_time = Some(start_time);
        }
    }

    pub fn set_price(&mut self, price: f64) {
        if price.is_finite() && price > 0.0 {
            self.current_price = Some(price);
        }
    }

    pub fn current_price(&self) -> Option<f64> {
        self.current_price
    }

    pub fn average_volume(&self) -> f64 {
        self.average_volume
    }

    pub fn volume_history(&self) -> impl Iterator<Item = &f64> {
        self.volume_history.iter()
    }

    pub fn prev_candle(&self) -> Option<(f64, f64)> {
        self.prev_candle
    }

    pub fn higher_tf_open_price(&self) -> Option<f64> {
        self.higher_tf_open_price
    }

    pub fn last_candle_start(&self) -> Option<i64> {
        self.last_candle_start
    }

    pub fn candles_seen(&self) -> u64 {
        self.candles_seen
    }

    pub fn window(&self) -> &CandleWindow {
        &self.window
    }
}
