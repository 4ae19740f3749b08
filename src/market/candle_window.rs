use crate::models::{Candle, Pattern};
use crate::strategy::patterns;
use std::collections::VecDeque;

/// Candles needed for a three-candle evaluation
pub const WINDOW_CAPACITY: usize = 3;

/// Rolling window of the most recent completed candles for one symbol
///
/// Oldest first. Pushing past capacity drops the oldest candle.
#[derive(Debug, Clone, Default)]
pub struct CandleWindow {
    candles: VecDeque<Candle>,
}

impl CandleWindow {
    pub fn new() -> Self {
        Self {
            candles: VecDeque::with_capacity(WINDOW_CAPACITY),
        }
    }

    /// Add a completed candle and evaluate the reversal patterns
    ///
    /// Returns a label only once the window is full.
    pub fn push(&mut self, candle: Candle) -> Option<Pattern> {
        self.candles.push_back(candle);

        while self.candles.len() > WINDOW_CAPACITY {
            self.candles.pop_front();
        }

        self.evaluate()
    }

    /// Evaluate the current contents without modifying them
    pub fn evaluate(&self) -> Option<Pattern> {
        if !self.is_full() {
            return None;
        }
        patterns::match_reversal(&self.candles[0], &self.candles[1], &self.candles[2])
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.candles.len() == WINDOW_CAPACITY
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn candles(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_candle(open: f64, high: f64, low: f64, close: f64, start: i64) -> Candle {
        Candle::new(open, high, low, close, 1000.0, start, start + 59_999).unwrap()
    }

    fn flat(price: f64, start: i64) -> Candle {
        create_test_candle(price, price, price, price, start)
    }

    #[test]
    fn test_new_window() {
        let window = CandleWindow::new();
        assert!(window.is_empty());
        assert!(!window.is_full());
    }

    #[test]
    fn test_no_evaluation_before_full() {
        let mut window = CandleWindow::new();

        // Red then green-with-wick: first two legs of the first reversal
        assert_eq!(window.push(create_test_candle(11.0, 11.0, 9.9, 10.0, 0)), None);
        assert_eq!(window.push(create_test_candle(10.0, 11.0, 9.5, 10.5, 1)), None);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_max_capacity_evicts_oldest() {
        let mut window = CandleWindow::new();

        for i in 0..10 {
            window.push(flat(100.0 + i as f64, i));
            assert!(window.len() <= WINDOW_CAPACITY);
        }

        let closes: Vec<f64> = window.candles().map(|c| c.close).collect();
        assert_eq!(closes, vec![107.0, 108.0, 109.0]);
        assert_eq!(window.latest().unwrap().close, 109.0);
    }

    #[test]
    fn test_push_reports_pattern_when_full() {
        let mut window = CandleWindow::new();
        window.push(create_test_candle(11.0, 11.0, 9.9, 10.0, 0)); // red
        window.push(create_test_candle(10.0, 11.0, 9.5, 10.5, 1)); // green, wick 0.5 > 0.3
        let label = window.push(create_test_candle(10.0, 10.0, 9.0, 9.2, 2)); // close < 9.5

        assert_eq!(label, Some(Pattern::ReversalDown1));
    }

    #[test]
    fn test_fourth_candle_reevaluates_latest_three() {
        let mut window = CandleWindow::new();
        window.push(flat(50.0, 0));
        window.push(create_test_candle(11.0, 11.0, 9.9, 10.0, 1));
        window.push(create_test_candle(10.0, 11.0, 9.5, 10.5, 2));
        let label = window.push(create_test_candle(10.0, 10.0, 9.0, 9.2, 3));

        assert_eq!(window.len(), 3);
        assert_eq!(label, Some(Pattern::ReversalDown1));
    }
}
