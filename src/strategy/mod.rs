// Signal detection: three-candle reversals, candlestick shapes, volume gate
pub mod patterns;
pub mod shapes;
pub mod validator;

pub use shapes::ShapeDetector;
pub use validator::SignalValidator;

use crate::models::{Candle, Pattern, Side};
use std::collections::HashSet;

/// Which patterns are traded, and in which direction
#[derive(Debug, Clone, Default)]
pub struct PatternSets {
    bullish: HashSet<Pattern>,
    bearish: HashSet<Pattern>,
}

impl PatternSets {
    pub fn new(
        bullish: impl IntoIterator<Item = Pattern>,
        bearish: impl IntoIterator<Item = Pattern>,
    ) -> Self {
        Self {
            bullish: bullish.into_iter().collect(),
            bearish: bearish.into_iter().collect(),
        }
    }

    pub fn is_bullish(&self, pattern: Pattern) -> bool {
        self.bullish.contains(&pattern)
    }

    pub fn is_bearish(&self, pattern: Pattern) -> bool {
        self.bearish.contains(&pattern)
    }

    pub fn is_enabled(&self, pattern: Pattern) -> bool {
        self.is_bullish(pattern) || self.is_bearish(pattern)
    }

    /// BUY for the bullish set, SELL for the bearish set
    pub fn side_for(&self, pattern: Pattern) -> Option<Side> {
        if self.is_bullish(pattern) {
            Some(Side::Buy)
        } else if self.is_bearish(pattern) {
            Some(Side::Sell)
        } else {
            None
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = Pattern> + '_ {
        self.bullish.iter().chain(self.bearish.iter()).copied()
    }
}

/// Picks at most one tradeable label per completed candle
#[derive(Debug, Clone)]
pub struct SignalEngine {
    sets: PatternSets,
    shapes: ShapeDetector,
}

impl SignalEngine {
    pub fn new(sets: PatternSets, priority: Vec<Pattern>) -> Self {
        let shapes = ShapeDetector::new(priority, sets.enabled().collect::<Vec<_>>());
        Self { sets, shapes }
    }

    /// The three-candle label takes precedence over the shape library
    pub fn select(
        &self,
        reversal: Option<Pattern>,
        candle: &Candle,
        prev_candle: Option<(f64, f64)>,
    ) -> Option<Pattern> {
        reversal
            .filter(|p| self.sets.is_enabled(*p))
            .or_else(|| self.shapes.detect(candle, prev_candle))
    }

    pub fn sets(&self) -> &PatternSets {
        &self.sets
    }
}
