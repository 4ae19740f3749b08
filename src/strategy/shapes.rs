use crate::models::{Candle, Pattern};
use std::collections::HashSet;

/// Minimum shadow length as a multiple of the body
pub const SHADOW_BODY_MULTIPLE: f64 = 1.5;
/// Minimum share of the candle range taken by the dominant shadow
pub const DOMINANT_SHADOW_RATIO: f64 = 0.4;
/// Maximum share of the candle range taken by the opposite shadow
pub const OPPOSITE_SHADOW_RATIO: f64 = 0.2;

/// Evaluation order used when nothing is configured
pub const DEFAULT_PRIORITY: [Pattern; 6] = [
    Pattern::ShootingStar,
    Pattern::BearishEngulfing,
    Pattern::Hammer,
    Pattern::InvertedHammer,
    Pattern::BullishEngulfing,
    Pattern::HangingMan,
];

/// Single and two-candle shape detector
///
/// Shapes are tried in `priority` order; the first enabled shape that
/// matches wins. Shapes missing from `priority` are never reported.
#[derive(Debug, Clone)]
pub struct ShapeDetector {
    priority: Vec<Pattern>,
    enabled: HashSet<Pattern>,
}

impl ShapeDetector {
    pub fn new(priority: Vec<Pattern>, enabled: impl IntoIterator<Item = Pattern>) -> Self {
        Self {
            priority,
            enabled: enabled.into_iter().collect(),
        }
    }

    pub fn with_default_priority(enabled: impl IntoIterator<Item = Pattern>) -> Self {
        Self::new(DEFAULT_PRIORITY.to_vec(), enabled)
    }

    /// Classify a completed candle, optionally against the previous (open, close)
    pub fn detect(&self, candle: &Candle, prev: Option<(f64, f64)>) -> Option<Pattern> {
        if candle.total_range() <= 0.0 {
            return None;
        }

        self.priority
            .iter()
            .copied()
            .filter(|p| self.enabled.contains(p))
            .find(|p| matches_shape(*p, candle, prev))
    }

    pub fn priority(&self) -> &[Pattern] {
        &self.priority
    }
}

/// Test a single shape. Three-candle labels never match here.
pub fn matches_shape(pattern: Pattern, candle: &Candle, prev: Option<(f64, f64)>) -> bool {
    let range = candle.total_range();
    if range <= 0.0 {
        return false;
    }

    let body = candle.body();
    let upper = candle.upper_shadow();
    let lower = candle.lower_shadow();
    let upper_ratio = upper / range;
    let lower_ratio = lower / range;

    let long_upper = upper >= body * SHADOW_BODY_MULTIPLE
        && upper_ratio >= DOMINANT_SHADOW_RATIO
        && lower_ratio <= OPPOSITE_SHADOW_RATIO;
    let long_lower = lower >= body * SHADOW_BODY_MULTIPLE
        && lower_ratio >= DOMINANT_SHADOW_RATIO
        && upper_ratio <= OPPOSITE_SHADOW_RATIO;

    match pattern {
        Pattern::ShootingStar => candle.is_green() && long_upper,
        Pattern::InvertedHammer => candle.is_red() && long_upper,
        Pattern::Hammer => candle.is_red() && long_lower,
        Pattern::HangingMan => candle.is_green() && long_lower,
        Pattern::BearishEngulfing => prev.is_some_and(|(prev_open, prev_close)| {
            prev_close > prev_open
                && candle.is_red()
                && candle.open > prev_close
                && candle.close < prev_open
        }),
        Pattern::BullishEngulfing => prev.is_some_and(|(prev_open, prev_close)| {
            prev_close < prev_open
                && candle.is_green()
                && candle.open < prev_close
                && candle.close > prev_open
        }),
        Pattern::ReversalDown1 | Pattern::ReversalDown2 => false,
    }
}
