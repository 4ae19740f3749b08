use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// One completed OHLCV interval
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub start_time: i64, // ms
    pub end_time: i64,   // ms
}

impl Candle {
    /// Build a candle, rejecting non-finite values and broken OHLC ordering
    pub fn new(
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        start_time: i64,
        end_time: i64,
    ) -> Result<Self, ParseError> {
        if ![open, high, low, close, volume].iter().all(|v| v.is_finite()) {
            return Err(ParseError::InvalidCandle(format!(
                "non-finite value o={open} h={high} l={low} c={close} v={volume}"
            )));
        }
        if volume < 0.0 {
            return Err(ParseError::InvalidCandle(format!("negative volume {volume}")));
        }
        if high < open.max(close) || low > open.min(close) {
            return Err(ParseError::InvalidCandle(format!(
                "OHLC out of order o={open} h={high} l={low} c={close}"
            )));
        }
        Ok(Self {
            open,
            high,
            low,
            close,
            volume,
            start_time,
            end_time,
        })
    }

    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    pub fn is_red(&self) -> bool {
        self.close < self.open
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn total_range(&self) -> f64 {
        self.high - self.low
    }

    /// Upper wick longer than 60% of the body (any wick at all for a doji)
    pub fn has_long_upper_shadow(&self) -> bool {
        let body = self.body();
        let upper = self.upper_shadow();
        if body > 0.0 {
            upper > body * 0.6
        } else {
            upper > 0.0
        }
    }
}

/// Order direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Signal labels produced by the three-candle matcher and the shape library
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Pattern {
    #[serde(rename = "REVERSAL_DOWN_1")]
    ReversalDown1,
    #[serde(rename = "REVERSAL_DOWN_2")]
    ReversalDown2,
    ShootingStar,
    Hammer,
    InvertedHammer,
    HangingMan,
    BullishEngulfing,
    BearishEngulfing,
}

impl Pattern {
    pub const ALL: [Pattern; 8] = [
        Pattern::ReversalDown1,
        Pattern::ReversalDown2,
        Pattern::ShootingStar,
        Pattern::Hammer,
        Pattern::InvertedHammer,
        Pattern::HangingMan,
        Pattern::BullishEngulfing,
        Pattern::BearishEngulfing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::ReversalDown1 => "REVERSAL_DOWN_1",
            Pattern::ReversalDown2 => "REVERSAL_DOWN_2",
            Pattern::ShootingStar => "SHOOTING_STAR",
            Pattern::Hammer => "HAMMER",
            Pattern::InvertedHammer => "INVERTED_HAMMER",
            Pattern::HangingMan => "HANGING_MAN",
            Pattern::BullishEngulfing => "BULLISH_ENGULFING",
            Pattern::BearishEngulfing => "BEARISH_ENGULFING",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pattern {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::UnknownPattern(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Submitted to the gateway, not yet acknowledged
    Pending,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeResult {
    Win,
    Loss,
}

impl fmt::Display for TradeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeResult::Win => write!(f, "WIN"),
            TradeResult::Loss => write!(f, "LOSS"),
        }
    }
}

/// Kline interval, as named by the exchange streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn interval_ms(&self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            Timeframe::M1 => MINUTE,
            Timeframe::M3 => 3 * MINUTE,
            Timeframe::M5 => 5 * MINUTE,
            Timeframe::M15 => 15 * MINUTE,
            Timeframe::M30 => 30 * MINUTE,
            Timeframe::H1 => 60 * MINUTE,
            Timeframe::H2 => 120 * MINUTE,
            Timeframe::H4 => 240 * MINUTE,
            Timeframe::D1 => 1440 * MINUTE,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(Timeframe::M1),
            "3m" => Ok(Timeframe::M3),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "2h" => Ok(Timeframe::H2),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(ParseError::UnknownTimeframe(other.to_string())),
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

/// Exchange price/lot granularity for one symbol
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SymbolFilters {
    pub tick_size: f64,
    pub step_size: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(open, high, low, close, 1000.0, 0, 60_000).unwrap()
    }

    #[test]
    fn test_candle_rejects_bad_ohlc() {
        assert!(Candle::new(10.0, 9.0, 8.0, 9.5, 1.0, 0, 1).is_err());
        assert!(Candle::new(10.0, 11.0, 10.5, 10.8, 1.0, 0, 1).is_err());
        assert!(Candle::new(f64::NAN, 11.0, 9.0, 10.0, 1.0, 0, 1).is_err());
        assert!(Candle::new(10.0, 11.0, 9.0, 10.0, -1.0, 0, 1).is_err());
    }

    #[test]
    fn test_doji_is_neither_color() {
        let doji = candle(10.0, 11.0, 9.0, 10.0);
        assert!(!doji.is_green());
        assert!(!doji.is_red());
        assert_eq!(doji.body(), 0.0);
        // Doji with any upper wick counts as long
        assert!(doji.has_long_upper_shadow());

        let flat = candle(10.0, 10.0, 9.0, 10.0);
        assert!(!flat.has_long_upper_shadow());
    }

    #[test]
    fn test_long_upper_shadow_threshold() {
        // body 1.0, upper wick 0.6 -> not strictly greater
        assert!(!candle(10.0, 11.6, 10.0, 11.0).has_long_upper_shadow());
        // body 1.0, upper wick 0.7
        assert!(candle(10.0, 11.7, 10.0, 11.0).has_long_upper_shadow());
        // red candle: wick measured from open
        assert!(candle(11.0, 11.8, 10.0, 10.0).has_long_upper_shadow());
    }

    #[test]
    fn test_pattern_names_round_trip_through_str() {
        for pattern in Pattern::ALL {
            assert_eq!(pattern.as_str().parse::<Pattern>().unwrap(), pattern);
        }
        assert!("DOJI".parse::<Pattern>().is_err());

        let parsed: Vec<Pattern> =
            serde_json::from_str(r#"["REVERSAL_DOWN_1","HAMMER","BEARISH_ENGULFING"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                Pattern::ReversalDown1,
                Pattern::Hammer,
                Pattern::BearishEngulfing
            ]
        );
    }

    #[test]
    fn test_timeframe_parse() {
        assert_eq!("5m".parse::<Timeframe>().unwrap(), Timeframe::M5);
        assert_eq!(Timeframe::H1.interval_ms(), 3_600_000);
        assert!("10m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_side_serde() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"BUY\"");
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }
}
