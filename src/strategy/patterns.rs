//! Three-candle reversal patterns.
//!
//! Both patterns look for a green candle with a long upper wick that is
//! immediately rejected by the next candle. They differ in the colour of the
//! first candle, so at most one of them can hold for a given triple.

use crate::models::{Candle, Pattern};

/// Evaluate the reversal patterns over (oldest, middle, newest)
pub fn match_reversal(n1: &Candle, n2: &Candle, n3: &Candle) -> Option<Pattern> {
    if reversal_down_1(n1, n2, n3) {
        Some(Pattern::ReversalDown1)
    } else if reversal_down_2(n1, n2, n3) {
        Some(Pattern::ReversalDown2)
    } else {
        None
    }
}

/// Red, then green with a long upper wick, then a close below the green candle's low
pub fn reversal_down_1(n1: &Candle, n2: &Candle, n3: &Candle) -> bool {
    n1.is_red() && is_rejected_push(n2) && n3.close < n2.low
}

/// Green, then green with a long upper wick, then red closing below the second open
pub fn reversal_down_2(n1: &Candle, n2: &Candle, n3: &Candle) -> bool {
    n1.is_green() && is_rejected_push(n2) && n3.is_red() && n3.close < n2.open
}

fn is_rejected_push(candle: &Candle) -> bool {
    candle.is_green() && candle.has_long_upper_shadow()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(open, high, low, close, 1000.0, 0, 1).unwrap()
    }

    // Green with body 1.0 and upper wick 1.0
    fn wicked_green() -> Candle {
        c(10.0, 12.0, 9.5, 11.0)
    }

    #[test]
    fn test_reversal_down_1() {
        let n1 = c(11.0, 11.2, 9.8, 10.0);
        let n3 = c(10.5, 10.6, 9.0, 9.2); // close 9.2 < n2.low 9.5

        assert_eq!(
            match_reversal(&n1, &wicked_green(), &n3),
            Some(Pattern::ReversalDown1)
        );
        assert!(!reversal_down_2(&n1, &wicked_green(), &n3));
    }

    #[test]
    fn test_reversal_down_1_needs_close_below_low() {
        let n1 = c(11.0, 11.2, 9.8, 10.0);
        let n3 = c(10.5, 10.6, 9.4, 9.5); // close == n2.low

        assert_eq!(match_reversal(&n1, &wicked_green(), &n3), None);
    }

    #[test]
    fn test_reversal_down_1_green_third_candle_still_counts() {
        // Gap-down green candle still closes under the wick candle's low
        let n1 = c(11.0, 11.2, 9.8, 10.0);
        let n3 = c(8.0, 9.2, 7.9, 9.0);

        assert_eq!(
            match_reversal(&n1, &wicked_green(), &n3),
            Some(Pattern::ReversalDown1)
        );
    }

    #[test]
    fn test_reversal_down_2() {
        let n1 = c(9.0, 10.2, 8.9, 10.0);
        let n3 = c(10.8, 10.9, 9.7, 9.8); // red, close 9.8 < n2.open 10.0

        assert_eq!(
            match_reversal(&n1, &wicked_green(), &n3),
            Some(Pattern::ReversalDown2)
        );
    }

    #[test]
    fn test_reversal_down_2_needs_red_third() {
        let n1 = c(9.0, 10.2, 8.9, 10.0);
        let n3 = c(9.8, 9.9, 9.7, 9.8); // doji

        assert_eq!(match_reversal(&n1, &wicked_green(), &n3), None);
    }

    #[test]
    fn test_short_wick_blocks_both() {
        let n1 = c(11.0, 11.2, 9.8, 10.0);
        let short_wick = c(10.0, 11.5, 9.5, 11.0); // wick 0.5 < 0.6
        let n3 = c(10.5, 10.6, 9.0, 9.2);

        assert_eq!(match_reversal(&n1, &short_wick, &n3), None);
    }

    #[test]
    fn test_doji_first_candle_fails_both() {
        let doji = c(10.0, 10.5, 9.5, 10.0);
        let n3 = c(10.5, 10.6, 9.0, 9.2);

        assert_eq!(match_reversal(&doji, &wicked_green(), &n3), None);
    }

    #[test]
    fn test_doji_middle_candle_is_not_green() {
        let n1 = c(11.0, 11.2, 9.8, 10.0);
        let doji = c(10.0, 11.0, 9.5, 10.0);
        let n3 = c(10.5, 10.6, 9.0, 9.2);

        assert_eq!(match_reversal(&n1, &doji, &n3), None);
    }

    #[test]
    fn test_patterns_are_mutually_exclusive() {
        let n2 = wicked_green();
        let n3 = c(10.5, 10.6, 9.0, 9.2);
        let firsts = [
            c(11.0, 11.2, 9.8, 10.0),
            c(9.0, 10.2, 8.9, 10.0),
            c(10.0, 10.5, 9.5, 10.0),
        ];

        for n1 in &firsts {
            let both = reversal_down_1(n1, &n2, &n3) && reversal_down_2(n1, &n2, &n3);
            assert!(!both);
        }
    }
}
