//! Break of structure detection
//!
//! A break of structure confirms trend continuation: the current bar trades
//! through the most recent swing extreme, and that extreme itself extended
//! the one before it. A single level break without the stair-step does not
//! qualify.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candles::CandleSeries;
use super::structure::{swing_highs, swing_lows, Bias};

/// A confirmed break of structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureBreak {
    pub bias: Bias,
    /// The swing level that was broken
    pub broken_level: f64,
    /// The price that broke it (current bar extreme)
    pub breakout_price: f64,
    pub strength_pips: f64,
    pub time: DateTime<Utc>,
}

/// Detect a break of structure on the latest bar.
///
/// Needs at least two swing highs and two swing lows in the window; absence
/// of a qualifying break is a `None`, not an error.
pub fn detect_structure_break(series: &CandleSeries, pip_scale: f64) -> Option<StructureBreak> {
    let highs = swing_highs(series);
    let lows = swing_lows(series);
    if highs.len() < 2 || lows.len() < 2 {
        return None;
    }

    let current = series.last()?;

    // Bullish: rising swing highs and the current bar clearing the latest.
    let last_high = &highs[highs.len() - 1];
    let prior_high = &highs[highs.len() - 2];
    if current.high > last_high.price && last_high.price > prior_high.price {
        return Some(StructureBreak {
            bias: Bias::Bullish,
            broken_level: last_high.price,
            breakout_price: current.high,
            strength_pips: (current.high - last_high.price) / pip_scale,
            time: current.time,
        });
    }

    // Bearish mirror on falling swing lows.
    let last_low = &lows[lows.len() - 1];
    let prior_low = &lows[lows.len() - 2];
    if current.low < last_low.price && last_low.price < prior_low.price {
        return Some(StructureBreak {
            bias: Bias::Bearish,
            broken_level: last_low.price,
            breakout_price: current.low,
            strength_pips: (last_low.price - current.low) / pip_scale,
            time: current.time,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smc::candles::test_series::candle_at;
    use crate::smc::candles::{Candle, CandleSeries};

    const PIP: f64 = 0.0001;

    fn bar(i: usize, low: f64, high: f64) -> Candle {
        candle_at(i, low + 0.0001, high, low, high - 0.0001, 100)
    }

    /// Rising swing highs at 1.1020 then 1.1040, rising lows, and a final
    /// bar whose high clears the latest swing high by `break_pips`.
    fn stair_step_series(break_pips: f64) -> CandleSeries {
        CandleSeries::new(vec![
            bar(0, 1.0990, 1.1005),
            bar(1, 1.0985, 1.1000), // swing low 1.0985
            bar(2, 1.0995, 1.1020), // swing high 1.1020
            bar(3, 1.0992, 1.1010),
            bar(4, 1.0996, 1.1012),
            bar(5, 1.0994, 1.1008), // swing low 1.0994
            bar(6, 1.1000, 1.1040), // swing high 1.1040
            bar(7, 1.1005, 1.1030),
            bar(8, 1.1010, 1.1040 + break_pips * PIP),
        ])
    }

    #[test]
    fn test_bullish_bos() {
        let series = stair_step_series(5.0);
        let bos = detect_structure_break(&series, PIP).expect("bos");
        assert_eq!(bos.bias, Bias::Bullish);
        assert!((bos.broken_level - 1.1040).abs() < 1e-9);
        assert!((bos.strength_pips - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_break_when_level_holds() {
        let series = stair_step_series(-5.0);
        assert!(detect_structure_break(&series, PIP).is_none());
    }

    #[test]
    fn test_requires_two_swings_each_side() {
        // Monotonic rise: no strict swing pivots at all.
        let series = CandleSeries::new(
            (0..10)
                .map(|i| bar(i, 1.1000 + i as f64 * 0.0010, 1.1015 + i as f64 * 0.0010))
                .collect(),
        );
        assert!(detect_structure_break(&series, PIP).is_none());
    }

    #[test]
    fn test_falling_highs_do_not_qualify() {
        // Two swing highs but the later one is lower: breaking it is not a
        // continuation pattern.
        let series = CandleSeries::new(vec![
            bar(0, 1.1000, 1.1010),
            bar(1, 1.1005, 1.1050), // swing high 1.1050
            bar(2, 1.0995, 1.1005),
            bar(3, 1.0990, 1.1000), // swing low 1.0990
            bar(4, 1.1000, 1.1030), // swing high 1.1030 (lower)
            bar(5, 1.0994, 1.1005), // swing low 1.0994...
            bar(6, 1.1000, 1.1035),
        ])
        ;
        let bos = detect_structure_break(&series, PIP);
        assert!(bos.is_none() || bos.unwrap().bias != Bias::Bullish);
    }
}
