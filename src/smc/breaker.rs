//! Breaker block detection
//!
//! A breaker is a support or resistance level that was pierced and then
//! reclaimed within the same bar — a failed breakdown or breakout. The
//! swing engine treats an opposing breaker near a candidate's stop as a
//! risk zone and vetoes the entry.

use serde::{Deserialize, Serialize};

use super::candles::CandleSeries;
use super::structure::Bias;

/// Bars scanned for breakers
const LOOKBACK: usize = 30;
/// Rolling support/resistance window length
const LEVEL_WINDOW: usize = 5;
/// Most recent breakers kept
const KEEP: usize = 4;

/// A failed-break level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerBlock {
    pub bias: Bias,
    pub level: f64,
    /// Distance from the current close in pips
    pub distance_pips: f64,
    /// Depth of the failed pierce in pips
    pub strength_pips: f64,
}

/// Detect breaker blocks over the last 30 bars.
///
/// For each bar with at least five predecessors, the rolling 5-bar min low
/// is support and max high is resistance. A bullish breaker is a bar whose
/// low pierces support but whose close reclaims it; the bearish mirror
/// pierces resistance. The most recent four survive.
pub fn detect_breaker_blocks(series: &CandleSeries, pip_scale: f64) -> Vec<BreakerBlock> {
    let Some(close) = series.close_back(0) else {
        return Vec::new();
    };
    let window = series.tail(LOOKBACK);

    let mut breakers = Vec::new();
    for i in LEVEL_WINDOW..window.len() {
        let lookback = &window[i - LEVEL_WINDOW..i];
        let support = lookback.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let resistance = lookback.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let bar = &window[i];

        if bar.low < support && bar.close > support {
            breakers.push(BreakerBlock {
                bias: Bias::Bullish,
                level: support,
                distance_pips: (support - close).abs() / pip_scale,
                strength_pips: (support - bar.low) / pip_scale,
            });
        } else if bar.high > resistance && bar.close < resistance {
            breakers.push(BreakerBlock {
                bias: Bias::Bearish,
                level: resistance,
                distance_pips: (resistance - close).abs() / pip_scale,
                strength_pips: (bar.high - resistance) / pip_scale,
            });
        }
    }

    let drop = breakers.len().saturating_sub(KEEP);
    breakers.split_off(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smc::candles::test_series::candle_at;
    use crate::smc::candles::{Candle, CandleSeries};

    const PIP: f64 = 0.0001;

    fn quiet(i: usize) -> Candle {
        candle_at(i, 1.1000, 1.1010, 1.0990, 1.1000, 100)
    }

    #[test]
    fn test_failed_breakdown_is_bullish_breaker() {
        let mut candles: Vec<Candle> = (0..10).map(quiet).collect();
        // Pierces the 1.0990 support by 8 pips but closes back above it.
        candles.push(candle_at(10, 1.1000, 1.1005, 1.0982, 1.0998, 250));
        candles.push(quiet(11));
        let series = CandleSeries::new(candles);

        let breakers = detect_breaker_blocks(&series, PIP);
        assert_eq!(breakers.len(), 1);
        let b = &breakers[0];
        assert_eq!(b.bias, Bias::Bullish);
        assert!((b.level - 1.0990).abs() < 1e-9);
        assert!((b.strength_pips - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_failed_breakout_is_bearish_breaker() {
        let mut candles: Vec<Candle> = (0..10).map(quiet).collect();
        candles.push(candle_at(10, 1.1000, 1.1018, 1.0995, 1.1002, 250));
        candles.push(quiet(11));
        let series = CandleSeries::new(candles);

        let breakers = detect_breaker_blocks(&series, PIP);
        assert_eq!(breakers.len(), 1);
        assert_eq!(breakers[0].bias, Bias::Bearish);
        assert!((breakers[0].level - 1.1010).abs() < 1e-9);
    }

    #[test]
    fn test_clean_breakdown_not_a_breaker() {
        let mut candles: Vec<Candle> = (0..10).map(quiet).collect();
        // Breaks support and closes below it: a real breakdown, no breaker.
        candles.push(candle_at(10, 1.1000, 1.1002, 1.0975, 1.0980, 250));
        let series = CandleSeries::new(candles);
        assert!(detect_breaker_blocks(&series, PIP).is_empty());
    }

    #[test]
    fn test_keeps_most_recent_four() {
        let mut candles: Vec<Candle> = (0..6).map(quiet).collect();
        for j in 0..6 {
            let i = 6 + j * 2;
            candles.push(candle_at(i, 1.1000, 1.1005, 1.0982, 1.0998, 250));
            candles.push(quiet(i + 1));
        }
        let series = CandleSeries::new(candles);
        assert!(detect_breaker_blocks(&series, PIP).len() <= KEEP);
    }
}
