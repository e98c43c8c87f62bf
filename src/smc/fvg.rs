//! Fair value gap detection
//!
//! A three-candle imbalance where the first and third candles do not
//! overlap. The unfilled span between them is the gap; price tends to
//! retrace into it, so the engine requires the live entry price to sit
//! inside a matching gap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candles::CandleSeries;
use super::structure::Bias;

/// Bounds for gap emission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FvgParams {
    pub min_pips: f64,
    pub max_pips: f64,
    /// Most recent gaps kept
    pub keep: usize,
}

impl Default for FvgParams {
    fn default() -> Self {
        Self {
            min_pips: 3.0,
            max_pips: 20.0,
            keep: 12,
        }
    }
}

impl FvgParams {
    /// Wider bounds for the swing pipeline
    pub fn swing() -> Self {
        Self {
            min_pips: 8.0,
            max_pips: 60.0,
            keep: 8,
        }
    }
}

/// A detected fair value gap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairValueGap {
    pub bias: Bias,
    pub top: f64,
    pub bottom: f64,
    pub mid: f64,
    pub size_pips: f64,
    pub time: DateTime<Utc>,
}

impl FairValueGap {
    /// Whether `price` sits inside the gap span
    pub fn contains(&self, price: f64) -> bool {
        self.bottom <= price && price <= self.top
    }
}

/// Scan the interior of a series for fair value gaps.
///
/// Bullish: the bar after the window low sits fully above the bar before it
/// (`next.low > prev.high`); bearish is the mirror. Gaps outside the
/// [min, max] pip bounds are discarded at emission; the most recent `keep`
/// survive.
pub fn detect_fair_value_gaps(
    series: &CandleSeries,
    pip_scale: f64,
    params: &FvgParams,
) -> Vec<FairValueGap> {
    let mut gaps = Vec::new();

    for (_, prev, candle, next) in series.windows3(0) {
        if next.low > prev.high {
            let size_pips = (next.low - prev.high) / pip_scale;
            if size_pips >= params.min_pips && size_pips <= params.max_pips {
                gaps.push(FairValueGap {
                    bias: Bias::Bullish,
                    top: next.low,
                    bottom: prev.high,
                    mid: (next.low + prev.high) / 2.0,
                    size_pips,
                    time: candle.time,
                });
            }
        } else if next.high < prev.low {
            let size_pips = (prev.low - next.high) / pip_scale;
            if size_pips >= params.min_pips && size_pips <= params.max_pips {
                gaps.push(FairValueGap {
                    bias: Bias::Bearish,
                    top: prev.low,
                    bottom: next.high,
                    mid: (prev.low + next.high) / 2.0,
                    size_pips,
                    time: candle.time,
                });
            }
        }
    }

    let drop = gaps.len().saturating_sub(params.keep);
    gaps.split_off(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smc::candles::test_series::candle_at;
    use crate::smc::candles::CandleSeries;

    const PIP: f64 = 0.0001;

    /// Three candles engineered to leave a bullish gap of exactly `gap_pips`.
    fn gap_series(gap_pips: f64) -> CandleSeries {
        let gap = gap_pips * PIP;
        CandleSeries::new(vec![
            candle_at(0, 1.1000, 1.1010, 1.0995, 1.1008, 100),
            candle_at(1, 1.1012, 1.1030, 1.1011, 1.1028, 180),
            candle_at(2, 1.1030, 1.1040, 1.1010 + gap, 1.1035, 120),
        ])
    }

    #[test]
    fn test_exact_gap_size_and_midpoint() {
        let series = gap_series(6.0);
        let gaps = detect_fair_value_gaps(&series, PIP, &FvgParams::default());
        assert_eq!(gaps.len(), 1);
        let gap = &gaps[0];
        assert_eq!(gap.bias, Bias::Bullish);
        assert!((gap.size_pips - 6.0).abs() < 1e-9);
        assert!((gap.mid - (gap.top + gap.bottom) / 2.0).abs() < 1e-12);
        assert!((gap.bottom - 1.1010).abs() < 1e-9);
    }

    #[test]
    fn test_gap_outside_bounds_discarded() {
        let params = FvgParams::default();
        // Below min.
        assert!(detect_fair_value_gaps(&gap_series(2.0), PIP, &params).is_empty());
        // Above max.
        assert!(detect_fair_value_gaps(&gap_series(25.0), PIP, &params).is_empty());
        // Inside swing bounds though.
        assert_eq!(
            detect_fair_value_gaps(&gap_series(25.0), PIP, &FvgParams::swing()).len(),
            1
        );
    }

    #[test]
    fn test_bearish_gap_mirror() {
        let series = CandleSeries::new(vec![
            candle_at(0, 1.1040, 1.1045, 1.1030, 1.1032, 100),
            candle_at(1, 1.1030, 1.1031, 1.1010, 1.1012, 200),
            candle_at(2, 1.1010, 1.1024, 1.1000, 1.1005, 150),
        ]);
        let gaps = detect_fair_value_gaps(&series, PIP, &FvgParams::default());
        assert_eq!(gaps.len(), 1);
        let gap = &gaps[0];
        assert_eq!(gap.bias, Bias::Bearish);
        assert!((gap.top - 1.1030).abs() < 1e-9);
        assert!((gap.bottom - 1.1024).abs() < 1e-9);
        assert!((gap.size_pips - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_contains() {
        let gap = FairValueGap {
            bias: Bias::Bullish,
            top: 1.1016,
            bottom: 1.1010,
            mid: 1.1013,
            size_pips: 6.0,
            time: crate::smc::candles::test_series::bar_time(0),
        };
        assert!(gap.contains(1.1013));
        assert!(gap.contains(1.1010));
        assert!(gap.contains(1.1016));
        assert!(!gap.contains(1.1017));
    }
}
