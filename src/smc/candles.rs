//! Candle series primitives
//!
//! All detectors operate on a `CandleSeries`: an ordered, time-ascending
//! window of OHLCV candles with bounds-checked access. Neighbor lookups go
//! through the window helpers so boundary bars can never be indexed out of
//! range.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chart timeframe for a candle request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// Venue granularity code (OANDA-style)
    pub fn granularity(&self) -> &'static str {
        match self {
            Timeframe::M15 => "M15",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.granularity())
    }
}

/// A single OHLCV candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Candle {
    /// Close above open
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Close below open
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// High minus low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// True range against the previous close
    pub fn true_range(&self, prev_close: f64) -> f64 {
        (self.high - self.low)
            .max((self.high - prev_close).abs())
            .max((self.low - prev_close).abs())
    }
}

/// Time-ascending candle window with a fixed lookback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Build a series from candles, enforcing ascending time order
    pub fn new(mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.time);
        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Candle> {
        self.candles.get(idx)
    }

    /// Most recent candle
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// Close of the bar `offset` bars back from the end (0 = latest)
    pub fn close_back(&self, offset: usize) -> Option<f64> {
        let len = self.candles.len();
        if offset >= len {
            return None;
        }
        Some(self.candles[len - 1 - offset].close)
    }

    /// Last `n` candles (clamped to the series length)
    pub fn tail(&self, n: usize) -> &[Candle] {
        let start = self.candles.len().saturating_sub(n);
        &self.candles[start..]
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    /// Centered 3-bar windows `(index, prev, cur, next)` over the interior,
    /// skipping `margin` extra bars at each edge beyond the immediate
    /// neighbors. `margin = 0` yields indices `1..len-1`.
    pub fn windows3(
        &self,
        margin: usize,
    ) -> impl Iterator<Item = (usize, &Candle, &Candle, &Candle)> + '_ {
        let lo = 1 + margin;
        let hi = self.candles.len().saturating_sub(1 + margin);
        (lo..hi).filter_map(move |i| {
            Some((
                i,
                self.candles.get(i - 1)?,
                self.candles.get(i)?,
                self.candles.get(i + 1)?,
            ))
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn candle(i: i64, close: f64) -> Candle {
        Candle {
            time: Utc.timestamp_opt(i * 60, 0).unwrap(),
            open: close,
            high: close + 0.0005,
            low: close - 0.0005,
            close,
            volume: 100,
        }
    }

    #[test]
    fn test_series_sorted_ascending() {
        let series = CandleSeries::new(vec![candle(3, 1.2), candle(1, 1.0), candle(2, 1.1)]);
        let times: Vec<_> = series.as_slice().iter().map(|c| c.time).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_close_back() {
        let series = CandleSeries::new((0..10).map(|i| candle(i, i as f64)).collect());
        assert_eq!(series.close_back(0), Some(9.0));
        assert_eq!(series.close_back(5), Some(4.0));
        assert_eq!(series.close_back(10), None);
    }

    #[test]
    fn test_tail_clamps() {
        let series = CandleSeries::new((0..5).map(|i| candle(i, 1.0)).collect());
        assert_eq!(series.tail(3).len(), 3);
        assert_eq!(series.tail(50).len(), 5);
    }

    proptest! {
        // Window iteration never reaches outside the buffer, for any length
        // and margin combination.
        #[test]
        fn windows3_stays_in_bounds(len in 0usize..40, margin in 0usize..5) {
            let series = CandleSeries::new((0..len as i64).map(|i| candle(i, 1.0)).collect());
            for (i, _prev, _cur, _next) in series.windows3(margin) {
                prop_assert!(i >= 1 + margin);
                prop_assert!(i + 1 + margin < len);
            }
        }

        #[test]
        fn tail_never_out_of_range(len in 0usize..40, n in 0usize..80) {
            let series = CandleSeries::new((0..len as i64).map(|i| candle(i, 1.0)).collect());
            prop_assert!(series.tail(n).len() <= len);
        }
    }
}
