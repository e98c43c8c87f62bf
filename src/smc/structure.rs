//! Market structure analysis
//!
//! Trend classification from a three-EMA stack plus short momentum, ATR in
//! pips for stop scaling, and 3-bar swing pivot extraction shared by the
//! structure-break and liquidity detectors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candles::{Candle, CandleSeries};

/// Fast EMA period
const EMA_FAST: usize = 8;
/// Medium EMA period
const EMA_MEDIUM: usize = 21;
/// Slow EMA period
const EMA_SLOW: usize = 55;
/// Momentum lookback in bars
const MOMENTUM_BARS: usize = 5;
/// ATR period for stop scaling
const ATR_PERIOD: usize = 14;
/// Minimum bars for a trend assessment (slow EMA + momentum lookback)
pub const MIN_TREND_BARS: usize = EMA_SLOW + MOMENTUM_BARS;

/// Directional side of a detected pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bias {
    Bullish,
    Bearish,
}

impl Bias {
    pub fn opposite(&self) -> Bias {
        match self {
            Bias::Bullish => Bias::Bearish,
            Bias::Bearish => Bias::Bullish,
        }
    }
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bias::Bullish => write!(f, "bullish"),
            Bias::Bearish => write!(f, "bearish"),
        }
    }
}

/// Trend classification bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendLabel {
    Bullish,
    Ranging,
    Bearish,
}

impl std::fmt::Display for TrendLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendLabel::Bullish => write!(f, "bullish"),
            TrendLabel::Ranging => write!(f, "ranging"),
            TrendLabel::Bearish => write!(f, "bearish"),
        }
    }
}

/// Trend assessment for one timeframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendAssessment {
    pub label: TrendLabel,
    /// Bullish alignment score, 0..=4
    pub score: u8,
}

impl TrendAssessment {
    /// Strongly directional in the given bias (score >= 3 bullish, <= 1 bearish)
    pub fn is_strong(&self, bias: Bias) -> bool {
        match bias {
            Bias::Bullish => self.label == TrendLabel::Bullish && self.score >= 3,
            Bias::Bearish => self.label == TrendLabel::Bearish && self.score <= 1,
        }
    }

    /// Same direction or ranging — acceptable for the execution timeframe
    pub fn supports(&self, bias: Bias) -> bool {
        match bias {
            Bias::Bullish => matches!(self.label, TrendLabel::Bullish | TrendLabel::Ranging),
            Bias::Bearish => matches!(self.label, TrendLabel::Bearish | TrendLabel::Ranging),
        }
    }
}

/// A local price extremum found by a strict 3-bar pivot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub price: f64,
    pub index: usize,
    pub time: DateTime<Utc>,
    /// Bar volume at the pivot, used as liquidity strength
    pub volume: u64,
}

/// Last value of an SMA-seeded exponential moving average
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    for v in &values[period..] {
        ema += (v - ema) * k;
    }
    Some(ema)
}

/// Wilder-smoothed average true range over a candle slice
pub fn wilder_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| w[1].true_range(w[0].close))
        .collect();
    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    for tr in &true_ranges[period..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
    }
    Some(atr)
}

/// Classify the trend of a series from the EMA stack and 5-bar momentum.
///
/// Scores one point for each of: close above the fast EMA, fast above
/// medium, medium above slow, and close above the close five bars back.
/// Returns `None` below the minimum bar count — no assessment, not an error.
pub fn analyze_trend(series: &CandleSeries) -> Option<TrendAssessment> {
    if series.len() < MIN_TREND_BARS {
        return None;
    }

    let closes: Vec<f64> = series.as_slice().iter().map(|c| c.close).collect();
    let fast = ema(&closes, EMA_FAST)?;
    let medium = ema(&closes, EMA_MEDIUM)?;
    let slow = ema(&closes, EMA_SLOW)?;

    let close = series.close_back(0)?;
    let momentum_ref = series.close_back(MOMENTUM_BARS - 1)?;

    let mut score = 0u8;
    if close > fast {
        score += 1;
    }
    if fast > medium {
        score += 1;
    }
    if medium > slow {
        score += 1;
    }
    if close > momentum_ref {
        score += 1;
    }

    let label = if score >= 3 {
        TrendLabel::Bullish
    } else if score <= 1 {
        TrendLabel::Bearish
    } else {
        TrendLabel::Ranging
    };

    Some(TrendAssessment { label, score })
}

/// 14-period ATR expressed in pips
pub fn atr_pips(series: &CandleSeries, pip_scale: f64) -> Option<f64> {
    wilder_atr(series.as_slice(), ATR_PERIOD).map(|atr| atr / pip_scale)
}

/// Swing highs: bars strictly higher than both neighbors
pub fn swing_highs(series: &CandleSeries) -> Vec<SwingPoint> {
    series
        .windows3(0)
        .filter(|(_, prev, cur, next)| cur.high > prev.high && cur.high > next.high)
        .map(|(i, _, cur, _)| SwingPoint {
            price: cur.high,
            index: i,
            time: cur.time,
            volume: cur.volume,
        })
        .collect()
}

/// Swing lows: bars strictly lower than both neighbors
pub fn swing_lows(series: &CandleSeries) -> Vec<SwingPoint> {
    series
        .windows3(0)
        .filter(|(_, prev, cur, next)| cur.low < prev.low && cur.low < next.low)
        .map(|(i, _, cur, _)| SwingPoint {
            price: cur.low,
            index: i,
            time: cur.time,
            volume: cur.volume,
        })
        .collect()
}
