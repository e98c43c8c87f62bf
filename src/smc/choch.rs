//! Change of character detection
//!
//! Flags a volatility regime shift that often precedes a trend reversal:
//! the short-window ATR expanding well past the long-window ATR while the
//! short-window range approaches the long-window range. A detected change
//! of character vetoes signal generation for the scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candles::CandleSeries;
use super::structure::{wilder_atr, Bias};

/// Short-window length in bars
const SHORT_WINDOW: usize = 10;
/// ATR period inside the short window
const SHORT_ATR_PERIOD: usize = 9;
/// Long-window length in bars
const LONG_WINDOW: usize = 50;
/// ATR period inside the long window
const LONG_ATR_PERIOD: usize = 14;
/// Minimum short/long ATR ratio
const MIN_VOLATILITY_RATIO: f64 = 1.4;
/// Short range must exceed this fraction of the long range
const MIN_RANGE_FRACTION: f64 = 0.7;
/// Direction lookback in bars
const DIRECTION_LOOKBACK: usize = 5;

/// A detected change of character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterChange {
    pub bias: Bias,
    pub reason: String,
    /// Short-window ATR over long-window ATR
    pub volatility_ratio: f64,
    pub time: DateTime<Utc>,
}

fn window_range(candles: &[crate::smc::candles::Candle]) -> f64 {
    let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    high - low
}

/// Detect a change of character on the latest bars.
///
/// Returns `None` when the series is too short for either ATR window or
/// when no regime shift is present.
pub fn detect_character_change(series: &CandleSeries) -> Option<CharacterChange> {
    let short = series.tail(SHORT_WINDOW);
    let long = series.tail(LONG_WINDOW);

    let short_atr = wilder_atr(short, SHORT_ATR_PERIOD)?;
    let long_atr = wilder_atr(long, LONG_ATR_PERIOD)?;
    if long_atr <= 0.0 {
        return None;
    }

    let volatility_ratio = short_atr / long_atr;
    if volatility_ratio <= MIN_VOLATILITY_RATIO {
        return None;
    }
    if window_range(short) <= MIN_RANGE_FRACTION * window_range(long) {
        return None;
    }

    let latest = series.close_back(0)?;
    let prior = series.close_back(DIRECTION_LOOKBACK)?;
    let bias = if latest > prior {
        Bias::Bullish
    } else {
        Bias::Bearish
    };

    Some(CharacterChange {
        bias,
        reason: format!(
            "volatility expansion {:.2}x with range breakout",
            volatility_ratio
        ),
        volatility_ratio,
        time: series.last()?.time,
    })
}
