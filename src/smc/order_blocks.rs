//! Order block detection
//!
//! An order block is the last candle of a move before a strong continuation
//! through it: a bullish candle whose successor closes above its high (or
//! the bearish mirror). The block's low/high marks the institutional entry
//! zone and the stop sits an ATR-scaled buffer on the adverse side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candles::CandleSeries;
use super::structure::{atr_pips, Bias};

/// Thresholds for order block emission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBlockParams {
    /// Minimum block range in pips
    pub min_size_pips: f64,
    /// Stop buffer as a multiple of ATR pips
    pub stop_atr_mult: f64,
    /// Most recent blocks kept
    pub keep: usize,
}

impl Default for OrderBlockParams {
    fn default() -> Self {
        Self {
            min_size_pips: 8.0,
            stop_atr_mult: 0.4,
            keep: 8,
        }
    }
}

impl OrderBlockParams {
    /// Wider thresholds for the swing pipeline
    pub fn swing() -> Self {
        Self {
            min_size_pips: 15.0,
            stop_atr_mult: 0.5,
            keep: 6,
        }
    }
}

/// A detected order block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    pub bias: Bias,
    /// Entry edge of the block (low for bullish, high for bearish)
    pub price: f64,
    /// Stop level on the adverse side of `price`
    pub stop: f64,
    /// Volume ratio against the prior bar
    pub strength: f64,
    pub time: DateTime<Utc>,
}

/// Scan the interior of a series for order blocks.
///
/// The first and last two bars are excluded so the prior-bar volume and the
/// confirming next candle always exist. Only blocks whose range clears
/// `min_size_pips` are emitted; the most recent `keep` survive.
pub fn detect_order_blocks(
    series: &CandleSeries,
    pip_scale: f64,
    params: &OrderBlockParams,
) -> Vec<OrderBlock> {
    let Some(atr) = atr_pips(series, pip_scale) else {
        return Vec::new();
    };
    let stop_buffer = atr * params.stop_atr_mult * pip_scale;

    let mut blocks = Vec::new();
    for (_, prev, candle, next) in series.windows3(1) {
        if candle.range() / pip_scale < params.min_size_pips {
            continue;
        }
        let strength = if prev.volume > 0 {
            candle.volume as f64 / prev.volume as f64
        } else {
            0.0
        };

        if candle.is_bullish() && next.close > candle.high {
            blocks.push(OrderBlock {
                bias: Bias::Bullish,
                price: candle.low,
                stop: candle.low - stop_buffer,
                strength,
                time: candle.time,
            });
        } else if candle.is_bearish() && next.close < candle.low {
            blocks.push(OrderBlock {
                bias: Bias::Bearish,
                price: candle.high,
                stop: candle.high + stop_buffer,
                strength,
                time: candle.time,
            });
        }
    }

    let drop = blocks.len().saturating_sub(params.keep);
    blocks.split_off(drop)
}
