//! Liquidity pool detection
//!
//! Stop orders cluster just beyond swing extremes: above swing highs
//! (buy-side liquidity) and below swing lows (sell-side). The engine uses
//! nearby pools only as a confidence multiplier, never as a hard filter.

use serde::{Deserialize, Serialize};

use super::candles::CandleSeries;
use super::structure::{swing_highs, swing_lows, Bias};

/// Bars scanned for pool pivots
const LOOKBACK: usize = 50;
/// Highest-volume pools kept
const TOP_POOLS: usize = 3;

/// Which side of the book the resting stops sit on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolSide {
    /// Stops above swing highs
    BuySide,
    /// Stops below swing lows
    SellSide,
}

impl PoolSide {
    /// The pool side a candidate of the given bias trades into
    pub fn for_bias(bias: Bias) -> PoolSide {
        match bias {
            Bias::Bullish => PoolSide::BuySide,
            Bias::Bearish => PoolSide::SellSide,
        }
    }
}

/// A resting-liquidity level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub side: PoolSide,
    pub level: f64,
    /// Distance from the current close in pips
    pub distance_pips: f64,
    /// Pivot bar volume
    pub strength: u64,
}

/// Find the strongest liquidity pools on one side of the market.
///
/// Scans the last 50 bars for swing pivots, ranks them by pivot volume
/// descending and keeps the top three.
pub fn detect_liquidity_pools(
    series: &CandleSeries,
    pip_scale: f64,
    side: PoolSide,
) -> Vec<LiquidityPool> {
    let Some(close) = series.close_back(0) else {
        return Vec::new();
    };
    let window = CandleSeries::new(series.tail(LOOKBACK).to_vec());

    let pivots = match side {
        PoolSide::BuySide => swing_highs(&window),
        PoolSide::SellSide => swing_lows(&window),
    };

    let mut pools: Vec<LiquidityPool> = pivots
        .into_iter()
        .map(|p| LiquidityPool {
            side,
            level: p.price,
            distance_pips: (p.price - close).abs() / pip_scale,
            strength: p.volume,
        })
        .collect();

    pools.sort_by(|a, b| b.strength.cmp(&a.strength));
    pools.truncate(TOP_POOLS);
    pools
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smc::candles::test_series::candle_at;
    use crate::smc::candles::{Candle, CandleSeries};

    const PIP: f64 = 0.0001;

    /// Alternating highs so every odd bar is a swing high, with volume
    /// rising by bar index.
    fn pivot_series() -> CandleSeries {
        let candles: Vec<Candle> = (0..20)
            .map(|i| {
                let bump = if i % 2 == 1 { 0.0010 } else { 0.0 };
                candle_at(
                    i,
                    1.1000,
                    1.1010 + bump,
                    1.0990 - bump,
                    1.1000,
                    100 + i as u64 * 10,
                )
            })
            .collect();
        CandleSeries::new(candles)
    }

    #[test]
    fn test_top_three_by_volume() {
        let pools = detect_liquidity_pools(&pivot_series(), PIP, PoolSide::BuySide);
        assert_eq!(pools.len(), TOP_POOLS);
        // Sorted by strength descending.
        assert!(pools.windows(2).all(|w| w[0].strength >= w[1].strength));
        // Strongest pivot is the latest odd bar (index 17 here: index 19 is
        // the window edge and cannot be a pivot).
        assert_eq!(pools[0].strength, 100 + 17 * 10);
    }

    #[test]
    fn test_distance_in_pips() {
        let pools = detect_liquidity_pools(&pivot_series(), PIP, PoolSide::BuySide);
        for pool in &pools {
            assert!((pool.distance_pips - 20.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sell_side_uses_lows() {
        let pools = detect_liquidity_pools(&pivot_series(), PIP, PoolSide::SellSide);
        assert!(!pools.is_empty());
        assert!(pools.iter().all(|p| p.level < 1.1000));
    }

    #[test]
    fn test_empty_series() {
        let series = CandleSeries::new(Vec::new());
        assert!(detect_liquidity_pools(&series, PIP, PoolSide::BuySide).is_empty());
    }
}
