//! Position sizing and take-profit ladders

use serde::{Deserialize, Serialize};

use super::signal::Direction;

/// Minimum venue lot
const MIN_LOT: f64 = 0.01;
/// Approximate pip value per standard lot for JPY-quoted pairs
const JPY_PIP_VALUE_PER_LOT: f64 = 6.5;
/// Approximate pip value per standard lot for 4-decimal pairs
const DEFAULT_PIP_VALUE_PER_LOT: f64 = 10.0;

/// Sizing configuration for one trade type
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskSizer {
    /// Fixed lot per trade; disables risk-based sizing when > 0
    pub fixed_lot: f64,
    /// Fraction of balance risked per trade in risk-based mode
    pub risk_percent: f64,
}

/// Three take-profit levels with increasing reward multiples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TpLevels {
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Price precision for a pip scale: 3 decimals for JPY-quoted pairs,
/// 5 otherwise.
fn price_decimals(pip_scale: f64) -> u32 {
    if pip_scale >= 0.005 {
        3
    } else {
        5
    }
}

/// Approximate account-currency value of one pip per standard lot
pub fn pip_value_per_lot(pip_scale: f64) -> f64 {
    if pip_scale >= 0.005 {
        JPY_PIP_VALUE_PER_LOT
    } else {
        DEFAULT_PIP_VALUE_PER_LOT
    }
}

impl RiskSizer {
    /// Lot size for a trade with the given stop distance.
    ///
    /// Fixed-lot mode ignores the stop distance entirely; risk-based mode
    /// sizes so the stop costs `balance * risk_percent`, floored at the
    /// venue minimum. Both round to two decimals.
    pub fn position_size(&self, balance: f64, stop_pips: f64, pip_scale: f64) -> f64 {
        if self.fixed_lot > 0.0 {
            return round_to(self.fixed_lot, 2);
        }

        let risk_amount = balance * self.risk_percent;
        let size = risk_amount / (stop_pips * pip_value_per_lot(pip_scale));
        round_to(size.max(MIN_LOT), 2)
    }

    /// Take-profit ladder from the entry/stop distance, direction-signed and
    /// rounded to the pair's price precision.
    pub fn tp_levels(
        &self,
        entry: f64,
        stop: f64,
        direction: Direction,
        pip_scale: f64,
        multipliers: [f64; 3],
    ) -> TpLevels {
        let decimals = price_decimals(pip_scale);
        let risk = (entry - stop).abs();
        let sign = match direction {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
        };
        TpLevels {
            tp1: round_to(entry + sign * risk * multipliers[0], decimals),
            tp2: round_to(entry + sign * risk * multipliers[1], decimals),
            tp3: round_to(entry + sign * risk * multipliers[2], decimals),
        }
    }
}
