//! Signal engine
//!
//! Fuses the detectors into one ranked decision per scan. Both pipelines
//! share the same skeleton:
//!
//! 1. Decision-timeframe trend strongly directional, execution timeframe
//!    supportive (same direction or ranging)
//! 2. Matching break of structure on the bias timeframe; a change of
//!    character there vetoes the whole scan
//! 3. Order blocks filtered by distance and strength
//! 4. Fair value gaps that contain the live entry price, with the block
//!    stop inside the pip bounds
//! 5. Size, take-profit ladder, confidence scoring
//! 6. Swing only: breaker-block veto near the stop
//! 7. Highest confidence wins; ties keep detector emission order
//!
//! The scalp pipeline runs M15 entries against an H1 bias; the swing
//! pipeline runs H1 entries against an H4 bias with the D1 trend deciding.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::bos::detect_structure_break;
use super::breaker::{detect_breaker_blocks, BreakerBlock};
use super::candles::CandleSeries;
use super::choch::detect_character_change;
use super::fvg::{detect_fair_value_gaps, FvgParams};
use super::liquidity::{detect_liquidity_pools, PoolSide};
use super::order_blocks::{detect_order_blocks, OrderBlockParams};
use super::risk::RiskSizer;
use super::structure::{analyze_trend, Bias};

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// Pattern bias this direction trades with
    pub fn bias(&self) -> Bias {
        match self {
            Direction::Buy => Bias::Bullish,
            Direction::Sell => Bias::Bearish,
        }
    }

    /// Signed pip distance from `entry` to `price` in the profitable
    /// direction
    pub fn signed_pips(&self, entry: f64, price: f64, pip_scale: f64) -> f64 {
        match self {
            Direction::Buy => (price - entry) / pip_scale,
            Direction::Sell => (entry - price) / pip_scale,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "buy"),
            Direction::Sell => write!(f, "sell"),
        }
    }
}

/// Scalp or swing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeKind {
    Scalp,
    Swing,
}

impl std::fmt::Display for TradeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeKind::Scalp => write!(f, "scalp"),
            TradeKind::Swing => write!(f, "swing"),
        }
    }
}

/// Per-pipeline engine thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineParams {
    pub order_blocks: OrderBlockParams,
    pub gaps: FvgParams,
    /// Maximum pips from entry price back to the block edge
    pub max_ob_distance_pips: f64,
    /// Minimum block volume ratio
    pub min_ob_strength: f64,
    pub min_stop_pips: f64,
    pub max_stop_pips: f64,
    pub tp_multipliers: [f64; 3],
    pub sizer: RiskSizer,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            order_blocks: OrderBlockParams::default(),
            gaps: FvgParams::default(),
            max_ob_distance_pips: 8.0,
            min_ob_strength: 1.2,
            min_stop_pips: 5.0,
            max_stop_pips: 25.0,
            tp_multipliers: [1.5, 2.0, 2.5],
            sizer: RiskSizer { fixed_lot: 0.02, risk_percent: 0.25 },
        }
    }
}

impl EngineParams {
    /// Wider thresholds for the swing pipeline
    pub fn swing() -> Self {
        Self {
            order_blocks: OrderBlockParams::swing(),
            gaps: FvgParams::swing(),
            max_ob_distance_pips: 20.0,
            min_ob_strength: 1.1,
            min_stop_pips: 15.0,
            max_stop_pips: 60.0,
            tp_multipliers: [2.0, 3.0, 4.0],
            sizer: RiskSizer { fixed_lot: 0.02, risk_percent: 0.25 },
        }
    }
}

/// An immutable trade proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub trade_type: TradeKind,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    pub volume: f64,
    pub stop_pips: f64,
    pub confidence: f64,
    /// Entry edge of the supporting order block
    pub order_block_price: f64,
    /// Midpoint of the supporting fair value gap
    pub fvg_mid: f64,
    pub time: chrono::DateTime<Utc>,
}

/// Market inputs for one scalp scan
#[derive(Debug)]
pub struct ScalpScan<'a> {
    pub symbol: &'a str,
    pub pip_scale: f64,
    pub bid: f64,
    pub ask: f64,
    pub balance: f64,
    /// Entry timeframe (M15)
    pub entry: &'a CandleSeries,
    /// Bias timeframe (H1)
    pub bias: &'a CandleSeries,
}

/// Market inputs for one swing scan
#[derive(Debug)]
pub struct SwingScan<'a> {
    pub symbol: &'a str,
    pub pip_scale: f64,
    pub bid: f64,
    pub ask: f64,
    pub balance: f64,
    /// Entry timeframe (H1)
    pub entry: &'a CandleSeries,
    /// Bias timeframe (H4)
    pub bias: &'a CandleSeries,
    /// Decision timeframe (D1)
    pub higher: &'a CandleSeries,
}

/// Signal engine holding both pipelines' thresholds
#[derive(Debug, Clone)]
pub struct SignalEngine {
    pub scalp: EngineParams,
    pub swing: EngineParams,
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self {
            scalp: EngineParams::default(),
            swing: EngineParams::swing(),
        }
    }
}

impl SignalEngine {
    /// Best scalp candidate for this scan, if any
    pub fn scalp_signal(&self, scan: &ScalpScan<'_>) -> Option<Signal> {
        self.best_candidate(
            &self.scalp,
            TradeKind::Scalp,
            scan.symbol,
            scan.pip_scale,
            scan.bid,
            scan.ask,
            scan.balance,
            scan.entry,
            scan.bias,
            scan.bias,
            scan.entry,
        )
    }

    /// Best swing candidate for this scan, if any
    pub fn swing_signal(&self, scan: &SwingScan<'_>) -> Option<Signal> {
        self.best_candidate(
            &self.swing,
            TradeKind::Swing,
            scan.symbol,
            scan.pip_scale,
            scan.bid,
            scan.ask,
            scan.balance,
            scan.entry,
            scan.bias,
            scan.higher,
            scan.bias,
        )
    }

    /// Shared pipeline skeleton.
    ///
    /// `structure` carries the BOS/ChoCH checks, `decision` the strong
    /// trend requirement and `execution` the supportive trend requirement.
    #[allow(clippy::too_many_arguments)]
    fn best_candidate(
        &self,
        params: &EngineParams,
        kind: TradeKind,
        symbol: &str,
        pip_scale: f64,
        bid: f64,
        ask: f64,
        balance: f64,
        entry_series: &CandleSeries,
        structure: &CandleSeries,
        decision: &CandleSeries,
        execution: &CandleSeries,
    ) -> Option<Signal> {
        // A change of character on the structure timeframe vetoes the scan
        // outright, whatever else lines up.
        if let Some(choch) = detect_character_change(structure) {
            debug!(
                "[{}] {} scan vetoed by {} choch ({})",
                symbol, kind, choch.bias, choch.reason
            );
            return None;
        }

        let decision_trend = analyze_trend(decision)?;
        let execution_trend = analyze_trend(execution)?;

        let direction = if decision_trend.is_strong(Bias::Bullish)
            && execution_trend.supports(Bias::Bullish)
        {
            Direction::Buy
        } else if decision_trend.is_strong(Bias::Bearish)
            && execution_trend.supports(Bias::Bearish)
        {
            Direction::Sell
        } else {
            debug!(
                "[{}] {} scan: no directional alignment (decision={} score={})",
                symbol, kind, decision_trend.label, decision_trend.score
            );
            return None;
        };
        let bias = direction.bias();

        // Structure must confirm the direction with a break on the bias
        // timeframe.
        let bos = detect_structure_break(structure, pip_scale)?;
        if bos.bias != bias {
            return None;
        }

        let entry_price = match direction {
            Direction::Buy => ask,
            Direction::Sell => bid,
        };

        let blocks = detect_order_blocks(entry_series, pip_scale, &params.order_blocks);
        let gaps = detect_fair_value_gaps(entry_series, pip_scale, &params.gaps);

        // Nearby resting liquidity boosts scalp confidence; it never gates.
        let pool_boost = if kind == TradeKind::Scalp {
            let pools =
                detect_liquidity_pools(entry_series, pip_scale, PoolSide::for_bias(bias));
            1.0 + 0.1 * pools.len() as f64
        } else {
            1.0
        };

        let breakers = if kind == TradeKind::Swing {
            detect_breaker_blocks(entry_series, pip_scale)
        } else {
            Vec::new()
        };

        let mut candidates = Vec::new();
        for ob in blocks.iter().filter(|b| b.bias == bias) {
            let distance = match direction {
                Direction::Buy => (entry_price - ob.price) / pip_scale,
                Direction::Sell => (ob.price - entry_price) / pip_scale,
            };
            if distance < 0.0 || distance > params.max_ob_distance_pips {
                continue;
            }
            if ob.strength < params.min_ob_strength {
                continue;
            }

            for gap in gaps.iter().filter(|g| g.bias == bias) {
                if !gap.contains(entry_price) {
                    continue;
                }

                let stop_loss = ob.stop;
                let stop_pips = (entry_price - stop_loss).abs() / pip_scale;
                if stop_pips < params.min_stop_pips || stop_pips > params.max_stop_pips {
                    continue;
                }

                if kind == TradeKind::Swing
                    && breaker_veto(&breakers, direction, entry_price, (entry_price - stop_loss).abs())
                {
                    debug!(
                        "[{}] swing candidate at {:.5} rejected by breaker veto",
                        symbol, entry_price
                    );
                    continue;
                }

                let volume = params.sizer.position_size(balance, stop_pips, pip_scale);
                let tps = params.sizer.tp_levels(
                    entry_price,
                    stop_loss,
                    direction,
                    pip_scale,
                    params.tp_multipliers,
                );

                candidates.push(Signal {
                    id: Uuid::new_v4(),
                    symbol: symbol.to_string(),
                    direction,
                    trade_type: kind,
                    entry_price,
                    stop_loss,
                    tp1: tps.tp1,
                    tp2: tps.tp2,
                    tp3: tps.tp3,
                    volume,
                    stop_pips,
                    confidence: ob.strength * gap.size_pips * pool_boost,
                    order_block_price: ob.price,
                    fvg_mid: gap.mid,
                    time: Utc::now(),
                });
            }
        }

        if candidates.is_empty() {
            debug!(
                "[{}] no valid {} signal (trend={}, blocks={}, gaps={})",
                symbol,
                kind,
                decision_trend.label,
                blocks.len(),
                gaps.len()
            );
            return None;
        }

        // Stable sort keeps detector emission order on confidence ties, so
        // identical inputs always select the same candidate.
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let best = candidates.swap_remove(0);

        info!(
            "[{}] {} signal: {} at {:.5} sl {:.5} ({:.1} pips) conf {:.2} ob {:.5} fvg {:.5}",
            symbol,
            best.trade_type,
            best.direction,
            best.entry_price,
            best.stop_loss,
            best.stop_pips,
            best.confidence,
            best.order_block_price,
            best.fvg_mid,
        );
        Some(best)
    }
}

/// Whether an opposing breaker sits on the adverse (stop) side of the entry
/// within twice the stop distance.
fn breaker_veto(
    breakers: &[BreakerBlock],
    direction: Direction,
    entry: f64,
    stop_distance: f64,
) -> bool {
    let adverse_span = 2.0 * stop_distance;
    breakers.iter().any(|b| match direction {
        Direction::Buy => {
            b.bias == Bias::Bearish && b.level <= entry && entry - b.level <= adverse_span
        }
        Direction::Sell => {
            b.bias == Bias::Bullish && b.level >= entry && b.level - entry <= adverse_span
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smc::candles::test_series::{bias_series, candle_at, confluence_entry_series};
    use crate::smc::candles::CandleSeries;

    const PIP: f64 = 0.0001;
    const ASK: f64 = 1.1046;
    const BID: f64 = 1.10445;

    fn scalp_scan<'a>(entry: &'a CandleSeries, bias: &'a CandleSeries) -> ScalpScan<'a> {
        ScalpScan {
            symbol: "EURUSD",
            pip_scale: PIP,
            bid: BID,
            ask: ASK,
            balance: 10_000.0,
            entry,
            bias,
        }
    }

    #[test]
    fn test_scenario_a_full_confluence_buys() {
        let entry = confluence_entry_series(false);
        let bias = bias_series(false);
        let engine = SignalEngine::default();

        let signal = engine.scalp_signal(&scalp_scan(&entry, &bias)).expect("signal");
        assert_eq!(signal.direction, Direction::Buy);
        assert_eq!(signal.trade_type, TradeKind::Scalp);
        assert!((signal.entry_price - ASK).abs() < 1e-9);
        assert!(signal.stop_pips >= engine.scalp.min_stop_pips);
        assert!(signal.stop_pips <= engine.scalp.max_stop_pips);
        assert!(signal.stop_loss < signal.entry_price);
        assert!(signal.entry_price < signal.tp1 && signal.tp1 < signal.tp2 && signal.tp2 < signal.tp3);
        assert!((signal.order_block_price - 1.1038).abs() < 1e-9);
    }

    #[test]
    fn test_scenario_b_choch_vetoes() {
        let entry = confluence_entry_series(false);
        let bias = bias_series(true);
        let engine = SignalEngine::default();
        assert!(engine.scalp_signal(&scalp_scan(&entry, &bias)).is_none());
    }

    #[test]
    fn test_no_signal_without_bias_alignment() {
        // A bearish bias series cannot produce a buy, and the entry series
        // offers no bearish confluence.
        let entry = confluence_entry_series(false);
        let bearish_bias = CandleSeries::new(
            bias_series(false)
                .as_slice()
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let mirrored = 2.0 * 1.0900 - c.close;
                    candle_at(i, mirrored + 0.0003, mirrored + 0.0008, mirrored - 0.0005, mirrored, 100)
                })
                .collect(),
        );
        let engine = SignalEngine::default();
        assert!(engine.scalp_signal(&scalp_scan(&entry, &bearish_bias)).is_none());
    }

    #[test]
    fn test_determinism() {
        let entry = confluence_entry_series(false);
        let bias = bias_series(false);
        let engine = SignalEngine::default();
        let a = engine.scalp_signal(&scalp_scan(&entry, &bias)).unwrap();
        let b = engine.scalp_signal(&scalp_scan(&entry, &bias)).unwrap();
        assert_eq!(a.entry_price, b.entry_price);
        assert_eq!(a.stop_loss, b.stop_loss);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.order_block_price, b.order_block_price);
    }

    #[test]
    fn test_swing_pipeline_with_scalp_thresholds() {
        // Per-test parameter variation: run the swing skeleton with the
        // tighter thresholds so the scalp fixture qualifies.
        let entry = confluence_entry_series(false);
        let bias = bias_series(false);
        let engine = SignalEngine {
            scalp: EngineParams::default(),
            swing: EngineParams::default(),
        };
        let scan = SwingScan {
            symbol: "EURUSD",
            pip_scale: PIP,
            bid: BID,
            ask: ASK,
            balance: 10_000.0,
            entry: &entry,
            bias: &bias,
            higher: &bias,
        };
        let signal = engine.swing_signal(&scan).expect("swing signal");
        assert_eq!(signal.trade_type, TradeKind::Swing);
        assert_eq!(signal.direction, Direction::Buy);
    }

    #[test]
    fn test_swing_breaker_veto() {
        let entry = confluence_entry_series(true);
        let bias = bias_series(false);
        let engine = SignalEngine {
            scalp: EngineParams::default(),
            swing: EngineParams::default(),
        };
        let scan = SwingScan {
            symbol: "EURUSD",
            pip_scale: PIP,
            bid: BID,
            ask: ASK,
            balance: 10_000.0,
            entry: &entry,
            bias: &bias,
            higher: &bias,
        };
        assert!(engine.swing_signal(&scan).is_none());
        // The same entry still passes the scalp pipeline, which carries no
        // breaker veto.
        assert!(engine
            .scalp_signal(&scalp_scan(&entry, &bias))
            .is_some());
    }

    #[test]
    fn test_breaker_veto_geometry() {
        let breaker = BreakerBlock {
            bias: Bias::Bearish,
            level: 1.1030,
            distance_pips: 16.0,
            strength_pips: 5.0,
        };
        // Buy at 1.1046 with a 10-pip stop: the breaker 16 pips below is
        // inside the 20-pip adverse span.
        assert!(breaker_veto(&[breaker.clone()], Direction::Buy, 1.1046, 0.0010));
        // A 5-pip stop shrinks the span to 10 pips and clears the veto.
        assert!(!breaker_veto(&[breaker.clone()], Direction::Buy, 1.1046, 0.0005));
        // Sells are only vetoed by bullish breakers above.
        assert!(!breaker_veto(&[breaker], Direction::Sell, 1.1046, 0.0010));
    }
}
