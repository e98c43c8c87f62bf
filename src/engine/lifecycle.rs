//! Open-position lifecycle
//!
//! Each tracked position walks a one-way machine: open, milestones
//! (breakeven move, TP1, TP2 — all write-once), then closed when the venue
//! stops reporting it. Closures are classified from venue history; when the
//! history lookup fails the outcome is recorded as unknown rather than
//! silently counted as a win.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::gateway::ExecutionGateway;
use crate::smc::{Signal, TradeKind};

/// Breakeven thresholds per trade type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleParams {
    pub scalp_breakeven_pips: f64,
    pub swing_breakeven_pips: f64,
}

impl Default for LifecycleParams {
    fn default() -> Self {
        Self {
            scalp_breakeven_pips: 8.0,
            swing_breakeven_pips: 25.0,
        }
    }
}

/// Position status, terminal once closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// How a closed trade resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Win,
    Loss,
    /// Venue history was unavailable; not counted as a win or a loss
    Unknown,
}

impl std::fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeOutcome::Win => write!(f, "WIN"),
            TradeOutcome::Loss => write!(f, "LOSS"),
            TradeOutcome::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A live trade owned by the lifecycle manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticket: i64,
    /// The signal that opened the trade, kept as an immutable snapshot
    pub signal: Signal,
    /// Actual fill price
    pub entry_price: f64,
    pub pip_scale: f64,
    pub open_time: DateTime<Utc>,
    pub status: PositionStatus,
    pub be_moved: bool,
    pub tp1_hit: bool,
    pub tp2_hit: bool,
}

impl Position {
    pub fn new(ticket: i64, signal: Signal, fill_price: f64, pip_scale: f64) -> Self {
        Self {
            ticket,
            entry_price: fill_price,
            pip_scale,
            signal,
            open_time: Utc::now(),
            status: PositionStatus::Open,
            be_moved: false,
            tp1_hit: false,
            tp2_hit: false,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.signal.symbol
    }

    pub fn trade_type(&self) -> TradeKind {
        self.signal.trade_type
    }

    /// Direction-signed unrealized pips at `price`
    pub fn unrealized_pips(&self, price: f64) -> f64 {
        self.signal
            .direction
            .signed_pips(self.entry_price, price, self.pip_scale)
    }
}

/// State changes surfaced to the caller for logging and persistence
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    BreakevenMoved {
        ticket: i64,
        symbol: String,
        pips: f64,
    },
    Tp1Hit {
        ticket: i64,
        symbol: String,
    },
    Tp2Hit {
        ticket: i64,
        symbol: String,
    },
    Closed {
        ticket: i64,
        symbol: String,
        outcome: TradeOutcome,
        profit: f64,
        exit_price: f64,
        pips: f64,
    },
}

/// Exclusive owner of the open-position set
#[derive(Debug)]
pub struct PositionLifecycleManager {
    params: LifecycleParams,
    positions: Vec<Position>,
}

impl PositionLifecycleManager {
    pub fn new(params: LifecycleParams) -> Self {
        Self {
            params,
            positions: Vec::new(),
        }
    }

    /// Start tracking a freshly filled position
    pub fn track(&mut self, position: Position) {
        self.positions.push(position);
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    fn breakeven_pips(&self, kind: TradeKind) -> f64 {
        match kind {
            TradeKind::Scalp => self.params.scalp_breakeven_pips,
            TradeKind::Swing => self.params.swing_breakeven_pips,
        }
    }

    /// Advance every open position one tick: apply milestone transitions
    /// and detect venue-side closures. Closed positions leave the set.
    pub fn update(&mut self, gateway: &mut dyn ExecutionGateway) -> Vec<PositionEvent> {
        let mut events = Vec::new();

        let scalp_breakeven_pips = self.params.scalp_breakeven_pips;
        let swing_breakeven_pips = self.params.swing_breakeven_pips;

        for pos in &mut self.positions {
            let Some(snapshot) = gateway.query_open(pos.ticket) else {
                // Venue no longer reports it: closed by stop or target.
                pos.status = PositionStatus::Closed;
                let (outcome, profit, exit_price) = match gateway.query_realized_pnl(pos.ticket) {
                    Some(pnl) if pnl.profit >= 0.0 => (TradeOutcome::Win, pnl.profit, pnl.exit_price),
                    Some(pnl) => (TradeOutcome::Loss, pnl.profit, pnl.exit_price),
                    None => {
                        warn!(
                            "[{}] Position {}: closed but history unavailable, outcome unknown",
                            pos.symbol(),
                            pos.ticket
                        );
                        (TradeOutcome::Unknown, 0.0, 0.0)
                    }
                };
                let pips = if outcome == TradeOutcome::Unknown {
                    0.0
                } else {
                    pos.unrealized_pips(exit_price)
                };
                info!(
                    "[{}] Position {}: CLOSED {} ({:.2})",
                    pos.symbol(),
                    pos.ticket,
                    outcome,
                    profit
                );
                events.push(PositionEvent::Closed {
                    ticket: pos.ticket,
                    symbol: pos.symbol().to_string(),
                    outcome,
                    profit,
                    exit_price,
                    pips,
                });
                continue;
            };

            let current_price = snapshot.current_price;
            let pips = pos.unrealized_pips(current_price);

            // Breakeven move, at most once per position.
            let breakeven_pips = match pos.trade_type() {
                TradeKind::Scalp => scalp_breakeven_pips,
                TradeKind::Swing => swing_breakeven_pips,
            };
            if !pos.be_moved && pips >= breakeven_pips {
                let new_sl = match pos.signal.direction {
                    crate::smc::Direction::Buy => pos.entry_price + pos.pip_scale,
                    crate::smc::Direction::Sell => pos.entry_price - pos.pip_scale,
                };
                let symbol = pos.symbol().to_string();
                if gateway.modify_position(pos.ticket, &symbol, Some(new_sl), None) {
                    pos.be_moved = true;
                    info!("[{}] Position {}: breakeven @ +{:.1} pips", symbol, pos.ticket, pips);
                    events.push(PositionEvent::BreakevenMoved {
                        ticket: pos.ticket,
                        symbol,
                        pips,
                    });
                }
            }

            // TP milestones are write-once; a later retrace never clears
            // them.
            if !pos.tp1_hit
                && pos
                    .signal
                    .direction
                    .signed_pips(pos.signal.tp1, current_price, pos.pip_scale)
                    >= 0.0
            {
                pos.tp1_hit = true;
                info!("[{}] Position {}: TP1 hit", pos.symbol(), pos.ticket);
                events.push(PositionEvent::Tp1Hit {
                    ticket: pos.ticket,
                    symbol: pos.symbol().to_string(),
                });
            }
            if !pos.tp2_hit
                && pos
                    .signal
                    .direction
                    .signed_pips(pos.signal.tp2, current_price, pos.pip_scale)
                    >= 0.0
            {
                pos.tp2_hit = true;
                info!("[{}] Position {}: TP2 hit", pos.symbol(), pos.ticket);
                events.push(PositionEvent::Tp2Hit {
                    ticket: pos.ticket,
                    symbol: pos.symbol().to_string(),
                });
            }
        }

        self.positions.retain(|p| p.status == PositionStatus::Open);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{OrderOutcome, OrderRequest, SimGateway};
    use crate::smc::{Direction, Signal, TradeKind};
    use uuid::Uuid;

    const PIP: f64 = 0.0001;

    fn buy_signal() -> Signal {
        Signal {
            id: Uuid::new_v4(),
            symbol: "EURUSD".to_string(),
            direction: Direction::Buy,
            trade_type: TradeKind::Scalp,
            entry_price: 1.1046,
            stop_loss: 1.1034,
            tp1: 1.1064,
            tp2: 1.1070,
            tp3: 1.1076,
            volume: 0.02,
            stop_pips: 12.0,
            confidence: 18.0,
            order_block_price: 1.1038,
            fvg_mid: 1.1049,
            time: Utc::now(),
        }
    }

    fn open_position(sim: &mut SimGateway) -> (i64, PositionLifecycleManager) {
        let signal = buy_signal();
        let outcome = sim.place_order(&OrderRequest {
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            price: signal.entry_price,
            volume: signal.volume,
            stop_loss: signal.stop_loss,
            take_profit: signal.tp3,
        });
        let OrderOutcome::Filled { ticket, fill_price, .. } = outcome else {
            panic!("expected fill");
        };
        let mut manager = PositionLifecycleManager::new(LifecycleParams::default());
        manager.track(Position::new(ticket, signal, fill_price, PIP));
        (ticket, manager)
    }

    #[test]
    fn test_scenario_d_breakeven_moves_exactly_once() {
        let mut sim = SimGateway::new(10_000.0);
        let (ticket, mut manager) = open_position(&mut sim);

        // +8 pips: breakeven threshold reached.
        sim.set_position_price(ticket, 1.1046 + 8.0 * PIP);
        let events = manager.update(&mut sim);
        assert!(events
            .iter()
            .any(|e| matches!(e, PositionEvent::BreakevenMoved { .. })));
        assert_eq!(sim.modifications.len(), 1);
        let (_, sl, _) = sim.modifications[0];
        assert!((sl.unwrap() - (1.1046 + PIP)).abs() < 1e-9);

        // Higher profit on the next tick: no second breakeven call.
        sim.set_position_price(ticket, 1.1046 + 12.0 * PIP);
        manager.update(&mut sim);
        assert_eq!(sim.modifications.len(), 1);
    }

    #[test]
    fn test_breakeven_not_triggered_below_threshold() {
        let mut sim = SimGateway::new(10_000.0);
        let (ticket, mut manager) = open_position(&mut sim);

        sim.set_position_price(ticket, 1.1046 + 7.0 * PIP);
        manager.update(&mut sim);
        assert!(sim.modifications.is_empty());
    }

    #[test]
    fn test_tp_flags_are_monotonic() {
        let mut sim = SimGateway::new(10_000.0);
        let (ticket, mut manager) = open_position(&mut sim);

        // Cross TP1, then retrace below it.
        sim.set_position_price(ticket, 1.1065);
        let events = manager.update(&mut sim);
        assert!(events.iter().any(|e| matches!(e, PositionEvent::Tp1Hit { .. })));
        assert!(manager.open_positions()[0].tp1_hit);
        assert!(!manager.open_positions()[0].tp2_hit);

        sim.set_position_price(ticket, 1.1050);
        let events = manager.update(&mut sim);
        assert!(events.is_empty());
        assert!(manager.open_positions()[0].tp1_hit);

        // Cross TP2 later.
        sim.set_position_price(ticket, 1.1071);
        let events = manager.update(&mut sim);
        assert!(events.iter().any(|e| matches!(e, PositionEvent::Tp2Hit { .. })));
    }

    #[test]
    fn test_closure_win_and_loss() {
        let mut sim = SimGateway::new(10_000.0);
        let (ticket, mut manager) = open_position(&mut sim);

        sim.close_ticket(ticket, 25.0, 1.1076);
        let events = manager.update(&mut sim);
        assert_eq!(manager.open_count(), 0);
        let PositionEvent::Closed { outcome, pips, .. } = &events[0] else {
            panic!("expected closure");
        };
        assert_eq!(*outcome, TradeOutcome::Win);
        assert!((pips - 30.0).abs() < 1e-6);

        let (ticket2, mut manager2) = open_position(&mut sim);
        sim.close_ticket(ticket2, -14.0, 1.1034);
        let events = manager2.update(&mut sim);
        let PositionEvent::Closed { outcome, .. } = &events[0] else {
            panic!("expected closure");
        };
        assert_eq!(*outcome, TradeOutcome::Loss);
    }

    #[test]
    fn test_unavailable_history_is_unknown_not_win() {
        let mut sim = SimGateway::new(10_000.0);
        let (ticket, mut manager) = open_position(&mut sim);

        sim.close_ticket(ticket, 25.0, 1.1076);
        sim.fail_pnl_lookup = true;
        let events = manager.update(&mut sim);
        let PositionEvent::Closed { outcome, profit, pips, .. } = &events[0] else {
            panic!("expected closure");
        };
        assert_eq!(*outcome, TradeOutcome::Unknown);
        assert_eq!(*profit, 0.0);
        assert_eq!(*pips, 0.0);
    }

    #[test]
    fn test_zero_profit_counts_as_win() {
        let mut sim = SimGateway::new(10_000.0);
        let (ticket, mut manager) = open_position(&mut sim);
        sim.close_ticket(ticket, 0.0, 1.1046);
        let events = manager.update(&mut sim);
        let PositionEvent::Closed { outcome, .. } = &events[0] else {
            panic!("expected closure");
        };
        assert_eq!(*outcome, TradeOutcome::Win);
    }
}
