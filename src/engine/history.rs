//! Trade history persistence
//!
//! JSON-file trade log: every executed trade is appended to a master file
//! and a per-day file, updated in place on closure. Aggregate statistics
//! for the dashboard are computed from the master file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::lifecycle::{Position, TradeOutcome};
use crate::smc::{Direction, TradeKind};

/// One trade's persistent record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ticket: i64,
    pub symbol: String,
    pub direction: Direction,
    pub trade_type: TradeKind,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub volume: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    pub stop_pips: f64,
    pub confidence: f64,
    pub status: RecordStatus,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub profit_loss: Option<f64>,
    pub pips_gained: Option<f64>,
    pub close_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Open,
    Closed,
}

impl TradeRecord {
    /// Record for a freshly opened position
    pub fn opened(position: &Position) -> Self {
        let signal = &position.signal;
        Self {
            ticket: position.ticket,
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            trade_type: signal.trade_type,
            entry_price: position.entry_price,
            entry_time: position.open_time,
            volume: signal.volume,
            stop_loss: signal.stop_loss,
            tp1: signal.tp1,
            tp2: signal.tp2,
            tp3: signal.tp3,
            stop_pips: signal.stop_pips,
            confidence: signal.confidence,
            status: RecordStatus::Open,
            exit_price: None,
            exit_time: None,
            profit_loss: None,
            pips_gained: None,
            close_reason: None,
        }
    }
}

/// Summary of one extreme trade for the stats payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeExtreme {
    pub symbol: String,
    pub profit: f64,
    pub pips: f64,
}

/// Aggregate statistics over the full history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub closed_trades: usize,
    pub open_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Closures whose venue history was unavailable
    pub unknown: usize,
    /// Percentage of decided (win/loss) closures won
    pub win_rate: f64,
    pub total_pips: f64,
    pub total_profit: f64,
    pub avg_profit_per_trade: f64,
    pub best_trade: Option<TradeExtreme>,
    pub worst_trade: Option<TradeExtreme>,
}

/// JSON-file trade history store
#[derive(Debug, Clone)]
pub struct TradeHistory {
    dir: PathBuf,
}

impl TradeHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create history dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn master_path(&self) -> PathBuf {
        self.dir.join("all_trades.json")
    }

    fn daily_path(&self) -> PathBuf {
        self.dir
            .join(format!("trades_{}.json", Local::now().format("%Y%m%d")))
    }

    fn read_file(path: &Path) -> Vec<TradeRecord> {
        let Ok(bytes) = fs::read(path) else {
            return Vec::new();
        };
        serde_json::from_slice(&bytes).unwrap_or_default()
    }

    fn write_file(path: &Path, trades: &[TradeRecord]) -> Result<()> {
        let json = serde_json::to_vec_pretty(trades)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Persist a newly executed trade
    pub fn record_opened(&self, record: &TradeRecord) -> Result<()> {
        for path in [self.master_path(), self.daily_path()] {
            let mut trades = Self::read_file(&path);
            trades.push(record.clone());
            Self::write_file(&path, &trades)?;
        }
        Ok(())
    }

    /// Update the master record when a position closes
    pub fn record_closed(
        &self,
        ticket: i64,
        exit_price: f64,
        profit: f64,
        pips: f64,
        outcome: TradeOutcome,
    ) -> Result<()> {
        let path = self.master_path();
        let mut trades = Self::read_file(&path);
        for trade in trades.iter_mut() {
            if trade.ticket == ticket && trade.status == RecordStatus::Open {
                trade.status = RecordStatus::Closed;
                trade.exit_price = Some(exit_price);
                trade.exit_time = Some(Utc::now());
                trade.profit_loss = Some(profit);
                trade.pips_gained = Some(pips);
                trade.close_reason = Some(outcome.to_string());
                break;
            }
        }
        Self::write_file(&path, &trades)
    }

    /// All recorded trades, oldest first
    pub fn load_history(&self) -> Vec<TradeRecord> {
        Self::read_file(&self.master_path())
    }

    /// Aggregate statistics over the master file.
    ///
    /// Unknown-outcome closures are excluded from the win-rate denominator;
    /// they are neither wins nor losses.
    pub fn aggregate_stats(&self) -> TradeStats {
        let trades = self.load_history();
        let closed: Vec<&TradeRecord> = trades
            .iter()
            .filter(|t| t.status == RecordStatus::Closed)
            .collect();

        let unknown = closed
            .iter()
            .filter(|t| t.close_reason.as_deref() == Some("UNKNOWN"))
            .count();
        let decided: Vec<&TradeRecord> = closed
            .iter()
            .filter(|t| t.close_reason.as_deref() != Some("UNKNOWN"))
            .copied()
            .collect();
        let wins = decided
            .iter()
            .filter(|t| t.profit_loss.unwrap_or(0.0) >= 0.0)
            .count();
        let losses = decided.len() - wins;

        let total_profit: f64 = closed.iter().filter_map(|t| t.profit_loss).sum();
        let total_pips: f64 = closed.iter().filter_map(|t| t.pips_gained).sum();

        let by_profit = |t: &&TradeRecord| {
            t.profit_loss
                .map(|p| (p * 100.0) as i64)
                .unwrap_or(i64::MIN)
        };
        let best = decided.iter().copied().max_by_key(by_profit);
        let worst = decided.iter().copied().min_by_key(by_profit);
        let extreme = |t: &TradeRecord| TradeExtreme {
            symbol: t.symbol.clone(),
            profit: t.profit_loss.unwrap_or(0.0),
            pips: t.pips_gained.unwrap_or(0.0),
        };

        TradeStats {
            total_trades: trades.len(),
            closed_trades: closed.len(),
            open_trades: trades.len() - closed.len(),
            wins,
            losses,
            unknown,
            win_rate: if decided.is_empty() {
                0.0
            } else {
                (wins as f64 / decided.len() as f64 * 100.0 * 100.0).round() / 100.0
            },
            total_pips: (total_pips * 100.0).round() / 100.0,
            total_profit: (total_profit * 100.0).round() / 100.0,
            avg_profit_per_trade: if closed.is_empty() {
                0.0
            } else {
                (total_profit / closed.len() as f64 * 100.0).round() / 100.0
            },
            best_trade: best.map(extreme),
            worst_trade: worst.map(extreme),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smc::Signal;
    use uuid::Uuid;

    fn temp_history() -> TradeHistory {
        let dir = std::env::temp_dir().join(format!("smcflow-history-{}", Uuid::new_v4()));
        TradeHistory::new(dir).unwrap()
    }

    fn record(ticket: i64, symbol: &str) -> TradeRecord {
        let signal = Signal {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
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
        };
        TradeRecord::opened(&Position::new(ticket, signal, 1.1046, 0.0001))
    }

    #[test]
    fn test_open_close_round_trip() {
        let history = temp_history();
        history.record_opened(&record(1, "EURUSD")).unwrap();
        history.record_opened(&record(2, "AUDUSD")).unwrap();
        history
            .record_closed(1, 1.1076, 25.0, 30.0, TradeOutcome::Win)
            .unwrap();

        let trades = history.load_history();
        assert_eq!(trades.len(), 2);
        let closed = trades.iter().find(|t| t.ticket == 1).unwrap();
        assert_eq!(closed.status, RecordStatus::Closed);
        assert_eq!(closed.profit_loss, Some(25.0));
        assert_eq!(closed.close_reason.as_deref(), Some("WIN"));
        let open = trades.iter().find(|t| t.ticket == 2).unwrap();
        assert_eq!(open.status, RecordStatus::Open);
    }

    #[test]
    fn test_stats_exclude_unknown_from_win_rate() {
        let history = temp_history();
        for (ticket, symbol) in [(1, "EURUSD"), (2, "EURUSD"), (3, "GBPJPY"), (4, "AUDUSD")] {
            history.record_opened(&record(ticket, symbol)).unwrap();
        }
        history.record_closed(1, 1.1076, 25.0, 30.0, TradeOutcome::Win).unwrap();
        history.record_closed(2, 1.1034, -14.0, -12.0, TradeOutcome::Loss).unwrap();
        history.record_closed(3, 0.0, 0.0, 0.0, TradeOutcome::Unknown).unwrap();

        let stats = history.aggregate_stats();
        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.closed_trades, 3);
        assert_eq!(stats.open_trades, 1);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.win_rate, 50.0);
        assert_eq!(stats.total_profit, 11.0);
        assert_eq!(stats.best_trade.as_ref().unwrap().symbol, "EURUSD");
        assert_eq!(stats.worst_trade.as_ref().unwrap().profit, -14.0);
    }

    #[test]
    fn test_empty_history_stats() {
        let history = temp_history();
        let stats = history.aggregate_stats();
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert!(stats.best_trade.is_none());
    }
}
