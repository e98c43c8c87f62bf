//! Venue gateway seams
//!
//! The core consumes two collaborator interfaces: a market data source
//! (candles and quotes) and an execution gateway (orders, position queries,
//! realized P&L). Both are synchronous from the loop's perspective; bounding
//! call latency is the implementation's contract. `rest` talks to a broker
//! HTTP API, `sim` fills orders in memory for paper mode and tests.

pub mod rest;
pub mod sim;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::smc::{CandleSeries, Direction, Timeframe};

pub use rest::RestGateway;
pub use sim::SimGateway;

/// A live top-of-book quote
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    /// Spread in pips for the given pip scale
    pub fn spread_pips(&self, pip_scale: f64) -> f64 {
        (self.ask - self.bid) / pip_scale
    }
}

/// Market data collaborator
pub trait MarketDataSource {
    /// Most recent `count` candles for the symbol/timeframe, time-ascending.
    /// An error means the data is unavailable this tick; the caller skips
    /// the symbol and retries on the next natural tick.
    fn candles(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Result<CandleSeries>;

    /// Current bid/ask for the symbol
    fn quote(&self, symbol: &str) -> Result<Quote>;
}

/// A new order to transmit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub price: f64,
    pub volume: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Venue response to an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderOutcome {
    Filled {
        ticket: i64,
        fill_price: f64,
        fill_volume: f64,
    },
    Rejected {
        error: String,
        code: i64,
    },
}

/// Venue view of an open position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub ticket: i64,
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    pub entry_price: f64,
    pub current_price: f64,
}

/// Realized result reported by venue history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealizedPnl {
    /// Net of swap and commission
    pub profit: f64,
    pub exit_price: f64,
}

/// Order transmission and position query collaborator
pub trait ExecutionGateway {
    /// Transmit a market order. Transport failures surface as `Rejected`
    /// with the error text; the core never retries within a tick.
    fn place_order(&mut self, request: &OrderRequest) -> OrderOutcome;

    /// Move the stop loss and/or take profit of an open position
    fn modify_position(
        &mut self,
        ticket: i64,
        symbol: &str,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> bool;

    /// Close (part of) an open position at market
    fn close_position(
        &mut self,
        ticket: i64,
        symbol: &str,
        volume: f64,
        direction: Direction,
        price: f64,
    ) -> bool;

    /// Venue's current view of the position, `None` once it is closed
    fn query_open(&self, ticket: i64) -> Option<PositionSnapshot>;

    /// Realized P&L for a closed position, `None` when history is
    /// unavailable
    fn query_realized_pnl(&self, ticket: i64) -> Option<RealizedPnl>;

    /// Current account balance
    fn account_balance(&self) -> f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spread_pips() {
        let quote = Quote { bid: 1.10000, ask: 1.10016 };
        assert!((quote.spread_pips(0.0001) - 1.6).abs() < 1e-9);
        let jpy = Quote { bid: 185.000, ask: 185.024 };
        assert!((jpy.spread_pips(0.01) - 2.4).abs() < 1e-9);
    }
}
