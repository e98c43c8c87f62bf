//! Simulated venue
//!
//! In-memory implementation of both gateway traits. Paper mode runs the
//! whole bot against it, and the scenario tests drive position lifecycles
//! through it deterministically: tests seed candles/quotes, move position
//! prices, close tickets and inspect the recorded venue calls.

use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::smc::{CandleSeries, Direction, Timeframe};

use super::{
    ExecutionGateway, MarketDataSource, OrderOutcome, OrderRequest, PositionSnapshot, Quote,
    RealizedPnl,
};

#[derive(Debug, Clone)]
struct SimPosition {
    snapshot: PositionSnapshot,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
}

/// In-memory market data + execution venue
#[derive(Debug, Default)]
pub struct SimGateway {
    candles: HashMap<(String, Timeframe), CandleSeries>,
    quotes: HashMap<String, Quote>,
    balance: f64,
    next_ticket: i64,
    open: HashMap<i64, SimPosition>,
    realized: HashMap<i64, RealizedPnl>,
    /// When set, the next order is rejected with this error/code
    pub reject_next: Option<(String, i64)>,
    /// When true, realized-P&L lookups report history unavailable
    pub fail_pnl_lookup: bool,
    /// Every order transmitted, for test assertions
    pub orders: Vec<OrderRequest>,
    /// Every modification transmitted: (ticket, stop_loss, take_profit)
    pub modifications: Vec<(i64, Option<f64>, Option<f64>)>,
}

impl SimGateway {
    pub fn new(balance: f64) -> Self {
        Self {
            balance,
            next_ticket: 1000,
            ..Default::default()
        }
    }

    /// Seed a candle series for a symbol/timeframe
    pub fn set_candles(&mut self, symbol: &str, timeframe: Timeframe, series: CandleSeries) {
        self.candles.insert((symbol.to_string(), timeframe), series);
    }

    /// Seed the live quote for a symbol
    pub fn set_quote(&mut self, symbol: &str, quote: Quote) {
        self.quotes.insert(symbol.to_string(), quote);
    }

    /// Move the marked price of an open position
    pub fn set_position_price(&mut self, ticket: i64, price: f64) {
        if let Some(pos) = self.open.get_mut(&ticket) {
            pos.snapshot.current_price = price;
        }
    }

    /// Simulate the venue closing a position (stop or target hit)
    pub fn close_ticket(&mut self, ticket: i64, profit: f64, exit_price: f64) {
        self.open.remove(&ticket);
        self.realized.insert(ticket, RealizedPnl { profit, exit_price });
    }

    /// Stop loss currently held at the venue for a ticket
    pub fn stop_loss(&self, ticket: i64) -> Option<f64> {
        self.open.get(&ticket).and_then(|p| p.stop_loss)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

impl MarketDataSource for SimGateway {
    fn candles(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Result<CandleSeries> {
        let series = self
            .candles
            .get(&(symbol.to_string(), timeframe))
            .ok_or_else(|| anyhow!("no candles for {} {}", symbol, timeframe))?;
        Ok(CandleSeries::new(series.tail(count).to_vec()))
    }

    fn quote(&self, symbol: &str) -> Result<Quote> {
        self.quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow!("no quote for {}", symbol))
    }
}

impl ExecutionGateway for SimGateway {
    fn place_order(&mut self, request: &OrderRequest) -> OrderOutcome {
        self.orders.push(request.clone());

        if let Some((error, code)) = self.reject_next.take() {
            return OrderOutcome::Rejected { error, code };
        }

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.open.insert(
            ticket,
            SimPosition {
                snapshot: PositionSnapshot {
                    ticket,
                    symbol: request.symbol.clone(),
                    direction: request.direction,
                    volume: request.volume,
                    entry_price: request.price,
                    current_price: request.price,
                },
                stop_loss: Some(request.stop_loss),
                take_profit: Some(request.take_profit),
            },
        );

        OrderOutcome::Filled {
            ticket,
            fill_price: request.price,
            fill_volume: request.volume,
        }
    }

    fn modify_position(
        &mut self,
        ticket: i64,
        _symbol: &str,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> bool {
        self.modifications.push((ticket, stop_loss, take_profit));
        match self.open.get_mut(&ticket) {
            Some(pos) => {
                if stop_loss.is_some() {
                    pos.stop_loss = stop_loss;
                }
                if take_profit.is_some() {
                    pos.take_profit = take_profit;
                }
                true
            }
            None => false,
        }
    }

    fn close_position(
        &mut self,
        ticket: i64,
        _symbol: &str,
        _volume: f64,
        direction: Direction,
        price: f64,
    ) -> bool {
        let Some(pos) = self.open.remove(&ticket) else {
            return false;
        };
        let profit = direction.signed_pips(pos.snapshot.entry_price, price, 1.0);
        self.realized.insert(ticket, RealizedPnl { profit, exit_price: price });
        true
    }

    fn query_open(&self, ticket: i64) -> Option<PositionSnapshot> {
        self.open.get(&ticket).map(|p| p.snapshot.clone())
    }

    fn query_realized_pnl(&self, ticket: i64) -> Option<RealizedPnl> {
        if self.fail_pnl_lookup {
            return None;
        }
        self.realized.get(&ticket).copied()
    }

    fn account_balance(&self) -> f64 {
        self.balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy_request() -> OrderRequest {
        OrderRequest {
            symbol: "EURUSD".to_string(),
            direction: Direction::Buy,
            price: 1.1046,
            volume: 0.02,
            stop_loss: 1.1034,
            take_profit: 1.1076,
        }
    }

    #[test]
    fn test_fill_and_query() {
        let mut sim = SimGateway::new(10_000.0);
        let outcome = sim.place_order(&buy_request());
        let OrderOutcome::Filled { ticket, fill_price, .. } = outcome else {
            panic!("expected fill");
        };
        assert_eq!(fill_price, 1.1046);
        let snapshot = sim.query_open(ticket).unwrap();
        assert_eq!(snapshot.direction, Direction::Buy);
        assert!(sim.query_realized_pnl(ticket).is_none());
    }

    #[test]
    fn test_rejection() {
        let mut sim = SimGateway::new(10_000.0);
        sim.reject_next = Some(("not enough money".to_string(), 10019));
        let outcome = sim.place_order(&buy_request());
        assert!(matches!(outcome, OrderOutcome::Rejected { code: 10019, .. }));
        assert_eq!(sim.open_count(), 0);
        // The next order goes through again.
        assert!(matches!(sim.place_order(&buy_request()), OrderOutcome::Filled { .. }));
    }

    #[test]
    fn test_venue_closure_and_pnl() {
        let mut sim = SimGateway::new(10_000.0);
        let OrderOutcome::Filled { ticket, .. } = sim.place_order(&buy_request()) else {
            panic!("expected fill");
        };
        sim.close_ticket(ticket, 12.5, 1.1076);
        assert!(sim.query_open(ticket).is_none());
        let pnl = sim.query_realized_pnl(ticket).unwrap();
        assert_eq!(pnl.profit, 12.5);
        assert_eq!(pnl.exit_price, 1.1076);
    }
}
