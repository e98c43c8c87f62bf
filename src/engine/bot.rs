//! Live trading loop
//!
//! Single-threaded cooperative polling loop on a dedicated worker. Each
//! tick processes symbols strictly in configuration order: gate, scan,
//! execute for the scalp then swing pipelines, then one lifecycle pass over
//! the open positions. The loop publishes an immutable status snapshot each
//! tick; the web surface only reads snapshots and flips the stop flag, so
//! there is no shared mutation between the loop and request handlers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::engine::history::{TradeHistory, TradeRecord, TradeStats};
use crate::engine::lifecycle::{
    Position, PositionEvent, PositionLifecycleManager, TradeOutcome,
};
use crate::engine::rate_limit::{GateDecision, RateLimiter};
use crate::gateway::{ExecutionGateway, MarketDataSource, OrderOutcome, OrderRequest};
use crate::smc::risk::pip_value_per_lot;
use crate::smc::{ScalpScan, Signal, SignalEngine, SwingScan, Timeframe, TradeKind};

/// Lines kept in the in-memory log tail
const LOG_CAPACITY: usize = 200;

/// One open trade as shown on the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTradeView {
    pub ticket: i64,
    pub symbol: String,
    pub direction: String,
    pub trade_type: String,
    pub entry_price: f64,
    pub current_price: f64,
    pub pips: f64,
    /// Approximate unrealized profit in account currency
    pub profit: f64,
    pub volume: f64,
    pub be_moved: bool,
    pub tp1_hit: bool,
    pub tp2_hit: bool,
}

/// Per-symbol status line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolStatus {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub spread_pips: f64,
    pub scalp_trades: u32,
    pub swing_trades: u32,
}

/// Immutable status snapshot published once per tick
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub tick_time: Option<DateTime<Utc>>,
    pub balance: f64,
    pub total_scalp_trades: u32,
    pub total_swing_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub unknown: u32,
    pub last_signal_time: Option<DateTime<Utc>>,
    pub open_trades: Vec<OpenTradeView>,
    pub per_symbol: Vec<SymbolStatus>,
}

/// State shared between the loop worker and the web surface
#[derive(Debug)]
pub struct SharedState {
    snapshot: Mutex<StatusSnapshot>,
    log: Mutex<VecDeque<String>>,
    pub stop: AtomicBool,
    pub running: AtomicBool,
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            snapshot: Mutex::new(StatusSnapshot::default()),
            log: Mutex::new(VecDeque::with_capacity(LOG_CAPACITY)),
            stop: AtomicBool::new(false),
            running: AtomicBool::new(false),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the loop to stop at its next iteration check
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.lock().expect("snapshot lock").clone()
    }

    fn publish(&self, snapshot: StatusSnapshot) {
        *self.snapshot.lock().expect("snapshot lock") = snapshot;
    }

    pub fn push_log(&self, line: String) {
        let mut log = self.log.lock().expect("log lock");
        if log.len() == LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(line);
    }

    pub fn log_tail(&self, max_lines: usize) -> Vec<String> {
        let log = self.log.lock().expect("log lock");
        log.iter()
            .skip(log.len().saturating_sub(max_lines))
            .cloned()
            .collect()
    }
}

/// The trading bot: loop state plus every core component
pub struct Bot<G: MarketDataSource + ExecutionGateway> {
    config: BotConfig,
    gateway: G,
    engine: SignalEngine,
    limiter: RateLimiter,
    lifecycle: PositionLifecycleManager,
    history: TradeHistory,
    shared: Arc<SharedState>,
    tz: Tz,
    wins: u32,
    losses: u32,
    unknown: u32,
    last_signal_time: Option<DateTime<Utc>>,
}

impl<G: MarketDataSource + ExecutionGateway> Bot<G> {
    pub fn new(config: BotConfig, gateway: G, shared: Arc<SharedState>) -> Result<Self> {
        let tz = config.tz()?;
        let history = TradeHistory::new(&config.history_dir)?;
        let engine = SignalEngine {
            scalp: config.scalp.clone(),
            swing: config.swing.clone(),
        };
        let limiter = RateLimiter::new(config.scalp_limits.clone(), config.swing_limits.clone());
        let lifecycle = PositionLifecycleManager::new(config.lifecycle.clone());

        Ok(Self {
            config,
            gateway,
            engine,
            limiter,
            lifecycle,
            history,
            shared,
            tz,
            wins: 0,
            losses: 0,
            unknown: 0,
            last_signal_time: None,
        })
    }

    /// Aggregate statistics from the trade history store
    pub fn stats(&self) -> TradeStats {
        self.history.aggregate_stats()
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Run the polling loop until the stop flag is raised.
    ///
    /// The flag is checked once per iteration; an in-flight collaborator
    /// call is never interrupted, so worst-case shutdown latency is one
    /// call's duration.
    pub fn run(mut self) {
        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);
        let symbols: Vec<&str> = self.config.symbols.iter().map(|s| s.name.as_str()).collect();
        info!("Starting SMC bot, symbols: {}", symbols.join(", "));

        while !self.shared.stop.load(Ordering::SeqCst) {
            self.tick(Utc::now());
            std::thread::sleep(Duration::from_secs(self.config.tick_secs));
        }

        self.shared.running.store(false, Ordering::SeqCst);
        self.publish_snapshot(Utc::now());
        info!("Bot loop stopped");
    }

    /// One scan tick: symbols strictly sequential, scalp then swing per
    /// symbol, then a lifecycle pass.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        let local = now.with_timezone(&self.tz);
        if self.limiter.roll_day(local.date_naive()) {
            info!("New trading day started");
            self.shared.push_log(format!("{} new trading day", local.format("%H:%M:%S")));
        }
        let hour = local.hour();

        for idx in 0..self.config.symbols.len() {
            let symbol_cfg = self.config.symbols[idx].clone();
            let symbol = symbol_cfg.name.as_str();

            let quote = match self.gateway.quote(symbol) {
                Ok(q) => q,
                Err(e) => {
                    debug!("[{}] quote unavailable, skipping tick: {:#}", symbol, e);
                    continue;
                }
            };
            let spread = quote.spread_pips(symbol_cfg.pip_scale);

            // Scalp pipeline.
            match self.limiter.check(
                symbol,
                TradeKind::Scalp,
                now,
                hour,
                spread,
                symbol_cfg.max_spread_pips,
            ) {
                GateDecision::Allowed => {
                    let data = self
                        .gateway
                        .candles(symbol, Timeframe::M15, 200)
                        .and_then(|entry| {
                            let bias = self.gateway.candles(symbol, Timeframe::H1, 100)?;
                            Ok((entry, bias))
                        });
                    match data {
                        Ok((entry, bias)) => {
                            let scan = ScalpScan {
                                symbol,
                                pip_scale: symbol_cfg.pip_scale,
                                bid: quote.bid,
                                ask: quote.ask,
                                balance: self.gateway.account_balance(),
                                entry: &entry,
                                bias: &bias,
                            };
                            if let Some(signal) = self.engine.scalp_signal(&scan) {
                                self.execute_signal(&signal, now);
                            }
                        }
                        Err(e) => debug!("[{}] candles unavailable: {:#}", symbol, e),
                    }
                }
                GateDecision::SpreadTooWide { spread_pips, cap } => {
                    info!("[{}] Spread too high ({:.1} > {:.1} pips)", symbol, spread_pips, cap);
                }
                decision => debug!("[{}] scalp gate: {:?}", symbol, decision),
            }

            // Swing pipeline.
            if self.config.swing_enabled {
                match self.limiter.check(
                    symbol,
                    TradeKind::Swing,
                    now,
                    hour,
                    spread,
                    symbol_cfg.swing_max_spread_pips,
                ) {
                    GateDecision::Allowed => {
                        let data = self
                            .gateway
                            .candles(symbol, Timeframe::H1, 300)
                            .and_then(|entry| {
                                let bias = self.gateway.candles(symbol, Timeframe::H4, 200)?;
                                let higher = self.gateway.candles(symbol, Timeframe::D1, 100)?;
                                Ok((entry, bias, higher))
                            });
                        match data {
                            Ok((entry, bias, higher)) => {
                                let scan = SwingScan {
                                    symbol,
                                    pip_scale: symbol_cfg.pip_scale,
                                    bid: quote.bid,
                                    ask: quote.ask,
                                    balance: self.gateway.account_balance(),
                                    entry: &entry,
                                    bias: &bias,
                                    higher: &higher,
                                };
                                if let Some(signal) = self.engine.swing_signal(&scan) {
                                    self.execute_signal(&signal, now);
                                }
                            }
                            Err(e) => debug!("[{}] swing candles unavailable: {:#}", symbol, e),
                        }
                    }
                    decision => debug!("[{}] swing gate: {:?}", symbol, decision),
                }
            }
        }

        self.manage_positions(now);
        self.publish_snapshot(now);
    }

    /// Transmit a signal if its daily cap still allows it.
    ///
    /// The cap is re-checked here so a signal generated just before the
    /// limit filled cannot slip through; a rejected order never increments
    /// the counters and is never retried within the tick.
    pub fn execute_signal(&mut self, signal: &Signal, now: DateTime<Utc>) -> bool {
        let kind = signal.trade_type;
        if self.limiter.cap_reached(&signal.symbol, kind) {
            warn!("[{}] {} daily limit reached", signal.symbol, kind);
            return false;
        }

        let request = OrderRequest {
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            price: signal.entry_price,
            volume: signal.volume,
            stop_loss: signal.stop_loss,
            take_profit: signal.tp3,
        };

        match self.gateway.place_order(&request) {
            OrderOutcome::Rejected { error, code } => {
                error!("[{}] Order failed ({}): {}", signal.symbol, code, error);
                self.shared
                    .push_log(format!("order rejected {} ({}): {}", signal.symbol, code, error));
                false
            }
            OrderOutcome::Filled { ticket, fill_price, fill_volume } => {
                self.limiter.record_execution(&signal.symbol, kind, now);
                self.last_signal_time = Some(now);

                let pip_scale = self
                    .config
                    .symbol(&signal.symbol)
                    .map(|s| s.pip_scale)
                    .unwrap_or(0.0001);
                let position = Position::new(ticket, signal.clone(), fill_price, pip_scale);

                info!(
                    "[{}] TRADE EXECUTED [{}] ticket {} {} {:.2} lots @ {:.5} sl {:.5} tp {:.5}/{:.5}/{:.5}",
                    signal.symbol,
                    kind,
                    ticket,
                    signal.direction,
                    fill_volume,
                    fill_price,
                    signal.stop_loss,
                    signal.tp1,
                    signal.tp2,
                    signal.tp3,
                );
                self.shared.push_log(format!(
                    "{} {} {} {} @ {:.5} ({:.1} pips stop)",
                    now.with_timezone(&self.tz).format("%H:%M:%S"),
                    kind,
                    signal.direction,
                    signal.symbol,
                    fill_price,
                    signal.stop_pips,
                ));

                if let Err(e) = self.history.record_opened(&TradeRecord::opened(&position)) {
                    error!("Failed to persist trade open: {:#}", e);
                }
                self.lifecycle.track(position);
                true
            }
        }
    }

    fn manage_positions(&mut self, now: DateTime<Utc>) {
        let events = self.lifecycle.update(&mut self.gateway);
        for event in events {
            match event {
                PositionEvent::Closed { ticket, symbol, outcome, profit, exit_price, pips } => {
                    match outcome {
                        TradeOutcome::Win => self.wins += 1,
                        TradeOutcome::Loss => self.losses += 1,
                        TradeOutcome::Unknown => self.unknown += 1,
                    }
                    self.shared.push_log(format!(
                        "{} closed {} ticket {} {} ({:+.2})",
                        now.with_timezone(&self.tz).format("%H:%M:%S"),
                        symbol,
                        ticket,
                        outcome,
                        profit,
                    ));
                    if let Err(e) =
                        self.history.record_closed(ticket, exit_price, profit, pips, outcome)
                    {
                        error!("Failed to persist trade close: {:#}", e);
                    }
                }
                PositionEvent::BreakevenMoved { ticket, symbol, pips } => {
                    self.shared.push_log(format!(
                        "{} breakeven {} ticket {} @ +{:.1} pips",
                        now.with_timezone(&self.tz).format("%H:%M:%S"),
                        symbol,
                        ticket,
                        pips,
                    ));
                }
                PositionEvent::Tp1Hit { ticket, symbol } => {
                    self.shared.push_log(format!("TP1 hit {} ticket {}", symbol, ticket));
                }
                PositionEvent::Tp2Hit { ticket, symbol } => {
                    self.shared.push_log(format!("TP2 hit {} ticket {}", symbol, ticket));
                }
            }
        }
    }

    fn publish_snapshot(&self, now: DateTime<Utc>) {
        let (total_scalp, total_swing) = self.limiter.totals();

        let open_trades = self
            .lifecycle
            .open_positions()
            .iter()
            .map(|p| {
                let current = self
                    .gateway
                    .query_open(p.ticket)
                    .map(|s| s.current_price)
                    .unwrap_or(p.entry_price);
                let pips = p.unrealized_pips(current);
                OpenTradeView {
                    ticket: p.ticket,
                    symbol: p.symbol().to_string(),
                    direction: p.signal.direction.to_string(),
                    trade_type: p.trade_type().to_string(),
                    entry_price: p.entry_price,
                    current_price: current,
                    pips,
                    profit: pips * p.signal.volume * pip_value_per_lot(p.pip_scale),
                    volume: p.signal.volume,
                    be_moved: p.be_moved,
                    tp1_hit: p.tp1_hit,
                    tp2_hit: p.tp2_hit,
                }
            })
            .collect();

        let per_symbol = self
            .config
            .symbols
            .iter()
            .map(|s| {
                let quote = self.gateway.quote(&s.name).ok();
                let state = self.limiter.state(&s.name);
                SymbolStatus {
                    symbol: s.name.clone(),
                    bid: quote.map(|q| q.bid).unwrap_or(0.0),
                    ask: quote.map(|q| q.ask).unwrap_or(0.0),
                    spread_pips: quote.map(|q| q.spread_pips(s.pip_scale)).unwrap_or(0.0),
                    scalp_trades: state.map(|st| st.daily_trades).unwrap_or(0),
                    swing_trades: state.map(|st| st.swing_trades).unwrap_or(0),
                }
            })
            .collect();

        self.shared.publish(StatusSnapshot {
            running: self.shared.is_running(),
            tick_time: Some(now),
            balance: self.gateway.account_balance(),
            total_scalp_trades: total_scalp,
            total_swing_trades: total_swing,
            wins: self.wins,
            losses: self.losses,
            unknown: self.unknown,
            last_signal_time: self.last_signal_time,
            open_trades,
            per_symbol,
        });
    }
}
