//! Per-symbol signal rate limiting
//!
//! Each symbol carries independent daily counters and cooldown clocks for
//! the scalp and swing pipelines. Scalp generation is further gated by a
//! session-hour window and a spread cap; swing only by its own spread cap.
//! Counters move only on successful order placement, and everything resets
//! exactly once per calendar day at the venue-timezone midnight.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::smc::TradeKind;

/// Limits for one trade type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitParams {
    /// Maximum successful placements per symbol per day
    pub max_daily_trades: u32,
    /// Minimum seconds between signals of this type
    pub cooldown_secs: i64,
    /// Session window as [start_hour, end_hour) in venue-local time
    pub session_hours: Option<(u32, u32)>,
    /// Spread cap in pips when the symbol has no override
    pub default_max_spread_pips: f64,
}

impl Default for LimitParams {
    fn default() -> Self {
        Self {
            max_daily_trades: 5,
            cooldown_secs: 300,
            session_hours: Some((7, 17)),
            default_max_spread_pips: 2.0,
        }
    }
}

impl LimitParams {
    /// Swing limits: fewer trades, longer cooldown, no session window
    pub fn swing() -> Self {
        Self {
            max_daily_trades: 2,
            cooldown_secs: 3600,
            session_hours: None,
            default_max_spread_pips: 3.0,
        }
    }
}

/// Why a signal request was allowed or rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GateDecision {
    Allowed,
    OutsideSession,
    SpreadTooWide { spread_pips: f64, cap: f64 },
    DailyCapReached,
    Cooldown { remaining_secs: i64 },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }
}

/// Mutable per-symbol limiter state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolState {
    pub daily_trades: u32,
    pub last_signal_time: Option<DateTime<Utc>>,
    pub swing_trades: u32,
    pub last_swing_signal_time: Option<DateTime<Utc>>,
}

/// Owner of all per-symbol limiter state
#[derive(Debug)]
pub struct RateLimiter {
    scalp: LimitParams,
    swing: LimitParams,
    states: HashMap<String, SymbolState>,
    current_date: Option<NaiveDate>,
}

impl RateLimiter {
    pub fn new(scalp: LimitParams, swing: LimitParams) -> Self {
        Self {
            scalp,
            swing,
            states: HashMap::new(),
            current_date: None,
        }
    }

    fn params(&self, kind: TradeKind) -> &LimitParams {
        match kind {
            TradeKind::Scalp => &self.scalp,
            TradeKind::Swing => &self.swing,
        }
    }

    /// Reset all counters when the calendar day changes. Returns true on
    /// the tick that actually performed a reset, so the reset fires exactly
    /// once per day boundary.
    pub fn roll_day(&mut self, today: NaiveDate) -> bool {
        match self.current_date {
            None => {
                self.current_date = Some(today);
                false
            }
            Some(date) if date == today => false,
            Some(_) => {
                self.current_date = Some(today);
                for state in self.states.values_mut() {
                    *state = SymbolState::default();
                }
                true
            }
        }
    }

    /// Gate a signal request.
    ///
    /// `local_hour` is the current hour in the venue timezone;
    /// `spread_cap_override` is the per-symbol cap, falling back to the
    /// trade type's default.
    pub fn check(
        &self,
        symbol: &str,
        kind: TradeKind,
        now: DateTime<Utc>,
        local_hour: u32,
        spread_pips: f64,
        spread_cap_override: Option<f64>,
    ) -> GateDecision {
        let params = self.params(kind);

        if let Some((start, end)) = params.session_hours {
            if local_hour < start || local_hour >= end {
                return GateDecision::OutsideSession;
            }
        }

        let cap = spread_cap_override.unwrap_or(params.default_max_spread_pips);
        if spread_pips > cap {
            return GateDecision::SpreadTooWide { spread_pips, cap };
        }

        let state = self.states.get(symbol).cloned().unwrap_or_default();
        let (count, last) = match kind {
            TradeKind::Scalp => (state.daily_trades, state.last_signal_time),
            TradeKind::Swing => (state.swing_trades, state.last_swing_signal_time),
        };

        if count >= params.max_daily_trades {
            return GateDecision::DailyCapReached;
        }

        if let Some(last) = last {
            let elapsed = (now - last).num_seconds();
            if elapsed < params.cooldown_secs {
                return GateDecision::Cooldown {
                    remaining_secs: params.cooldown_secs - elapsed,
                };
            }
        }

        GateDecision::Allowed
    }

    /// Whether the symbol's daily cap for this trade type is already full
    pub fn cap_reached(&self, symbol: &str, kind: TradeKind) -> bool {
        let count = self
            .states
            .get(symbol)
            .map(|s| match kind {
                TradeKind::Scalp => s.daily_trades,
                TradeKind::Swing => s.swing_trades,
            })
            .unwrap_or(0);
        count >= self.params(kind).max_daily_trades
    }

    /// Count a successful placement against the symbol's limits
    pub fn record_execution(&mut self, symbol: &str, kind: TradeKind, now: DateTime<Utc>) {
        let state = self.states.entry(symbol.to_string()).or_default();
        match kind {
            TradeKind::Scalp => {
                state.daily_trades += 1;
                state.last_signal_time = Some(now);
            }
            TradeKind::Swing => {
                state.swing_trades += 1;
                state.last_swing_signal_time = Some(now);
            }
        }
    }

    /// Limiter state for a symbol, if it has traded today
    pub fn state(&self, symbol: &str) -> Option<&SymbolState> {
        self.states.get(symbol)
    }

    /// Totals across symbols: (scalp, swing)
    pub fn totals(&self) -> (u32, u32) {
        self.states.values().fold((0, 0), |(s, w), st| {
            (s + st.daily_trades, w + st.swing_trades)
        })
    }
}
