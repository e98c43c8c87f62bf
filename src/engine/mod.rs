//! Trading engine
//!
//! Everything around the decision core that turns signals into managed
//! trades:
//! - Per-symbol rate limiting (daily caps, cooldowns, session/spread gates)
//! - Position lifecycle (breakeven, TP milestones, closure classification)
//! - Trade history persistence and aggregate statistics
//! - The polling loop orchestrating one scan tick per interval

pub mod bot;
pub mod history;
pub mod lifecycle;
pub mod rate_limit;

// Re-export commonly used types
pub use bot::{Bot, OpenTradeView, SharedState, StatusSnapshot, SymbolStatus};
pub use history::{TradeHistory, TradeRecord, TradeStats};
pub use lifecycle::{
    LifecycleParams, Position, PositionEvent, PositionLifecycleManager, PositionStatus,
    TradeOutcome,
};
pub use rate_limit::{GateDecision, LimitParams, RateLimiter, SymbolState};
