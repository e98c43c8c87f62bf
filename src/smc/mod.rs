//! Smart money concepts core
//!
//! The decision core of the bot, shared by the live loop and the tests:
//! - Candle series primitives
//! - Trend scoring and ATR (market structure)
//! - Pattern detectors: order blocks, fair value gaps, structure breaks,
//!   character changes, liquidity pools, breaker blocks
//! - The signal engine fusing detectors into one best candidate per scan
//! - Risk sizing and take-profit ladders

pub mod bos;
pub mod breaker;
pub mod candles;
pub mod choch;
pub mod fvg;
pub mod liquidity;
pub mod order_blocks;
pub mod risk;
pub mod signal;
pub mod structure;

// Re-export commonly used types
pub use bos::StructureBreak;
pub use breaker::BreakerBlock;
pub use candles::{Candle, CandleSeries, Timeframe};
pub use choch::CharacterChange;
pub use fvg::{FairValueGap, FvgParams};
pub use liquidity::{LiquidityPool, PoolSide};
pub use order_blocks::{OrderBlock, OrderBlockParams};
pub use risk::{RiskSizer, TpLevels};
pub use signal::{
    Direction, EngineParams, ScalpScan, Signal, SignalEngine, SwingScan, TradeKind,
};
pub use structure::{Bias, SwingPoint, TrendAssessment, TrendLabel};
