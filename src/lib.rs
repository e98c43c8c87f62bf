// Library crate - decision core, trading engine and web surface

pub mod api;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod smc;

// Re-export commonly used types
pub use config::{BotConfig, SymbolConfig};
pub use engine::{Bot, SharedState, StatusSnapshot};
pub use gateway::{ExecutionGateway, MarketDataSource, Quote, RestGateway, SimGateway};
pub use smc::{Signal, SignalEngine, TradeKind};
