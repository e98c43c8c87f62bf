//! Bot configuration
//!
//! One immutable `BotConfig` value is constructed at startup (defaults,
//! optionally overridden by a JSON file) and passed by reference into every
//! component. Venue credentials stay out of here; they come from the
//! environment in the gateway.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::engine::lifecycle::LifecycleParams;
use crate::engine::rate_limit::LimitParams;
use crate::smc::EngineParams;

/// Per-symbol trading settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub name: String,
    /// Pip scale: 0.0001 for 4-decimal pairs, 0.01 for JPY-quoted pairs
    pub pip_scale: f64,
    /// Scalp spread cap override in pips
    pub max_spread_pips: Option<f64>,
    /// Swing spread cap override in pips
    pub swing_max_spread_pips: Option<f64>,
}

/// Complete bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub symbols: Vec<SymbolConfig>,
    pub scalp: EngineParams,
    pub swing: EngineParams,
    pub swing_enabled: bool,
    pub scalp_limits: LimitParams,
    pub swing_limits: LimitParams,
    pub lifecycle: LifecycleParams,
    /// Venue timezone governing session hours and the daily reset
    pub timezone: String,
    /// Polling loop tick interval in seconds
    pub tick_secs: u64,
    /// Directory for the JSON trade history
    pub history_dir: PathBuf,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                SymbolConfig {
                    name: "EURUSD".to_string(),
                    pip_scale: 0.0001,
                    max_spread_pips: Some(2.0),
                    swing_max_spread_pips: Some(3.0),
                },
                SymbolConfig {
                    name: "GBPJPY".to_string(),
                    pip_scale: 0.01,
                    max_spread_pips: Some(3.0),
                    swing_max_spread_pips: Some(4.0),
                },
                SymbolConfig {
                    name: "AUDUSD".to_string(),
                    pip_scale: 0.0001,
                    max_spread_pips: Some(2.0),
                    swing_max_spread_pips: Some(3.0),
                },
            ],
            scalp: EngineParams::default(),
            swing: EngineParams::swing(),
            swing_enabled: true,
            scalp_limits: LimitParams::default(),
            swing_limits: LimitParams::swing(),
            lifecycle: LifecycleParams::default(),
            timezone: "UTC".to_string(),
            tick_secs: 2,
            history_dir: PathBuf::from("logs/trade_history"),
        }
    }
}

impl BotConfig {
    /// Load configuration, overlaying the file on the defaults when given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_slice(&bytes)
                    .with_context(|| format!("Failed to parse config {}", path.display()))
            }
        }
    }

    pub fn symbol(&self, name: &str) -> Option<&SymbolConfig> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Parse the configured venue timezone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| anyhow!("Unknown timezone '{}'", self.timezone))
    }
}
