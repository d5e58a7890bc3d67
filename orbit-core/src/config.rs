//! Engine configuration.
//!
//! Built once by the caller and handed by reference to the engine and each
//! manager. Every field has a default so a partial TOML table is enough.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How the engine is connected to the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingType {
    Live,
    #[default]
    Simulation,
    Sandbox,
    Backtest,
}

impl TradingType {
    /// Offline runs replay finite data and never need a heartbeat.
    pub fn is_offline(self) -> bool {
        matches!(self, TradingType::Simulation | TradingType::Backtest)
    }
}

/// Pre-trade limits. `None` disables a check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Max orders a single strategy may have working at once
    pub max_active_orders: Option<usize>,
    /// Max volume × price of a single order
    pub max_order_notional: Option<Decimal>,
    /// Max absolute net position per instrument, working orders included
    pub max_position: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub trading_type: TradingType,
    /// Heartbeat period in seconds; 0 disables it
    pub heartbeat_secs: u64,
    /// Load venue positions on START
    pub load_accounts: bool,
    /// Pause after a handler failure has been dispatched as ERROR
    pub error_backoff_ms: u64,
    /// Bound on every adapter call
    pub adapter_timeout_ms: u64,
    /// Capacity of each producer channel
    pub channel_capacity: usize,
    pub risk: RiskConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trading_type: TradingType::default(),
            heartbeat_secs: 10,
            load_accounts: true,
            error_backoff_ms: 1000,
            adapter_timeout_ms: 5000,
            channel_capacity: 1024,
            risk: RiskConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Heartbeat period, if the heartbeat source should run at all
    pub fn heartbeat(&self) -> Option<Duration> {
        if self.trading_type.is_offline() || self.heartbeat_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.heartbeat_secs))
        }
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }

    pub fn is_offline(&self) -> bool {
        self.trading_type.is_offline()
    }
}
