//! Core Trading Engine
//! Dispatch loop plus the manager hierarchy: strategy -> risk -> orders -> portfolio

pub mod bus;
pub mod manager;
pub mod order;
pub mod portfolio;
pub mod risk;
pub mod state;

pub use bus::{Engine, ShutdownHandle};
pub use manager::{OrderFilter, StrategyManager};
pub use order::{Matched, OrderManager};
pub use portfolio::PortfolioManager;
pub use risk::{RiskError, RiskGate};
pub use state::{EngineState, StateMachine};
