//! Orbit Core Library
//! Event-driven multi-venue trading engine

// Public modules
pub mod adapter;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod handler;
pub mod snapshot;
pub mod strategy;
pub mod types;

// Re-exports
pub use adapter::{ExchangeAdapter, PaperExchange};
pub use config::{EngineConfig, RiskConfig, TradingType};
pub use engine::{Engine, EngineState, ShutdownHandle};
pub use error::{ConnectError, Error, RejectReason, Result};
pub use event::{Event, EventKind, HandlerFailure, Payload};
pub use handler::{Callback, HandlerId};
pub use strategy::{Strategy, StrategyContext};
pub use types::*;
