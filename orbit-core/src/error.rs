//! Error handling - Hierarchical, zero-cost errors

use thiserror::Error;

use crate::handler::{Callback, HandlerId};
use crate::types::{ExchangeId, OrderId};

pub type Result<T> = std::result::Result<T, Error>;

/// Orbit error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("Config: {0}")]
    Config(String),

    /// Venue unreachable
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Order routed to an exchange that was never installed
    #[error("Unknown exchange: {0}")]
    UnknownExchange(ExchangeId),

    /// Order construction or mutation broke an invariant
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// Trade construction broke an invariant
    #[error("Invalid trade: {0}")]
    InvalidTrade(String),

    /// Exchange API errors
    #[error("Exchange: {0}")]
    Exchange(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Portfolio snapshot errors
    #[error("Snapshot: {0}")]
    Snapshot(String),

    /// A callback failed while the engine was already handling an ERROR event
    #[error("fatal: {handler}::{callback} failed while handling ERROR ({origin}): {cause}")]
    FatalErrorLoop {
        handler: HandlerId,
        callback: Callback,
        origin: String,
        cause: anyhow::Error,
    },

    /// IO
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization
    #[error("Serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Adapter could not reach its venue. Retrying is the adapter's business.
#[derive(Debug, Clone, Error)]
#[error("cannot connect to {exchange}: {reason}")]
pub struct ConnectError {
    pub exchange: ExchangeId,
    pub reason: String,
}

impl ConnectError {
    pub fn new(exchange: ExchangeId, reason: impl Into<String>) -> Self {
        Self {
            exchange,
            reason: reason.into(),
        }
    }
}

/// Exchange-level refusal of a submit or cancel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("rejected by venue: {0}")]
    Rejected(String),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("unknown order: {0}")]
    UnknownOrder(OrderId),

    #[error("venue timed out")]
    Timeout,

    #[error("not connected")]
    NotConnected,
}
