//! Exchange Adapter - The venue abstraction
//! Every venue (live, sandbox or paper) implements this same interface

pub mod paper;

use async_trait::async_trait;

use crate::error::{ConnectError, RejectReason, Result};
use crate::event::Event;
use crate::types::*;

pub use paper::PaperExchange;

/// Exchange Adapter Trait
///
/// Consumed by the order manager (order entry) and the engine loop
/// (connection and tick stream). All calls are bounded by the engine's
/// adapter timeout.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    // ─────────────────────────────────────────────────────────────
    // Identity & connection
    // ─────────────────────────────────────────────────────────────

    /// Venue id; orders route here by `order.exchange`
    fn exchange(&self) -> &ExchangeId;

    /// Establish the session. Reconnect policy belongs to the adapter.
    async fn connect(&self) -> std::result::Result<(), ConnectError>;

    /// Tear down the session
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Reference data & market data
    // ─────────────────────────────────────────────────────────────

    /// Instruments tradable on this venue
    async fn instruments(&self) -> Result<Vec<Instrument>>;

    /// Stream events into `tx` until the venue closes.
    /// Called once per adapter; not restartable.
    async fn tick(&self, tx: flume::Sender<Event>) -> Result<()>;

    // ─────────────────────────────────────────────────────────────
    // Account
    // ─────────────────────────────────────────────────────────────

    /// Positions held at the venue
    async fn accounts(&self) -> Result<Vec<Position>>;

    /// Cash balances held at the venue
    async fn balance(&self) -> Result<Vec<Balance>>;

    // ─────────────────────────────────────────────────────────────
    // Trading
    // ─────────────────────────────────────────────────────────────

    /// Submit an order; on success `order.id` is set to the returned id
    async fn submit_order(&self, order: &mut Order) -> std::result::Result<OrderId, RejectReason>;

    /// Cancel a resting order
    async fn cancel_order(&self, order: &Order) -> std::result::Result<(), RejectReason>;
}
