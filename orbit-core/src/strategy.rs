//! Strategy capability
//!
//! Strategies receive every event they subscribe to after the manager's own
//! book-keeping for that event has run, and act through a [`StrategyContext`].

use async_trait::async_trait;

use crate::engine::manager::{OrderFilter, StrategyManager};
use crate::error::Result;
use crate::event::Event;
use crate::handler::Callback;
use crate::types::*;

/// User strategy
///
/// Only `on_trade` is required. Callbacks must not block; anything slow
/// should be awaited so the dispatch loop stays cooperative.
#[async_trait]
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Callbacks to register; all of them by default
    fn callbacks(&self) -> &[Callback] {
        &Callback::ALL
    }

    // ─────────────────────────────────────────────────────────────
    // Market & lifecycle
    // ─────────────────────────────────────────────────────────────

    async fn on_trade(&mut self, event: &Event, ctx: &mut StrategyContext<'_>) -> anyhow::Result<()>;

    /// Any order-state event (OPEN, CANCEL, CHANGE, FILL)
    async fn on_order(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_open(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_cancel(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_change(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_fill(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_data(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_halt(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_continue(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_error(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_start(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_exit(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Order-entry outcomes
    // ─────────────────────────────────────────────────────────────

    async fn on_bought(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_sold(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Either side of a fill, after `on_bought`/`on_sold`
    async fn on_traded(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_received(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_rejected(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_canceled(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Route `callback` to the matching trait method
pub(crate) async fn invoke(
    strategy: &mut dyn Strategy,
    callback: Callback,
    event: &Event,
    ctx: &mut StrategyContext<'_>,
) -> anyhow::Result<()> {
    match callback {
        Callback::OnTrade => strategy.on_trade(event, ctx).await,
        Callback::OnOrder => strategy.on_order(event, ctx).await,
        Callback::OnOpen => strategy.on_open(event, ctx).await,
        Callback::OnCancel => strategy.on_cancel(event, ctx).await,
        Callback::OnChange => strategy.on_change(event, ctx).await,
        Callback::OnFill => strategy.on_fill(event, ctx).await,
        Callback::OnData => strategy.on_data(event, ctx).await,
        Callback::OnHalt => strategy.on_halt(event, ctx).await,
        Callback::OnContinue => strategy.on_continue(event, ctx).await,
        Callback::OnError => strategy.on_error(event, ctx).await,
        Callback::OnStart => strategy.on_start(event, ctx).await,
        Callback::OnExit => strategy.on_exit(event, ctx).await,
        Callback::OnBought => strategy.on_bought(event, ctx).await,
        Callback::OnSold => strategy.on_sold(event, ctx).await,
        Callback::OnTraded => strategy.on_traded(event, ctx).await,
        Callback::OnReceived => strategy.on_received(event, ctx).await,
        Callback::OnRejected => strategy.on_rejected(event, ctx).await,
        Callback::OnCanceled => strategy.on_canceled(event, ctx).await,
    }
}

/// What a strategy may do from inside a callback
pub struct StrategyContext<'a> {
    id: StrategyId,
    manager: &'a mut StrategyManager,
}

impl<'a> StrategyContext<'a> {
    pub(crate) fn new(id: StrategyId, manager: &'a mut StrategyManager) -> Self {
        Self { id, manager }
    }

    pub fn id(&self) -> StrategyId {
        self.id
    }

    /// Submit through risk and the order manager; outcome follows as an event
    pub async fn new_order(&mut self, order: Order) -> Result<bool> {
        self.manager.new_order(self.id, order).await
    }

    pub async fn cancel_order(&mut self, order: &Order) -> Result<bool> {
        self.manager.cancel_order(self.id, order).await
    }

    pub async fn cancel_all(&mut self, instrument: Option<&InstrumentId>) -> Result<Vec<bool>> {
        self.manager.cancel_all(self.id, instrument).await
    }

    pub async fn close_all(&mut self, instrument: Option<&InstrumentId>) -> Result<Vec<bool>> {
        self.manager.close_all(self.id, instrument).await
    }

    pub fn orders(&self, filter: OrderFilter<'_>) -> Vec<Order> {
        self.manager.orders(self.id, filter)
    }

    pub fn past_orders(&self, filter: OrderFilter<'_>) -> Vec<Order> {
        self.manager.past_orders(self.id, filter)
    }

    pub fn trades(&self, filter: OrderFilter<'_>) -> Vec<Trade> {
        self.manager.trades(self.id, filter)
    }

    pub fn positions(&self, instrument: Option<&InstrumentId>, exchange: Option<&ExchangeId>) -> Vec<Position> {
        self.manager
            .portfolio()
            .positions(Some(self.id), instrument, exchange)
    }

    pub fn last_price(&self, instrument: &InstrumentId) -> Option<Decimal> {
        self.manager.portfolio().last_price(instrument)
    }

    pub fn instrument(&self, id: &InstrumentId) -> Option<Instrument> {
        self.manager.instruments().get(id).cloned()
    }
}
