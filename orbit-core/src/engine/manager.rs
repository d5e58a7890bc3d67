//! Strategy Manager - root handler
//! Fans every event out to portfolio, risk and orders (in that order) and
//! routes order-entry outcomes back to the strategy that caused them.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::Context;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::engine::order::OrderManager;
use crate::engine::portfolio::PortfolioManager;
use crate::engine::risk::RiskGate;
use crate::error::Result;
use crate::event::{Event, EventId, EventKind, HandlerFailure, Payload};
use crate::handler::Callback;
use crate::types::*;

/// Callbacks the manager itself implements
pub const MANAGER_CALLBACKS: &[Callback] = &[
    Callback::OnTrade,
    Callback::OnOpen,
    Callback::OnCancel,
    Callback::OnChange,
    Callback::OnFill,
    Callback::OnData,
    Callback::OnHalt,
    Callback::OnContinue,
    Callback::OnError,
    Callback::OnStart,
    Callback::OnExit,
    Callback::OnTraded,
    Callback::OnReceived,
    Callback::OnRejected,
    Callback::OnCanceled,
];

/// Optional filters for order and trade queries
#[derive(Debug, Clone, Default)]
pub struct OrderFilter<'a> {
    pub instrument: Option<&'a InstrumentId>,
    pub exchange: Option<&'a ExchangeId>,
    pub side: Option<Side>,
}

impl OrderFilter<'_> {
    fn matches(&self, instrument: &InstrumentId, exchange: &ExchangeId, side: Side) -> bool {
        self.instrument.is_none_or(|i| i == instrument)
            && self.exchange.is_none_or(|e| e == exchange)
            && self.side.is_none_or(|s| s == side)
    }
}

pub struct StrategyManager {
    risk: RiskGate,
    orders: OrderManager,
    portfolio: PortfolioManager,
    instruments: Instruments,
    /// Outcome event -> (strategy, order) it was raised for
    alerted: HashMap<EventId, (StrategyId, Order)>,
    /// BOUGHT/SOLD raised from a TRADE whose fill is already booked
    booked: HashSet<EventId>,
    open_orders: HashMap<StrategyId, Vec<Order>>,
    past_orders: HashMap<StrategyId, Vec<Order>>,
    trades: HashMap<StrategyId, Vec<Trade>>,
    outbox: flume::Sender<Event>,
    next_client_id: u64,
    load_accounts: bool,
    timeout: Duration,
    last_error: Option<HandlerFailure>,
}

impl StrategyManager {
    /// `outbox` is the engine's secondary-event queue
    pub fn new(config: &EngineConfig, outbox: flume::Sender<Event>) -> Self {
        Self {
            risk: RiskGate::new(&config.risk),
            orders: OrderManager::new(config.adapter_timeout()),
            portfolio: PortfolioManager::new(),
            instruments: Instruments::new(),
            alerted: HashMap::new(),
            booked: HashSet::new(),
            open_orders: HashMap::new(),
            past_orders: HashMap::new(),
            trades: HashMap::new(),
            outbox,
            next_client_id: 0,
            load_accounts: config.load_accounts,
            timeout: config.adapter_timeout(),
            last_error: None,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Components
    // ─────────────────────────────────────────────────────────────

    pub fn risk(&self) -> &RiskGate {
        &self.risk
    }

    pub fn risk_mut(&mut self) -> &mut RiskGate {
        &mut self.risk
    }

    pub fn order_manager(&self) -> &OrderManager {
        &self.orders
    }

    pub(crate) fn order_manager_mut(&mut self) -> &mut OrderManager {
        &mut self.orders
    }

    pub fn portfolio(&self) -> &PortfolioManager {
        &self.portfolio
    }

    pub fn portfolio_mut(&mut self) -> &mut PortfolioManager {
        &mut self.portfolio
    }

    pub fn instruments(&self) -> &Instruments {
        &self.instruments
    }

    pub fn last_error(&self) -> Option<&HandlerFailure> {
        self.last_error.as_ref()
    }

    /// Outcome events still waiting to be handled
    pub fn correlations(&self) -> usize {
        self.alerted.len()
    }

    // ─────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────

    pub async fn handle(&mut self, callback: Callback, event: &Event) -> anyhow::Result<()> {
        match callback {
            Callback::OnTrade => self.on_trade(event),
            Callback::OnOpen | Callback::OnChange | Callback::OnFill => self.on_order_update(event),
            Callback::OnCancel => self.on_cancel(event),
            Callback::OnData => {
                debug!("DATA event {}", event);
                Ok(())
            }
            Callback::OnHalt => {
                self.risk.halt(format!("HALT event {}", event.id().0));
                Ok(())
            }
            Callback::OnContinue => {
                self.risk.resume();
                Ok(())
            }
            Callback::OnError => {
                self.on_error(event);
                Ok(())
            }
            Callback::OnStart => self.on_start().await,
            Callback::OnExit => {
                self.on_exit();
                Ok(())
            }
            Callback::OnTraded => self.on_traded(event),
            Callback::OnReceived => {
                self.alerted.remove(&event.id());
                Ok(())
            }
            Callback::OnRejected => self.on_rejected(event),
            Callback::OnCanceled => self.on_canceled(event),
            Callback::OnOrder | Callback::OnBought | Callback::OnSold => Ok(()),
        }
    }

    fn on_trade(&mut self, event: &Event) -> anyhow::Result<()> {
        let trade = event.as_trade().context("TRADE event without a trade")?;
        self.portfolio.on_trade(trade);

        for matched in self.orders.on_trade(trade) {
            let Some(order) = matched.trade.my_order().cloned() else {
                continue;
            };
            // book before any strategy sees this TRADE
            self.book_fill(&matched.trade, matched.strategy);

            let kind = match order.side {
                Side::Buy => EventKind::Bought,
                Side::Sell => EventKind::Sold,
            };
            let id = self.emit(kind, Payload::Trade(matched.trade), matched.strategy, Some(order));
            self.booked.insert(id);
        }
        Ok(())
    }

    fn on_order_update(&mut self, event: &Event) -> anyhow::Result<()> {
        let order = event.as_order().context("order event without an order")?;
        if let Some((strategy, done)) = self.orders.on_order_update(order) {
            self.risk.release(done.client_id);
            if let Some(s) = strategy {
                self.close_open(s, done.client_id);
            }
        }
        Ok(())
    }

    fn on_cancel(&mut self, event: &Event) -> anyhow::Result<()> {
        let order = event.as_order().context("CANCEL event without an order")?;
        if let Some((strategy, done)) = self.orders.on_cancel(order) {
            self.emit(EventKind::Canceled, Payload::Order(done.clone()), strategy, Some(done));
        }
        Ok(())
    }

    fn on_traded(&mut self, event: &Event) -> anyhow::Result<()> {
        let trade = event.as_trade().context("fill outcome without a trade")?;
        let correlated = self.alerted.remove(&event.id());
        if self.booked.remove(&event.id()) {
            return Ok(());
        }

        // outcome raised outside this manager: book it now
        let strategy = correlated.map(|(s, _)| s).or(event.target());
        self.book_fill(trade, strategy);
        Ok(())
    }

    /// Apply a fill attributed to one of our orders
    fn book_fill(&mut self, trade: &Trade, strategy: Option<StrategyId>) {
        if !trade.my_fill().is_zero() {
            self.portfolio.on_traded(trade, strategy);
            self.settle_cash(trade);
        }
        self.risk.on_traded(trade);

        let (Some(s), Some(order)) = (strategy, trade.my_order()) else {
            return;
        };
        if !trade.my_fill().is_zero() {
            self.trades.entry(s).or_default().push(trade.clone());
        }
        if order.finished() {
            self.close_open(s, order.client_id);
        } else if let Some(open) = self
            .open_orders
            .get_mut(&s)
            .and_then(|v| v.iter_mut().find(|o| o.client_id == order.client_id))
        {
            *open = order.clone();
        }
    }

    fn settle_cash(&mut self, trade: &Trade) {
        let Some(order) = trade.my_order() else {
            return;
        };
        let Some(currency) = self.instruments.currency(&order.instrument) else {
            return;
        };
        let notional = trade.price() * trade.my_fill();
        let delta = match order.side {
            Side::Buy => -notional,
            Side::Sell => notional,
        };
        let currency = currency.id.to_string();
        self.portfolio.adjust_cash(&order.exchange, &currency, delta);
    }

    fn on_rejected(&mut self, event: &Event) -> anyhow::Result<()> {
        let Some((strategy, order)) = self.alerted.remove(&event.id()) else {
            return Ok(());
        };
        // a refused cancel leaves the order working at the venue
        if order.is_assigned() && self.orders.is_pending(&order.id) {
            return Ok(());
        }
        self.risk.on_rejected(&order);
        self.close_open(strategy, order.client_id);
        Ok(())
    }

    fn on_canceled(&mut self, event: &Event) -> anyhow::Result<()> {
        let Some((strategy, order)) = self.alerted.remove(&event.id()) else {
            if let Some(order) = event.as_order() {
                self.risk.on_canceled(order);
            }
            return Ok(());
        };
        self.risk.on_canceled(&order);
        self.close_open(strategy, order.client_id);
        Ok(())
    }

    fn on_error(&mut self, event: &Event) {
        match event.as_failure() {
            Some(failure) => {
                error!("Handler failure: {}", failure);
                self.last_error = Some(failure.clone());
            }
            None => error!("ERROR event {} without details", event),
        }
    }

    async fn on_start(&mut self) -> anyhow::Result<()> {
        let adapters: Vec<_> = self.orders.adapters().cloned().collect();
        for adapter in adapters {
            let exchange = adapter.exchange().clone();

            let instruments = timeout(self.timeout, adapter.instruments())
                .await
                .with_context(|| format!("{exchange}: instruments timed out"))??;
            let count = instruments.len();
            for instrument in instruments {
                self.instruments.insert(instrument.traded_on(exchange.clone()));
            }

            if self.load_accounts {
                let accounts = timeout(self.timeout, adapter.accounts())
                    .await
                    .with_context(|| format!("{exchange}: accounts timed out"))??;
                for position in accounts {
                    self.risk.set_position(position.instrument.clone(), position.size);
                    self.portfolio.update_account(position);
                }
            }

            let balances = timeout(self.timeout, adapter.balance())
                .await
                .with_context(|| format!("{exchange}: balance timed out"))??;
            for balance in balances {
                self.portfolio.update_cash(balance);
            }
            info!("📡 {} ready: {} instruments", exchange, count);
        }

        let dangling = self.instruments.dangling();
        if !dangling.is_empty() {
            warn!("Instruments reference unknown ids: {:?}", dangling);
        }
        Ok(())
    }

    fn on_exit(&self) {
        info!(
            "🛑 Exit: {} pending orders, {} active in risk",
            self.orders.pending_count(),
            self.risk.active_count()
        );
        for pos in self.portfolio.positions(None, None, None) {
            if pos.size.is_zero() && pos.realized_pnl.is_zero() {
                continue;
            }
            info!(
                "  {} {} on {}: {} @ {} (realized {}, unrealized {})",
                pos.strategy.map(|s| s.to_string()).unwrap_or_else(|| "account".into()),
                pos.instrument,
                pos.exchange,
                pos.size,
                pos.price,
                pos.realized_pnl,
                pos.unrealized_pnl
            );
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Actions (called by strategies through their context)
    // ─────────────────────────────────────────────────────────────

    /// Risk-check and submit `order` for `strategy`.
    ///
    /// The outcome arrives as RECEIVED or REJECTED. Only a missing exchange
    /// is an error.
    pub async fn new_order(&mut self, strategy: StrategyId, mut order: Order) -> Result<bool> {
        self.next_client_id += 1;
        order.client_id = ClientOrderId(self.next_client_id);
        let client_id = order.client_id;

        self.open_orders.entry(strategy).or_default().push(order.clone());
        self.past_orders.entry(strategy).or_default().push(order.clone());

        let (mut order, approved) = self.risk.evaluate(strategy, order);
        if !approved {
            self.emit(EventKind::Rejected, Payload::Order(order.clone()), Some(strategy), Some(order));
            return Ok(false);
        }

        let accepted = match self.orders.submit(Some(strategy), &mut order).await {
            Ok(accepted) => accepted,
            Err(e) => {
                self.risk.release(client_id);
                self.close_open(strategy, client_id);
                return Err(e);
            }
        };

        if accepted {
            for list in [&mut self.open_orders, &mut self.past_orders] {
                if let Some(entry) = list
                    .get_mut(&strategy)
                    .and_then(|v| v.iter_mut().find(|o| o.client_id == client_id))
                {
                    entry.id = order.id.clone();
                }
            }
            self.emit(EventKind::Received, Payload::Order(order.clone()), Some(strategy), Some(order));
        } else {
            self.emit(EventKind::Rejected, Payload::Order(order.clone()), Some(strategy), Some(order));
        }
        Ok(accepted)
    }

    /// Cancel; CANCELED on success, REJECTED otherwise
    pub async fn cancel_order(&mut self, strategy: StrategyId, order: &Order) -> Result<bool> {
        let accepted = self.orders.cancel(order).await?;
        let kind = if accepted {
            EventKind::Canceled
        } else {
            EventKind::Rejected
        };
        self.emit(kind, Payload::Order(order.clone()), Some(strategy), Some(order.clone()));
        Ok(accepted)
    }

    /// Cancel every working order of `strategy`
    pub async fn cancel_all(
        &mut self,
        strategy: StrategyId,
        instrument: Option<&InstrumentId>,
    ) -> Result<Vec<bool>> {
        let working: Vec<Order> = self
            .orders(strategy, OrderFilter { instrument, ..Default::default() })
            .into_iter()
            .filter(|o| o.is_assigned())
            .collect();

        let mut results = Vec::with_capacity(working.len());
        for order in &working {
            results.push(self.cancel_order(strategy, order).await?);
        }
        Ok(results)
    }

    /// Flatten every open position of `strategy` with market orders
    pub async fn close_all(
        &mut self,
        strategy: StrategyId,
        instrument: Option<&InstrumentId>,
    ) -> Result<Vec<bool>> {
        let open: Vec<Position> = self
            .portfolio
            .positions(Some(strategy), instrument, None)
            .into_iter()
            .filter(|p| !p.size.is_zero())
            .collect();

        let mut results = Vec::with_capacity(open.len());
        for pos in open {
            let side = if pos.size.is_sign_positive() {
                Side::Sell
            } else {
                Side::Buy
            };
            info!("Closing {} {} on {}", pos.size, pos.instrument, pos.exchange);
            let order = Order::market(pos.instrument, pos.exchange, side, pos.size.abs())?;
            results.push(self.new_order(strategy, order).await?);
        }
        Ok(results)
    }

    // ─────────────────────────────────────────────────────────────
    // Queries (copies)
    // ─────────────────────────────────────────────────────────────

    pub fn orders(&self, strategy: StrategyId, filter: OrderFilter<'_>) -> Vec<Order> {
        Self::select(self.open_orders.get(&strategy), &filter)
    }

    pub fn past_orders(&self, strategy: StrategyId, filter: OrderFilter<'_>) -> Vec<Order> {
        Self::select(self.past_orders.get(&strategy), &filter)
    }

    pub fn trades(&self, strategy: StrategyId, filter: OrderFilter<'_>) -> Vec<Trade> {
        self.trades
            .get(&strategy)
            .map(|v| {
                v.iter()
                    .filter(|t| {
                        let side = t.my_order().map(|o| o.side).unwrap_or_else(|| t.side());
                        filter.matches(t.instrument(), t.exchange(), side)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn select(orders: Option<&Vec<Order>>, filter: &OrderFilter<'_>) -> Vec<Order> {
        orders
            .map(|v| {
                v.iter()
                    .filter(|o| filter.matches(&o.instrument, &o.exchange, o.side))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ─────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────

    fn emit(
        &mut self,
        kind: EventKind,
        payload: Payload,
        strategy: Option<StrategyId>,
        order: Option<Order>,
    ) -> EventId {
        let event = Event::outcome(kind, payload, strategy);
        let id = event.id();
        if let (Some(s), Some(o)) = (strategy, order) {
            self.alerted.insert(event.id(), (s, o));
        }
        debug!("Emitting {} for {:?}", event, strategy);
        if self.outbox.send(event).is_err() {
            warn!("Secondary queue closed, dropping {} outcome", kind);
        }
        id
    }

    /// Order is done: drop it from the open list and prune its correlations
    fn close_open(&mut self, strategy: StrategyId, client_id: ClientOrderId) {
        if let Some(open) = self.open_orders.get_mut(&strategy) {
            open.retain(|o| o.client_id != client_id);
        }
        self.alerted.retain(|_, (_, o)| o.client_id != client_id);
    }
}
