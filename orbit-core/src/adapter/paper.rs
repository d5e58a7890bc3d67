//! Paper venue - in-process exchange for simulation and tests
//! No order book: orders rest until canceled, market orders can be filled
//! at the last traded price.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::ExchangeAdapter;
use crate::error::{ConnectError, Error, RejectReason, Result};
use crate::event::Event;
use crate::types::*;

pub struct PaperExchange {
    exchange: ExchangeId,
    instruments: Vec<Instrument>,
    next_order_id: AtomicU64,
    connected: AtomicBool,
    rejecting: AtomicBool,
    unreachable: AtomicBool,
    auto_fill: AtomicBool,
    latency_ms: AtomicU64,
    feed_tx: Mutex<Option<flume::Sender<Event>>>,
    feed_rx: Mutex<Option<flume::Receiver<Event>>>,
    last_price: Mutex<HashMap<InstrumentId, Decimal>>,
    accounts: Mutex<Vec<Position>>,
    balances: Mutex<Vec<Balance>>,
    resting: Mutex<HashSet<OrderId>>,
    submitted: Mutex<Vec<Order>>,
    canceled: Mutex<Vec<Order>>,
}

impl PaperExchange {
    pub fn new(exchange: impl Into<ExchangeId>) -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            exchange: exchange.into(),
            instruments: Vec::new(),
            next_order_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
            rejecting: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
            auto_fill: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            feed_tx: Mutex::new(Some(tx)),
            feed_rx: Mutex::new(Some(rx)),
            last_price: Mutex::new(HashMap::new()),
            accounts: Mutex::new(Vec::new()),
            balances: Mutex::new(Vec::new()),
            resting: Mutex::new(HashSet::new()),
            submitted: Mutex::new(Vec::new()),
            canceled: Mutex::new(Vec::new()),
        }
    }

    /// First exchange id handed out; ids count up from here
    pub fn with_first_order_id(self, id: u64) -> Self {
        self.next_order_id.store(id, Ordering::Relaxed);
        self
    }

    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instruments.push(instrument.traded_on(self.exchange.clone()));
        self
    }

    pub fn with_account(self, position: Position) -> Self {
        self.accounts.lock().push(position);
        self
    }

    pub fn with_balance(self, currency: &str, amount: Decimal) -> Self {
        self.balances.lock().push(Balance {
            exchange: self.exchange.clone(),
            currency: currency.to_string(),
            balance: amount,
            reserved: Decimal::ZERO,
        });
        self
    }

    /// Fill market orders at the last traded price as soon as they are accepted
    pub fn with_auto_fill(self) -> Self {
        self.auto_fill.store(true, Ordering::Relaxed);
        self
    }

    /// Refuse every submit and cancel
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::Relaxed);
    }

    /// Make `connect` fail
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Relaxed);
    }

    /// Delay every submit and cancel by `latency`
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::Relaxed);
    }

    async fn round_trip(&self) {
        let ms = self.latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Push an event into the venue's tick stream.
    /// Returns false once the feed is closed.
    pub fn inject(&self, event: Event) -> bool {
        if let Some(trade) = event.as_trade() {
            self.last_price
                .lock()
                .insert(trade.instrument().clone(), trade.price());
        }
        match self.feed_tx.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// End the tick stream once queued events are delivered
    pub fn close_feed(&self) {
        self.feed_tx.lock().take();
    }

    pub fn submitted(&self) -> Vec<Order> {
        self.submitted.lock().clone()
    }

    pub fn canceled(&self) -> Vec<Order> {
        self.canceled.lock().clone()
    }

    pub fn is_resting(&self, id: &str) -> bool {
        self.resting.lock().contains(id)
    }

    fn fill_at_last(&self, order: &Order) -> std::result::Result<(), RejectReason> {
        let Some(price) = self.last_price.lock().get(&order.instrument).copied() else {
            return Ok(());
        };
        let taker = order
            .clone()
            .with_filled(order.volume())
            .map_err(|e| RejectReason::Rejected(e.to_string()))?;
        let trade = Trade::new(order.volume(), price, taker, Vec::new())
            .map_err(|e| RejectReason::Rejected(e.to_string()))?
            .with_id(format!("paper-{}", order.id));

        debug!("Paper fill: {} @ {}", order, price);
        self.resting.lock().remove(&order.id);
        self.inject(Event::trade(trade));
        Ok(())
    }
}

#[async_trait]
impl ExchangeAdapter for PaperExchange {
    fn exchange(&self) -> &ExchangeId {
        &self.exchange
    }

    async fn connect(&self) -> std::result::Result<(), ConnectError> {
        if self.unreachable.load(Ordering::Relaxed) {
            return Err(ConnectError::new(self.exchange.clone(), "paper venue unreachable"));
        }
        self.connected.store(true, Ordering::Relaxed);
        info!("📄 Paper venue {} connected", self.exchange);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::Relaxed);
        info!("Paper venue {} disconnected", self.exchange);
        Ok(())
    }

    async fn instruments(&self) -> Result<Vec<Instrument>> {
        Ok(self.instruments.clone())
    }

    async fn tick(&self, tx: flume::Sender<Event>) -> Result<()> {
        let rx = self
            .feed_rx
            .lock()
            .take()
            .ok_or_else(|| Error::Exchange(format!("{} tick stream already consumed", self.exchange)))?;

        while let Ok(event) = rx.recv_async().await {
            if tx.send_async(event).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<Position>> {
        Ok(self.accounts.lock().clone())
    }

    async fn balance(&self) -> Result<Vec<Balance>> {
        Ok(self.balances.lock().clone())
    }

    async fn submit_order(&self, order: &mut Order) -> std::result::Result<OrderId, RejectReason> {
        self.round_trip().await;
        if !self.is_connected() {
            return Err(RejectReason::NotConnected);
        }
        if self.rejecting.load(Ordering::Relaxed) {
            return Err(RejectReason::Rejected("paper venue rejecting".into()));
        }

        let id = self.next_order_id.fetch_add(1, Ordering::Relaxed).to_string();
        order.id = id.clone();
        self.resting.lock().insert(id.clone());
        self.submitted.lock().push(order.clone());

        if order.order_type == OrderType::Market && self.auto_fill.load(Ordering::Relaxed) {
            self.fill_at_last(order)?;
        }
        Ok(id)
    }

    async fn cancel_order(&self, order: &Order) -> std::result::Result<(), RejectReason> {
        self.round_trip().await;
        if !self.is_connected() {
            return Err(RejectReason::NotConnected);
        }
        if self.rejecting.load(Ordering::Relaxed) {
            return Err(RejectReason::Rejected("paper venue rejecting".into()));
        }
        if !self.resting.lock().remove(&order.id) {
            return Err(RejectReason::UnknownOrder(order.id.clone()));
        }
        self.canceled.lock().push(order.clone());
        Ok(())
    }
}
