//! Risk Gate - pre-trade approval, hard limits before anything reaches a venue

use std::collections::HashMap;

use chrono::NaiveTime;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RiskConfig;
use crate::types::{ClientOrderId, InstrumentId, Order, Side, StrategyId, Trade};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("trading paused: {0}")]
    TradingPaused(String),

    #[error("{0} outside trading hours {1}-{2}")]
    OutsideTradingHours(NaiveTime, NaiveTime, NaiveTime),

    #[error("{0} active orders, max {1}")]
    TooManyOrders(usize, usize),

    #[error("order notional {0} exceeds max {1}")]
    OrderTooLarge(Decimal, Decimal),

    #[error("position {0} + order {1} exceeds max position {2}")]
    PositionOverflow(Decimal, Decimal, Decimal),
}

/// Risk Gate
///
/// Rejection has no side effects. Approval tracks the order in the active
/// set until a trade finishes it or it is rejected or canceled.
pub struct RiskGate {
    config: RiskConfig,
    active: HashMap<ClientOrderId, (StrategyId, Order)>,
    positions: HashMap<InstrumentId, Decimal>,
    trading_hours: HashMap<StrategyId, (NaiveTime, NaiveTime)>,
    paused: bool,
    pause_reason: Option<String>,
}

impl RiskGate {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            config: config.clone(),
            active: HashMap::new(),
            positions: HashMap::new(),
            trading_hours: HashMap::new(),
            paused: false,
            pause_reason: None,
        }
    }

    /// Approve or reject `order` for `strategy`
    pub fn evaluate(&mut self, strategy: StrategyId, order: Order) -> (Order, bool) {
        if let Err(e) = self.check(strategy, &order) {
            warn!("Risk rejected {} for {}: {}", order, strategy, e);
            return (order, false);
        }
        self.active
            .entry(order.client_id)
            .or_insert_with(|| (strategy, order.clone()));
        (order, true)
    }

    pub fn check(&self, strategy: StrategyId, order: &Order) -> Result<(), RiskError> {
        // 1. Trading paused?
        if self.paused {
            return Err(RiskError::TradingPaused(
                self.pause_reason.clone().unwrap_or_else(|| "unknown".into()),
            ));
        }

        // 2. Trading hours
        if let Some(&(open, close)) = self.trading_hours.get(&strategy) {
            let t = order.timestamp.time();
            let inside = if open <= close {
                open <= t && t < close
            } else {
                t >= open || t < close
            };
            if !inside {
                return Err(RiskError::OutsideTradingHours(t, open, close));
            }
        }

        // 3. Working order count, not counting a re-check of this order
        if let Some(max) = self.config.max_active_orders {
            let working = self
                .active
                .iter()
                .filter(|(id, (s, _))| *s == strategy && **id != order.client_id)
                .count();
            if working >= max {
                return Err(RiskError::TooManyOrders(working, max));
            }
        }

        // 4. Order size
        if let Some(max) = self.config.max_order_notional {
            let notional = order.notional().abs();
            if notional > max {
                return Err(RiskError::OrderTooLarge(notional, max));
            }
        }

        // 5. Position incl. working exposure
        if let Some(max) = self.config.max_position {
            let current = self.exposure(&order.instrument, Some(order.client_id));
            let delta = signed(order.side, order.remaining());
            if (current + delta).abs() > max {
                return Err(RiskError::PositionOverflow(current, delta, max));
            }
        }

        Ok(())
    }

    /// Net filled position plus remaining volume of working orders
    fn exposure(&self, instrument: &InstrumentId, skip: Option<ClientOrderId>) -> Decimal {
        let working: Decimal = self
            .active
            .iter()
            .filter(|(id, (_, o))| Some(**id) != skip && &o.instrument == instrument)
            .map(|(_, (_, o))| signed(o.side, o.remaining()))
            .sum();
        self.position(instrument) + working
    }

    pub fn position(&self, instrument: &InstrumentId) -> Decimal {
        self.positions.get(instrument).copied().unwrap_or(Decimal::ZERO)
    }

    /// Confirmed fill on one of our orders
    pub fn on_traded(&mut self, trade: &Trade) {
        let Some(order) = trade.my_order() else {
            return;
        };
        self.update_position(&order.instrument, order.side, trade.my_fill());

        if order.finished() {
            self.active.remove(&order.client_id);
        } else if let Some((_, tracked)) = self.active.get_mut(&order.client_id) {
            *tracked = order.clone();
        }
    }

    pub fn on_rejected(&mut self, order: &Order) {
        self.active.remove(&order.client_id);
    }

    pub fn on_canceled(&mut self, order: &Order) {
        self.active.remove(&order.client_id);
    }

    /// Drop an approved order that never reached a venue
    pub fn release(&mut self, client_id: ClientOrderId) {
        self.active.remove(&client_id);
    }

    fn update_position(&mut self, instrument: &InstrumentId, side: Side, volume: Decimal) {
        let entry = self.positions.entry(instrument.clone()).or_insert(Decimal::ZERO);
        *entry += signed(side, volume);
        if entry.is_zero() {
            self.positions.remove(instrument);
        }
    }

    /// Load a venue position (e.g. on START)
    pub fn set_position(&mut self, instrument: InstrumentId, size: Decimal) {
        if size.is_zero() {
            self.positions.remove(&instrument);
        } else {
            self.positions.insert(instrument, size);
        }
    }

    /// Only approve orders for `strategy` stamped within [open, close).
    /// A window with close < open wraps midnight.
    pub fn restrict_trading_hours(&mut self, strategy: StrategyId, open: NaiveTime, close: NaiveTime) {
        self.trading_hours.insert(strategy, (open, close));
    }

    /// Pause all trading.
    pub fn halt(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("⏸️ Trading halted: {}", reason);
        self.paused = true;
        self.pause_reason = Some(reason);
    }

    /// Resume trading.
    pub fn resume(&mut self) {
        if self.paused {
            info!("▶️ Trading resumed");
        }
        self.paused = false;
        self.pause_reason = None;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_active(&self, client_id: ClientOrderId) -> bool {
        self.active.contains_key(&client_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

fn signed(side: Side, volume: Decimal) -> Decimal {
    match side {
        Side::Buy => volume,
        Side::Sell => -volume,
    }
}
