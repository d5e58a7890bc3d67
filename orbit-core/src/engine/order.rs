//! Order Manager - Handles order lifecycle across exchanges

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::adapter::ExchangeAdapter;
use crate::error::{Error, Result};
use crate::types::{Decimal, ExchangeId, Order, OrderId, StrategyId, Trade};

/// A trade attributed to one of our pending orders
#[derive(Debug, Clone)]
pub struct Matched {
    pub strategy: Option<StrategyId>,
    /// Copy of the trade with `my_order` set to the updated local order
    pub trade: Trade,
}

/// Order Manager - routes orders to venues and owns the pending-order index
pub struct OrderManager {
    adapters: HashMap<ExchangeId, Arc<dyn ExchangeAdapter>>,
    pending: HashMap<OrderId, (Order, Option<StrategyId>)>,
    timeout: Duration,
}

impl OrderManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            adapters: HashMap::new(),
            pending: HashMap::new(),
            timeout,
        }
    }

    pub fn add_adapter(&mut self, adapter: Arc<dyn ExchangeAdapter>) -> Result<()> {
        let exchange = adapter.exchange().clone();
        if self.adapters.contains_key(&exchange) {
            return Err(Error::Config(format!("exchange {exchange} installed twice")));
        }
        self.adapters.insert(exchange, adapter);
        Ok(())
    }

    pub fn adapter(&self, exchange: &ExchangeId) -> Result<Arc<dyn ExchangeAdapter>> {
        self.adapters
            .get(exchange)
            .cloned()
            .ok_or_else(|| Error::UnknownExchange(exchange.clone()))
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn ExchangeAdapter>> {
        self.adapters.values()
    }

    /// Submit `order`; true if the venue accepted it.
    ///
    /// An unknown exchange is an error. Venue rejections and timeouts are
    /// `Ok(false)` and leave `order.id` empty.
    pub async fn submit(&mut self, strategy: Option<StrategyId>, order: &mut Order) -> Result<bool> {
        let adapter = self.adapter(&order.exchange)?;
        info!("Placing order: {}", order);

        match timeout(self.timeout, adapter.submit_order(order)).await {
            Ok(Ok(id)) => {
                order.id = id;
                self.pending
                    .insert(order.id.clone(), (order.clone(), strategy));
                info!("Order accepted: {} -> {}", order.client_id, order.id);
                Ok(true)
            }
            Ok(Err(reason)) => {
                order.id.clear();
                warn!("Order rejected by {}: {} ({})", order.exchange, order.client_id, reason);
                Ok(false)
            }
            Err(_) => {
                order.id.clear();
                warn!("Order submit timed out on {}: {}", order.exchange, order.client_id);
                Ok(false)
            }
        }
    }

    /// Cancel `order`; true if the venue accepted the cancel.
    pub async fn cancel(&mut self, order: &Order) -> Result<bool> {
        let adapter = self.adapter(&order.exchange)?;
        info!("Canceling order: {}", order.id);

        match timeout(self.timeout, adapter.cancel_order(order)).await {
            Ok(Ok(())) => {
                self.pending.remove(&order.id);
                Ok(true)
            }
            Ok(Err(reason)) => {
                warn!("Cancel rejected by {}: {} ({})", order.exchange, order.id, reason);
                Ok(false)
            }
            Err(_) => {
                warn!("Cancel timed out on {}: {}", order.exchange, order.id);
                Ok(false)
            }
        }
    }

    /// Attribute `trade` to pending orders.
    ///
    /// The first pending maker leg matches, and independently the taker leg,
    /// so a self-trade yields two matches. Finished orders leave the index.
    pub fn on_trade(&mut self, trade: &Trade) -> Vec<Matched> {
        let mut matched = Vec::new();

        let maker = trade
            .maker_orders()
            .iter()
            .find(|m| !m.id.is_empty() && self.pending.contains_key(&m.id));
        if let Some(m) = maker.and_then(|leg| self.apply_fill(leg, trade)) {
            matched.push(m);
        }

        let taker = trade.taker_order();
        if !taker.id.is_empty() && self.pending.contains_key(&taker.id) {
            if let Some(m) = self.apply_fill(taker, trade) {
                matched.push(m);
            }
        }
        matched
    }

    fn apply_fill(&mut self, leg: &Order, trade: &Trade) -> Option<Matched> {
        let (tracked, strategy) = self.pending.get_mut(&leg.id)?;
        let before = tracked.filled();
        // fills only move forward and never past our own volume
        let filled = leg.filled().min(tracked.volume()).max(before);
        tracked.set_filled(filled).ok()?;
        if leg.finished() && !tracked.finished() {
            tracked.finish();
        }

        let fill = filled - before;
        let finished = tracked.finished();
        if fill.is_zero() && !finished {
            debug!("Trade {} carries no new fill for {}", trade.id, leg.id);
            return None;
        }

        let matched = Matched {
            strategy: *strategy,
            trade: trade.attributed(tracked.clone(), fill),
        };
        info!(
            "Matched trade {} to {} ({} {} @ {}, finished={})",
            trade.id,
            leg.id,
            tracked.side,
            fill,
            trade.price(),
            finished
        );

        if finished {
            self.pending.remove(&leg.id);
        }
        Some(matched)
    }

    /// Venue-side cancel of a pending order.
    /// Returns the owner and the final state of the order.
    pub fn on_cancel(&mut self, order: &Order) -> Option<(Option<StrategyId>, Order)> {
        let (mut tracked, strategy) = self.pending.remove(&order.id)?;
        let filled = order.filled().min(tracked.volume()).max(tracked.filled());
        if tracked.set_filled(filled).is_err() {
            warn!("Ignoring bad fill {} on canceled {}", order.filled(), order.id);
        }
        tracked.finish();
        info!("Order canceled by venue: {}", order.id);
        Some((strategy, tracked))
    }

    /// OPEN / CHANGE / FILL from a venue. Returns the order if it finished.
    pub fn on_order_update(&mut self, order: &Order) -> Option<(Option<StrategyId>, Order)> {
        let (tracked, _) = self.pending.get_mut(&order.id)?;
        let filled = order.filled().min(tracked.volume()).max(tracked.filled());
        if tracked.set_filled(filled).is_err() {
            return None;
        }
        if !tracked.finished() {
            return None;
        }
        info!("Order finished by venue update: {}", order.id);
        self.pending.remove(&order.id).map(|(o, s)| (s, o))
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Copies of pending orders, optionally for one strategy
    pub fn pending(&self, strategy: Option<StrategyId>) -> Vec<Order> {
        self.pending
            .values()
            .filter(|(_, s)| strategy.is_none() || *s == strategy)
            .map(|(o, _)| o.clone())
            .collect()
    }

    /// Filled amount currently tracked for a pending order
    pub fn filled(&self, id: &str) -> Option<Decimal> {
        self.pending.get(id).map(|(o, _)| o.filled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::PaperExchange;
    use crate::types::{OrderFlag, Side};

    async fn manager() -> (OrderManager, Arc<PaperExchange>) {
        let venue = Arc::new(PaperExchange::new("paper").with_first_order_id(42));
        venue.connect().await.unwrap();
        let mut om = OrderManager::new(Duration::from_secs(1));
        om.add_adapter(venue.clone()).unwrap();
        (om, venue)
    }

    fn order(side: Side, volume: i64) -> Order {
        Order::limit("BTC-USD".into(), "paper".into(), side, Decimal::from(volume), Decimal::from(100)).unwrap()
    }

    fn trade_with(taker: Order, makers: Vec<Order>) -> Trade {
        Trade::new(taker.filled(), Decimal::from(100), taker, makers).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_exchange() {
        let (mut om, _) = manager().await;
        let mut o = Order::limit("BTC-USD".into(), "nowhere".into(), Side::Buy, Decimal::ONE, Decimal::ONE).unwrap();
        assert!(matches!(om.submit(None, &mut o).await, Err(Error::UnknownExchange(_))));
        assert_eq!(om.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_taker_match_removes_finished() {
        let (mut om, _) = manager().await;
        let mut o = order(Side::Buy, 10);
        assert!(om.submit(Some(StrategyId(0)), &mut o).await.unwrap());
        assert!(om.is_pending("42"));

        let taker = o.clone().with_filled(Decimal::from(10)).unwrap();
        let matched = om.on_trade(&trade_with(taker, vec![]));

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].strategy, Some(StrategyId(0)));
        assert_eq!(matched[0].trade.my_fill(), Decimal::from(10));
        assert!(matched[0].trade.my_order().is_some_and(|o| o.finished()));
        assert!(!om.is_pending("42"));
    }

    #[tokio::test]
    async fn test_first_pending_maker_matches_partially() {
        let (mut om, _) = manager().await;
        let mut o = order(Side::Sell, 10);
        om.submit(Some(StrategyId(1)), &mut o).await.unwrap();

        let stranger = order(Side::Sell, 5).with_id("7").with_filled(Decimal::from(5)).unwrap();
        let ours = o.clone().with_filled(Decimal::from(4)).unwrap();
        let taker = order(Side::Buy, 9).with_id("x").with_filled(Decimal::from(9)).unwrap();

        let matched = om.on_trade(&trade_with(taker, vec![stranger, ours]));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].trade.my_fill(), Decimal::from(4));
        assert_eq!(om.filled("42"), Some(Decimal::from(4)));
    }

    #[tokio::test]
    async fn test_self_trade_matches_both_legs() {
        let (mut om, _) = manager().await;
        let mut buy = order(Side::Buy, 1);
        let mut sell = order(Side::Sell, 1);
        om.submit(Some(StrategyId(0)), &mut buy).await.unwrap();
        om.submit(Some(StrategyId(1)), &mut sell).await.unwrap();

        let taker = buy.clone().with_filled(Decimal::ONE).unwrap();
        let maker = sell.clone().with_filled(Decimal::ONE).unwrap();
        let matched = om.on_trade(&trade_with(taker, vec![maker]));

        let owners: Vec<_> = matched.iter().map(|m| m.strategy).collect();
        assert_eq!(owners, vec![Some(StrategyId(1)), Some(StrategyId(0))]);
        assert_eq!(om.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_submit_is_not_pending() {
        let (mut om, venue) = manager().await;
        venue.set_rejecting(true);
        let mut o = order(Side::Buy, 1);
        assert!(!om.submit(None, &mut o).await.unwrap());
        assert!(o.id.is_empty());
        assert_eq!(om.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_and_venue_cancel() {
        let (mut om, _) = manager().await;
        let mut a = order(Side::Buy, 2);
        let mut b = order(Side::Buy, 2);
        om.submit(Some(StrategyId(0)), &mut a).await.unwrap();
        om.submit(Some(StrategyId(0)), &mut b).await.unwrap();

        assert!(om.cancel(&a).await.unwrap());
        assert!(!om.is_pending(&a.id));
        assert!(!om.cancel(&a).await.unwrap());

        let partial = b.clone().with_filled(Decimal::ONE).unwrap();
        let (owner, last) = om.on_cancel(&partial).unwrap();
        assert_eq!(owner, Some(StrategyId(0)));
        assert_eq!(last.filled(), Decimal::ONE);
        assert!(last.finished());
        assert!(om.on_cancel(&partial).is_none());
    }

    #[tokio::test]
    async fn test_submit_timeout_is_not_accepted() {
        let venue = Arc::new(PaperExchange::new("paper").with_first_order_id(42));
        venue.connect().await.unwrap();
        let mut om = OrderManager::new(Duration::from_millis(20));
        om.add_adapter(venue.clone()).unwrap();

        venue.set_latency(Duration::from_millis(500));
        let mut o = order(Side::Buy, 1);
        assert!(!om.submit(Some(StrategyId(0)), &mut o).await.unwrap());
        assert_eq!(om.pending_count(), 0);
        assert!(o.id.is_empty());
        assert!(venue.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_timeout_keeps_order_pending() {
        let venue = Arc::new(PaperExchange::new("paper").with_first_order_id(42));
        venue.connect().await.unwrap();
        let mut om = OrderManager::new(Duration::from_millis(20));
        om.add_adapter(venue.clone()).unwrap();

        let mut o = order(Side::Buy, 1);
        assert!(om.submit(None, &mut o).await.unwrap());

        venue.set_latency(Duration::from_millis(500));
        assert!(!om.cancel(&o).await.unwrap());
        assert!(om.is_pending("42"));
        assert!(venue.is_resting("42"));
    }

    #[tokio::test]
    async fn test_forced_finish_without_fill() {
        let (mut om, _) = manager().await;
        let mut o = order(Side::Buy, 10).with_flag(OrderFlag::ImmediateOrCancel);
        assert!(om.submit(Some(StrategyId(0)), &mut o).await.unwrap());

        let mut taker = o.clone();
        taker.finish();
        let matched = om.on_trade(&trade_with(taker, vec![]));

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].trade.my_fill(), Decimal::ZERO);
        assert!(matched[0].trade.my_order().unwrap().finished());
        assert!(!om.is_pending("42"));
    }
}
