//! Portfolio Manager - positions, cash and marks

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::snapshot::PortfolioSnapshot;
use crate::types::{Balance, Decimal, ExchangeId, InstrumentId, Position, StrategyId, Trade};

const PRICE_HISTORY: usize = 1000;

type PositionKey = (Option<StrategyId>, InstrumentId, ExchangeId);

/// Portfolio Manager
///
/// Positions are keyed by (strategy, instrument, exchange); venue account
/// positions have no strategy. Accessors hand out copies.
pub struct PortfolioManager {
    positions: HashMap<PositionKey, Position>,
    cash: HashMap<(ExchangeId, String), Balance>,
    last_price: HashMap<InstrumentId, Decimal>,
    history: HashMap<InstrumentId, VecDeque<(DateTime<Utc>, Decimal)>>,
}

impl PortfolioManager {
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
            cash: HashMap::new(),
            last_price: HashMap::new(),
            history: HashMap::new(),
        }
    }

    /// Market print: record the price and mark open positions
    pub fn on_trade(&mut self, trade: &Trade) {
        let instrument = trade.instrument();
        let price = trade.price();
        self.last_price.insert(instrument.clone(), price);

        let history = self.history.entry(instrument.clone()).or_default();
        if history.len() == PRICE_HISTORY {
            history.pop_front();
        }
        history.push_back((trade.timestamp(), price));

        for ((_, inst, _), pos) in self.positions.iter_mut() {
            if inst == instrument {
                pos.mark(price);
            }
        }
    }

    /// Confirmed fill on one of our orders. Returns the realized P&L.
    pub fn on_traded(&mut self, trade: &Trade, strategy: Option<StrategyId>) -> Decimal {
        let (instrument, exchange, side) = match trade.my_order() {
            Some(o) => (o.instrument.clone(), o.exchange.clone(), o.side),
            None => (trade.instrument().clone(), trade.exchange().clone(), trade.side()),
        };
        let volume = trade.my_fill();
        if volume.is_zero() {
            return Decimal::ZERO;
        }

        let position = self
            .positions
            .entry((strategy, instrument.clone(), exchange.clone()))
            .or_insert_with(|| Position::new(instrument, exchange, strategy));
        let realized = position.apply(side, volume, trade.price(), trade.timestamp());

        info!(
            "Position {} on {}: {} @ {} (realized {})",
            position.instrument, position.exchange, position.size, position.price, realized
        );
        realized
    }

    /// Venue account position (no strategy)
    pub fn update_account(&mut self, position: Position) {
        let key = (None, position.instrument.clone(), position.exchange.clone());
        self.positions.insert(key, Position { strategy: None, ..position });
    }

    pub fn update_cash(&mut self, balance: Balance) {
        debug!("Cash {} on {}: {}", balance.currency, balance.exchange, balance.balance);
        self.cash
            .insert((balance.exchange.clone(), balance.currency.clone()), balance);
    }

    /// Move cash by `delta`, creating the balance if needed
    pub fn adjust_cash(&mut self, exchange: &ExchangeId, currency: &str, delta: Decimal) {
        let balance = self
            .cash
            .entry((exchange.clone(), currency.to_string()))
            .or_insert_with(|| Balance {
                exchange: exchange.clone(),
                currency: currency.to_string(),
                balance: Decimal::ZERO,
                reserved: Decimal::ZERO,
            });
        balance.balance += delta;
    }

    /// Filtered copy of positions
    pub fn positions(
        &self,
        strategy: Option<StrategyId>,
        instrument: Option<&InstrumentId>,
        exchange: Option<&ExchangeId>,
    ) -> Vec<Position> {
        let mut out: Vec<Position> = self
            .positions
            .iter()
            .filter(|((s, i, e), _)| {
                (strategy.is_none() || *s == strategy)
                    && instrument.is_none_or(|want| want == i)
                    && exchange.is_none_or(|want| want == e)
            })
            .map(|(_, p)| p.clone())
            .collect();
        out.sort_by(|a, b| (&a.instrument, &a.exchange).cmp(&(&b.instrument, &b.exchange)));
        out
    }

    /// Positions with no strategy, as loaded from venues
    pub fn accounts(&self) -> Vec<Position> {
        self.positions
            .iter()
            .filter(|((s, _, _), _)| s.is_none())
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn cash(&self, exchange: &ExchangeId, currency: &str) -> Option<Balance> {
        self.cash
            .get(&(exchange.clone(), currency.to_string()))
            .cloned()
    }

    pub fn balances(&self) -> Vec<Balance> {
        let mut out: Vec<Balance> = self.cash.values().cloned().collect();
        out.sort_by(|a, b| (&a.exchange, &a.currency).cmp(&(&b.exchange, &b.currency)));
        out
    }

    pub fn last_price(&self, instrument: &InstrumentId) -> Option<Decimal> {
        self.last_price.get(instrument).copied()
    }

    pub fn price_history(&self, instrument: &InstrumentId) -> Vec<(DateTime<Utc>, Decimal)> {
        self.history
            .get(instrument)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn realized_pnl(&self, strategy: Option<StrategyId>) -> Decimal {
        self.positions(strategy, None, None)
            .iter()
            .map(|p| p.realized_pnl)
            .sum()
    }

    pub fn unrealized_pnl(&self, strategy: Option<StrategyId>) -> Decimal {
        self.positions(strategy, None, None)
            .iter()
            .map(|p| p.unrealized_pnl)
            .sum()
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot::new(self.balances())
    }

    /// Replace cash balances with a stored snapshot
    pub fn restore(&mut self, snapshot: &PortfolioSnapshot) {
        self.cash.clear();
        for balance in &snapshot.positions {
            self.update_cash(balance.clone());
        }
        info!("Restored {} cash balances", self.cash.len());
    }
}

impl Default for PortfolioManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Order, Side};

    fn fill(side: Side, volume: i64, price: i64, id: &str) -> Trade {
        let order = Order::limit("BTC-USD".into(), "paper".into(), side, Decimal::from(volume), Decimal::from(price))
            .unwrap()
            .with_id(id)
            .with_filled(Decimal::from(volume))
            .unwrap();
        Trade::new(Decimal::from(volume), Decimal::from(price), order.clone(), vec![])
            .unwrap()
            .attributed(order, Decimal::from(volume))
    }

    #[test]
    fn test_unknown_instrument_starts_flat() {
        let mut pm = PortfolioManager::new();
        let s = Some(StrategyId(0));
        pm.on_traded(&fill(Side::Buy, 1, 100, "42"), s);

        let positions = pm.positions(s, Some(&"BTC-USD".into()), None);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].size, Decimal::ONE);
        assert_eq!(positions[0].price, Decimal::from(100));
    }

    #[test]
    fn test_realized_and_unrealized_pnl() {
        let mut pm = PortfolioManager::new();
        let s = Some(StrategyId(0));
        pm.on_traded(&fill(Side::Buy, 2, 100, "1"), s);
        let realized = pm.on_traded(&fill(Side::Sell, 1, 110, "2"), s);
        assert_eq!(realized, Decimal::from(10));

        pm.on_trade(&fill(Side::Buy, 1, 120, "3"));
        assert_eq!(pm.last_price(&"BTC-USD".into()), Some(Decimal::from(120)));
        assert_eq!(pm.unrealized_pnl(s), Decimal::from(20));
        assert_eq!(pm.realized_pnl(s), Decimal::from(10));
        assert_eq!(pm.price_history(&"BTC-USD".into()).len(), 1);
    }

    #[test]
    fn test_positions_are_copies_and_filtered() {
        let mut pm = PortfolioManager::new();
        pm.on_traded(&fill(Side::Buy, 1, 100, "1"), Some(StrategyId(0)));
        pm.on_traded(&fill(Side::Sell, 3, 100, "2"), Some(StrategyId(1)));

        let mut copy = pm.positions(Some(StrategyId(0)), None, None);
        copy[0].size = Decimal::from(99);
        assert_eq!(pm.positions(Some(StrategyId(0)), None, None)[0].size, Decimal::ONE);
        assert_eq!(pm.positions(Some(StrategyId(1)), None, None)[0].size, Decimal::from(-3));
        assert_eq!(pm.positions(None, None, Some(&"other".into())).len(), 0);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut pm = PortfolioManager::new();
        pm.adjust_cash(&"paper".into(), "USD", Decimal::from(500));
        let snapshot = pm.snapshot();

        let mut fresh = PortfolioManager::new();
        fresh.restore(&snapshot);
        assert_eq!(fresh.balances(), pm.balances());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut pm = PortfolioManager::new();
        for i in 0..(PRICE_HISTORY + 5) {
            pm.on_trade(&fill(Side::Buy, 1, 100 + i as i64, "x"));
        }
        assert_eq!(pm.price_history(&"BTC-USD".into()).len(), PRICE_HISTORY);
    }
}
