//! Instrument arena
//! Instruments reference each other (currency, underlying, legs) by id only.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ExchangeId, InstrumentId, Side};

/// Instrument kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentType {
    Currency,
    Equity,
    Bond,
    Option,
    Future,
    PerpetualFuture,
    Pair,
    Spread,
    Index,
    Other,
}

/// Instrument record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub kind: InstrumentType,
    #[serde(default)]
    pub exchanges: Vec<ExchangeId>,
    #[serde(default)]
    pub currency: Option<InstrumentId>,
    #[serde(default)]
    pub underlying: Option<InstrumentId>,
    #[serde(default)]
    pub leg1: Option<InstrumentId>,
    #[serde(default)]
    pub leg2: Option<InstrumentId>,
    #[serde(default)]
    pub leg1_side: Option<Side>,
    #[serde(default)]
    pub leg2_side: Option<Side>,
    #[serde(default)]
    pub price_increment: Option<Decimal>,
    #[serde(default)]
    pub unit_value: Option<Decimal>,
    /// Venue-specific symbol, e.g. "BTCUSDT"
    #[serde(default)]
    pub broker_id: Option<String>,
}

impl Instrument {
    pub fn new(id: impl Into<InstrumentId>, kind: InstrumentType) -> Self {
        Self {
            id: id.into(),
            kind,
            exchanges: Vec::new(),
            currency: None,
            underlying: None,
            leg1: None,
            leg2: None,
            leg1_side: None,
            leg2_side: None,
            price_increment: None,
            unit_value: None,
            broker_id: None,
        }
    }

    /// Currency pair, e.g. BTC-USD quoted in USD
    pub fn pair(id: impl Into<InstrumentId>, base: InstrumentId, quote: InstrumentId) -> Self {
        let mut instrument = Self::new(id, InstrumentType::Pair);
        instrument.leg1 = Some(base);
        instrument.leg1_side = Some(Side::Buy);
        instrument.currency = Some(quote);
        instrument
    }

    pub fn traded_on(mut self, exchange: ExchangeId) -> Self {
        if !self.exchanges.contains(&exchange) {
            self.exchanges.push(exchange);
        }
        self
    }

    /// All instruments this one refers to
    pub fn references(&self) -> impl Iterator<Item = &InstrumentId> {
        [&self.currency, &self.underlying, &self.leg1, &self.leg2]
            .into_iter()
            .flatten()
    }
}

/// Arena of instruments keyed by stable id
#[derive(Debug, Clone, Default)]
pub struct Instruments {
    by_id: HashMap<InstrumentId, Instrument>,
}

impl Instruments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or merge. Venues listed on an existing record are kept.
    pub fn insert(&mut self, instrument: Instrument) {
        match self.by_id.get_mut(&instrument.id) {
            Some(existing) => {
                let mut exchanges = std::mem::take(&mut existing.exchanges);
                for ex in &instrument.exchanges {
                    if !exchanges.contains(ex) {
                        exchanges.push(ex.clone());
                    }
                }
                *existing = instrument;
                existing.exchanges = exchanges;
            }
            None => {
                self.by_id.insert(instrument.id.clone(), instrument);
            }
        }
    }

    pub fn get(&self, id: &InstrumentId) -> Option<&Instrument> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &InstrumentId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.by_id.values()
    }

    pub fn currency(&self, id: &InstrumentId) -> Option<&Instrument> {
        self.resolve(id, |i| i.currency.as_ref())
    }

    pub fn underlying(&self, id: &InstrumentId) -> Option<&Instrument> {
        self.resolve(id, |i| i.underlying.as_ref())
    }

    pub fn legs(&self, id: &InstrumentId) -> (Option<&Instrument>, Option<&Instrument>) {
        (
            self.resolve(id, |i| i.leg1.as_ref()),
            self.resolve(id, |i| i.leg2.as_ref()),
        )
    }

    /// Instruments listed on `exchange`
    pub fn on_exchange<'a>(&'a self, exchange: &'a ExchangeId) -> impl Iterator<Item = &'a Instrument> {
        self.by_id.values().filter(move |i| i.exchanges.contains(exchange))
    }

    /// Ids referenced by some instrument but missing from the arena
    pub fn dangling(&self) -> Vec<InstrumentId> {
        let mut missing: Vec<InstrumentId> = self
            .by_id
            .values()
            .flat_map(|i| i.references())
            .filter(|r| !self.by_id.contains_key(*r))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    fn resolve<F>(&self, id: &InstrumentId, link: F) -> Option<&Instrument>
    where
        F: Fn(&Instrument) -> Option<&InstrumentId>,
    {
        self.by_id.get(id).and_then(link).and_then(|r| self.by_id.get(r))
    }
}
