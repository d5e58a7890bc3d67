//! Core Types - Strong typing for safety

pub mod instrument;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use instrument::{Instrument, InstrumentType, Instruments};
pub use rust_decimal::Decimal;

use crate::error::{Error, Result};

const VOLUME_DP: u32 = 8;
const PRICE_DP: u32 = 4;

/// Exchange-assigned order id. Empty until the venue accepts the order.
pub type OrderId = String;

/// Venue identifier (e.g. "COINBASE")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct ExchangeId(String);

impl ExchangeId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExchangeId {
    fn from(s: &str) -> Self {
        ExchangeId::new(s)
    }
}

impl From<String> for ExchangeId {
    fn from(s: String) -> Self {
        ExchangeId::new(s)
    }
}

/// Stable instrument identifier (e.g. "BTC-USD"); the arena key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        InstrumentId::new(s)
    }
}

impl From<String> for InstrumentId {
    fn from(s: String) -> Self {
        InstrumentId::new(s)
    }
}

/// Locally assigned order id, known before the venue assigns its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientOrderId(pub u64);

impl std::fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Registered strategy handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyId(pub u32);

impl StrategyId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "strategy#{}", self.0)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
    Stop,
}

/// Fill policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderFlag {
    #[default]
    None,
    FillOrKill,
    AllOrNone,
    ImmediateOrCancel,
}

/// Order
///
/// `0 <= filled <= volume` holds after every mutation. Volume is positive
/// except for STOP orders, which start at zero and are sized when triggered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OrderRecord")]
pub struct Order {
    pub id: OrderId,
    pub client_id: ClientOrderId,
    pub instrument: InstrumentId,
    pub exchange: ExchangeId,
    pub side: Side,
    pub order_type: OrderType,
    pub flag: OrderFlag,
    pub timestamp: DateTime<Utc>,
    volume: Decimal,
    price: Decimal,
    filled: Decimal,
    stop_target: Option<Box<Order>>,
    force_done: bool,
}

impl Order {
    pub fn new(
        instrument: InstrumentId,
        exchange: ExchangeId,
        side: Side,
        volume: Decimal,
        price: Decimal,
        order_type: OrderType,
    ) -> Result<Self> {
        if order_type == OrderType::Stop {
            return Err(Error::InvalidOrder(
                "stop orders need a target, use Order::stop".into(),
            ));
        }
        let volume = volume.round_dp(VOLUME_DP);
        if volume <= Decimal::ZERO {
            return Err(Error::InvalidOrder(format!("volume must be positive, got {volume}")));
        }

        Ok(Self {
            id: OrderId::new(),
            client_id: ClientOrderId::default(),
            instrument,
            exchange,
            side,
            order_type,
            flag: OrderFlag::None,
            timestamp: Utc::now(),
            volume,
            price: price.round_dp(PRICE_DP),
            filled: Decimal::ZERO,
            stop_target: None,
            force_done: false,
        })
    }

    pub fn limit(
        instrument: InstrumentId,
        exchange: ExchangeId,
        side: Side,
        volume: Decimal,
        price: Decimal,
    ) -> Result<Self> {
        Self::new(instrument, exchange, side, volume, price, OrderType::Limit)
    }

    pub fn market(
        instrument: InstrumentId,
        exchange: ExchangeId,
        side: Side,
        volume: Decimal,
    ) -> Result<Self> {
        Self::new(instrument, exchange, side, volume, Decimal::ZERO, OrderType::Market)
    }

    /// STOP order that releases `target` once `trigger` trades.
    pub fn stop(trigger: Decimal, target: Order) -> Result<Self> {
        if target.order_type == OrderType::Stop {
            return Err(Error::InvalidOrder("stop target cannot itself be a stop".into()));
        }

        Ok(Self {
            id: OrderId::new(),
            client_id: ClientOrderId::default(),
            instrument: target.instrument.clone(),
            exchange: target.exchange.clone(),
            side: target.side,
            order_type: OrderType::Stop,
            flag: OrderFlag::None,
            timestamp: Utc::now(),
            volume: Decimal::ZERO,
            price: trigger.round_dp(PRICE_DP),
            filled: Decimal::ZERO,
            stop_target: Some(Box::new(target)),
            force_done: false,
        })
    }

    pub fn with_id(mut self, id: impl Into<OrderId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_flag(mut self, flag: OrderFlag) -> Self {
        self.flag = flag;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_filled(mut self, filled: Decimal) -> Result<Self> {
        self.set_filled(filled)?;
        Ok(self)
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn filled(&self) -> Decimal {
        self.filled
    }

    pub fn remaining(&self) -> Decimal {
        self.volume - self.filled
    }

    pub fn notional(&self) -> Decimal {
        self.volume * self.price
    }

    pub fn stop_target(&self) -> Option<&Order> {
        self.stop_target.as_deref()
    }

    pub fn is_assigned(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn finished(&self) -> bool {
        self.volume == self.filled || self.force_done
    }

    /// Mark the order done without a full fill (IOC/FOK leftovers).
    pub fn finish(&mut self) {
        self.force_done = true;
    }

    pub fn set_volume(&mut self, volume: Decimal) -> Result<()> {
        let volume = volume.round_dp(VOLUME_DP);
        if volume < Decimal::ZERO || (volume.is_zero() && self.order_type != OrderType::Stop) {
            return Err(Error::InvalidOrder(format!("volume must be positive, got {volume}")));
        }
        if volume < self.filled {
            return Err(Error::InvalidOrder(format!(
                "volume {volume} below filled {}",
                self.filled
            )));
        }
        self.volume = volume;
        Ok(())
    }

    pub fn set_filled(&mut self, filled: Decimal) -> Result<()> {
        let filled = filled.round_dp(VOLUME_DP);
        if filled < Decimal::ZERO || filled > self.volume {
            return Err(Error::InvalidOrder(format!(
                "filled {filled} outside [0, {}]",
                self.volume
            )));
        }
        self.filled = filled;
        Ok(())
    }
}

impl std::fmt::Display for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}@{} {} on {} [{}]",
            self.side, self.instrument, self.volume, self.price, self.client_id, self.exchange, self.id
        )
    }
}

/// Wire form of [`Order`]; checked before it becomes one
#[derive(Deserialize)]
struct OrderRecord {
    #[serde(default)]
    id: OrderId,
    #[serde(default)]
    client_id: ClientOrderId,
    instrument: InstrumentId,
    exchange: ExchangeId,
    side: Side,
    order_type: OrderType,
    #[serde(default)]
    flag: OrderFlag,
    timestamp: DateTime<Utc>,
    volume: Decimal,
    price: Decimal,
    #[serde(default)]
    filled: Decimal,
    #[serde(default)]
    stop_target: Option<Box<Order>>,
    #[serde(default)]
    force_done: bool,
}

impl TryFrom<OrderRecord> for Order {
    type Error = Error;

    fn try_from(r: OrderRecord) -> Result<Self> {
        let mut order = match (r.order_type, r.stop_target) {
            (OrderType::Stop, Some(target)) => {
                let mut stop = Order::stop(r.price, *target)?;
                stop.set_volume(r.volume)?;
                stop
            }
            (OrderType::Stop, None) => {
                return Err(Error::InvalidOrder("stop order without a target".into()));
            }
            (_, Some(_)) => {
                return Err(Error::InvalidOrder("only stop orders carry a target".into()));
            }
            (kind, None) => Order::new(r.instrument, r.exchange, r.side, r.volume, r.price, kind)?,
        };
        order.set_filled(r.filled)?;
        order.id = r.id;
        order.client_id = r.client_id;
        order.flag = r.flag;
        order.timestamp = r.timestamp;
        order.force_done = r.force_done;
        Ok(order)
    }
}

/// Trade
///
/// `volume == taker_order.filled` at construction. `my_order` is only set on
/// the copy the order manager attributes to a locally pending order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TradeRecord")]
pub struct Trade {
    pub id: String,
    pub slippage: Decimal,
    pub transaction_cost: Decimal,
    price: Decimal,
    volume: Decimal,
    taker_order: Order,
    maker_orders: Vec<Order>,
    my_order: Option<Order>,
    my_fill: Option<Decimal>,
}

impl Trade {
    pub fn new(
        volume: Decimal,
        price: Decimal,
        taker_order: Order,
        maker_orders: Vec<Order>,
    ) -> Result<Self> {
        if volume != taker_order.filled() {
            return Err(Error::InvalidTrade(format!(
                "volume {volume} != taker filled {}",
                taker_order.filled()
            )));
        }

        Ok(Self {
            id: String::new(),
            slippage: Decimal::ZERO,
            transaction_cost: Decimal::ZERO,
            price,
            volume,
            taker_order,
            maker_orders,
            my_order: None,
            my_fill: None,
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }

    pub fn taker_order(&self) -> &Order {
        &self.taker_order
    }

    pub fn maker_orders(&self) -> &[Order] {
        &self.maker_orders
    }

    pub fn my_order(&self) -> Option<&Order> {
        self.my_order.as_ref()
    }

    /// Volume this trade filled on `my_order`; the full volume if unattributed
    pub fn my_fill(&self) -> Decimal {
        self.my_fill.unwrap_or(self.volume)
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.taker_order.instrument
    }

    pub fn exchange(&self) -> &ExchangeId {
        &self.taker_order.exchange
    }

    pub fn side(&self) -> Side {
        self.taker_order.side
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.taker_order.timestamp
    }

    pub fn notional(&self) -> Decimal {
        self.price * self.volume
    }

    pub fn finished(&self) -> bool {
        self.taker_order.finished()
    }

    /// Copy of this trade attributed to a local order that filled `fill` on it.
    pub(crate) fn attributed(&self, order: Order, fill: Decimal) -> Self {
        let mut trade = self.clone();
        trade.my_order = Some(order);
        trade.my_fill = Some(fill);
        trade
    }
}

/// Wire form of [`Trade`]
#[derive(Deserialize)]
struct TradeRecord {
    #[serde(default)]
    id: String,
    #[serde(default)]
    slippage: Decimal,
    #[serde(default)]
    transaction_cost: Decimal,
    price: Decimal,
    volume: Decimal,
    taker_order: Order,
    #[serde(default)]
    maker_orders: Vec<Order>,
    #[serde(default)]
    my_order: Option<Order>,
    #[serde(default)]
    my_fill: Option<Decimal>,
}

impl TryFrom<TradeRecord> for Trade {
    type Error = Error;

    fn try_from(r: TradeRecord) -> Result<Self> {
        let mut trade = Trade::new(r.volume, r.price, r.taker_order, r.maker_orders)?.with_id(r.id);
        if r.my_fill.is_some_and(|fill| fill < Decimal::ZERO || fill > r.volume) {
            return Err(Error::InvalidTrade(format!("attributed fill outside [0, {}]", r.volume)));
        }
        trade.slippage = r.slippage;
        trade.transaction_cost = r.transaction_cost;
        trade.my_order = r.my_order;
        trade.my_fill = r.my_fill;
        Ok(trade)
    }
}

/// Position
///
/// Signed size with average-cost basis, keyed by (strategy, instrument,
/// exchange). Strategy is `None` for account positions loaded from a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: InstrumentId,
    pub exchange: ExchangeId,
    pub strategy: Option<StrategyId>,
    pub size: Decimal,
    pub price: Decimal,
    pub last_price: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    pub fn new(instrument: InstrumentId, exchange: ExchangeId, strategy: Option<StrategyId>) -> Self {
        Self {
            instrument,
            exchange,
            strategy,
            size: Decimal::ZERO,
            price: Decimal::ZERO,
            last_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            timestamp: Utc::now(),
        }
    }

    pub fn notional(&self) -> Decimal {
        self.size * self.last_price
    }

    /// Apply a fill; returns the realized P&L it produced.
    pub fn apply(&mut self, side: Side, volume: Decimal, price: Decimal, at: DateTime<Utc>) -> Decimal {
        if volume.is_zero() {
            self.mark(price);
            return Decimal::ZERO;
        }
        let signed = match side {
            Side::Buy => volume,
            Side::Sell => -volume,
        };
        let mut realized = Decimal::ZERO;

        if self.size.is_zero() || self.size.is_sign_positive() == signed.is_sign_positive() {
            let size = self.size + signed;
            if !size.is_zero() {
                self.price = (self.price * self.size.abs() + price * volume) / size.abs();
            }
            self.size = size;
        } else {
            let closing = volume.min(self.size.abs());
            realized = if self.size.is_sign_positive() {
                (price - self.price) * closing
            } else {
                (self.price - price) * closing
            };
            self.size += signed;
            if self.size.is_zero() {
                self.price = Decimal::ZERO;
            } else if self.size.is_sign_positive() == signed.is_sign_positive() {
                // flipped through zero: the remainder opens at the fill price
                self.price = price;
            }
        }

        self.realized_pnl += realized;
        self.timestamp = at;
        self.mark(price);
        realized
    }

    pub fn mark(&mut self, price: Decimal) {
        self.last_price = price;
        self.unrealized_pnl = if self.size.is_zero() {
            Decimal::ZERO
        } else {
            (price - self.price) * self.size
        };
    }
}

/// Cash balance held at a venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub exchange: ExchangeId,
    pub currency: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub reserved: Decimal,
}

impl Balance {
    pub fn available(&self) -> Decimal {
        self.balance - self.reserved
    }
}
