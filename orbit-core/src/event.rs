//! Events - the unit of work flowing through the dispatch loop

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::handler::{Callback, HandlerId};
use crate::types::{Order, StrategyId, Trade};

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Heartbeat,
    Trade,
    Open,
    Cancel,
    Change,
    Fill,
    Bought,
    Sold,
    Received,
    Rejected,
    Canceled,
    Data,
    Halt,
    Continue,
    Error,
    Start,
    Exit,
}

impl EventKind {
    pub const ALL: [EventKind; 17] = [
        EventKind::Heartbeat,
        EventKind::Trade,
        EventKind::Open,
        EventKind::Cancel,
        EventKind::Change,
        EventKind::Fill,
        EventKind::Bought,
        EventKind::Sold,
        EventKind::Received,
        EventKind::Rejected,
        EventKind::Canceled,
        EventKind::Data,
        EventKind::Halt,
        EventKind::Continue,
        EventKind::Error,
        EventKind::Start,
        EventKind::Exit,
    ];

    /// Order-entry outcomes synthesized by the strategy manager
    pub fn is_outcome(self) -> bool {
        matches!(
            self,
            EventKind::Bought
                | EventKind::Sold
                | EventKind::Received
                | EventKind::Rejected
                | EventKind::Canceled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Heartbeat => "HEARTBEAT",
            EventKind::Trade => "TRADE",
            EventKind::Open => "OPEN",
            EventKind::Cancel => "CANCEL",
            EventKind::Change => "CHANGE",
            EventKind::Fill => "FILL",
            EventKind::Bought => "BOUGHT",
            EventKind::Sold => "SOLD",
            EventKind::Received => "RECEIVED",
            EventKind::Rejected => "REJECTED",
            EventKind::Canceled => "CANCELED",
            EventKind::Data => "DATA",
            EventKind::Halt => "HALT",
            EventKind::Continue => "CONTINUE",
            EventKind::Error => "ERROR",
            EventKind::Start => "START",
            EventKind::Exit => "EXIT",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique, process-wide event id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl EventId {
    fn next() -> Self {
        EventId(NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A callback that failed, wrapped as the payload of an ERROR event
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub source: Box<Event>,
    pub callback: Callback,
    pub handler: HandlerId,
    pub cause: Arc<anyhow::Error>,
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}::{} failed on {}: {:#}",
            self.handler,
            self.callback,
            self.source.kind(),
            self.cause
        )
    }
}

/// Event payload
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    None,
    Trade(Trade),
    Order(Order),
    Error(HandlerFailure),
}

/// Event
///
/// Immutable once built; handlers only ever see `&Event`.
#[derive(Debug, Clone)]
pub struct Event {
    id: EventId,
    kind: EventKind,
    payload: Payload,
    target: Option<StrategyId>,
    timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, payload: Payload) -> Self {
        Self {
            id: EventId::next(),
            kind,
            payload,
            target: None,
            timestamp: Utc::now(),
        }
    }

    pub fn heartbeat() -> Self {
        Self::new(EventKind::Heartbeat, Payload::None)
    }

    pub fn start() -> Self {
        Self::new(EventKind::Start, Payload::None)
    }

    pub fn exit() -> Self {
        Self::new(EventKind::Exit, Payload::None)
    }

    pub fn halt() -> Self {
        Self::new(EventKind::Halt, Payload::None)
    }

    pub fn resume() -> Self {
        Self::new(EventKind::Continue, Payload::None)
    }

    pub fn trade(trade: Trade) -> Self {
        Self::new(EventKind::Trade, Payload::Trade(trade))
    }

    /// Order-state event from a venue (OPEN, CANCEL, CHANGE, FILL)
    pub fn order(kind: EventKind, order: Order) -> Self {
        Self::new(kind, Payload::Order(order))
    }

    pub fn error(failure: HandlerFailure) -> Self {
        Self::new(EventKind::Error, Payload::Error(failure))
    }

    /// Outcome event addressed to one strategy
    pub fn outcome(kind: EventKind, payload: Payload, target: Option<StrategyId>) -> Self {
        let mut event = Self::new(kind, payload);
        event.target = target;
        event
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn target(&self) -> Option<StrategyId> {
        self.target
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn as_trade(&self) -> Option<&Trade> {
        match &self.payload {
            Payload::Trade(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_order(&self) -> Option<&Order> {
        match &self.payload {
            Payload::Order(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_failure(&self) -> Option<&HandlerFailure> {
        match &self.payload {
            Payload::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind, self.id.0)
    }
}
