//! Handler Registry - routes each event kind to the callbacks that asked for it

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::event::EventKind;
use crate::types::StrategyId;

/// Named callback slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Callback {
    OnTrade,
    OnOrder,
    OnOpen,
    OnCancel,
    OnChange,
    OnFill,
    OnData,
    OnHalt,
    OnContinue,
    OnError,
    OnStart,
    OnExit,
    OnBought,
    OnSold,
    OnTraded,
    OnReceived,
    OnRejected,
    OnCanceled,
}

impl Callback {
    pub const ALL: [Callback; 18] = [
        Callback::OnTrade,
        Callback::OnOrder,
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
        Callback::OnBought,
        Callback::OnSold,
        Callback::OnTraded,
        Callback::OnReceived,
        Callback::OnRejected,
        Callback::OnCanceled,
    ];

    /// Callbacks fired for `kind`, in invocation order
    pub fn for_kind(kind: EventKind) -> &'static [Callback] {
        match kind {
            EventKind::Heartbeat => &[],
            EventKind::Trade => &[Callback::OnTrade],
            EventKind::Open => &[Callback::OnOpen, Callback::OnOrder],
            EventKind::Cancel => &[Callback::OnCancel, Callback::OnOrder],
            EventKind::Change => &[Callback::OnChange, Callback::OnOrder],
            EventKind::Fill => &[Callback::OnFill, Callback::OnOrder],
            EventKind::Data => &[Callback::OnData],
            EventKind::Halt => &[Callback::OnHalt],
            EventKind::Continue => &[Callback::OnContinue],
            EventKind::Error => &[Callback::OnError],
            EventKind::Start => &[Callback::OnStart],
            EventKind::Exit => &[Callback::OnExit],
            EventKind::Bought => &[Callback::OnBought, Callback::OnTraded],
            EventKind::Sold => &[Callback::OnSold, Callback::OnTraded],
            EventKind::Received => &[Callback::OnReceived],
            EventKind::Rejected => &[Callback::OnRejected],
            EventKind::Canceled => &[Callback::OnCanceled],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Callback::OnTrade => "on_trade",
            Callback::OnOrder => "on_order",
            Callback::OnOpen => "on_open",
            Callback::OnCancel => "on_cancel",
            Callback::OnChange => "on_change",
            Callback::OnFill => "on_fill",
            Callback::OnData => "on_data",
            Callback::OnHalt => "on_halt",
            Callback::OnContinue => "on_continue",
            Callback::OnError => "on_error",
            Callback::OnStart => "on_start",
            Callback::OnExit => "on_exit",
            Callback::OnBought => "on_bought",
            Callback::OnSold => "on_sold",
            Callback::OnTraded => "on_traded",
            Callback::OnReceived => "on_received",
            Callback::OnRejected => "on_rejected",
            Callback::OnCanceled => "on_canceled",
        }
    }
}

impl std::fmt::Display for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of a registered callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerId {
    /// The strategy manager (and through it risk, orders, portfolio)
    Manager,
    Strategy(StrategyId),
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerId::Manager => f.write_str("manager"),
            HandlerId::Strategy(id) => write!(f, "{id}"),
        }
    }
}

/// Event kind -> ordered (callback, handler) pairs
///
/// Built once while handlers are added; dispatch order is registration
/// order, then the per-kind callback order of [`Callback::for_kind`].
#[derive(Debug, Default)]
pub struct Registry {
    handlers: Vec<HandlerId>,
    subscriptions: HashMap<EventKind, Vec<(Callback, HandlerId)>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler`'s callbacks. Returns false if it was already registered.
    pub fn register(&mut self, handler: HandlerId, callbacks: &[Callback]) -> bool {
        if self.is_registered(handler) {
            return false;
        }
        self.handlers.push(handler);

        for kind in EventKind::ALL {
            for callback in Callback::for_kind(kind) {
                if callbacks.contains(callback) {
                    self.subscriptions
                        .entry(kind)
                        .or_default()
                        .push((*callback, handler));
                }
            }
        }
        true
    }

    pub fn subscribers(&self, kind: EventKind) -> &[(Callback, HandlerId)] {
        self.subscriptions
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_registered(&self, handler: HandlerId) -> bool {
        self.handlers.contains(&handler)
    }

    pub fn handlers(&self) -> &[HandlerId] {
        &self.handlers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = Registry::new();
        let strat = HandlerId::Strategy(StrategyId(0));
        assert!(registry.register(strat, &Callback::ALL));
        let before = registry.subscribers(EventKind::Trade).len();

        assert!(!registry.register(strat, &Callback::ALL));
        assert_eq!(registry.subscribers(EventKind::Trade).len(), before);
        assert_eq!(registry.handlers().len(), 1);
    }

    #[test]
    fn test_registration_order_is_dispatch_order() {
        let mut registry = Registry::new();
        registry.register(HandlerId::Manager, &[Callback::OnTrade]);
        registry.register(HandlerId::Strategy(StrategyId(0)), &Callback::ALL);
        registry.register(HandlerId::Strategy(StrategyId(1)), &[Callback::OnTrade]);

        let owners: Vec<_> = registry
            .subscribers(EventKind::Trade)
            .iter()
            .map(|(_, h)| *h)
            .collect();
        assert_eq!(
            owners,
            vec![
                HandlerId::Manager,
                HandlerId::Strategy(StrategyId(0)),
                HandlerId::Strategy(StrategyId(1)),
            ]
        );
    }

    #[test]
    fn test_fill_fires_specific_then_generic() {
        let mut registry = Registry::new();
        registry.register(HandlerId::Manager, &Callback::ALL);
        let callbacks: Vec<_> = registry
            .subscribers(EventKind::Fill)
            .iter()
            .map(|(c, _)| *c)
            .collect();
        assert_eq!(callbacks, vec![Callback::OnFill, Callback::OnOrder]);
        assert!(registry.subscribers(EventKind::Heartbeat).is_empty());
    }
}
