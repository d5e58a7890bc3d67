//! Event printer - logs everything it is subscribed to

use async_trait::async_trait;
use orbit_core::{Callback, Event, Strategy, StrategyContext};
use tracing::{info, warn};

const CALLBACKS: [Callback; 10] = [
    Callback::OnTrade,
    Callback::OnOrder,
    Callback::OnStart,
    Callback::OnExit,
    Callback::OnError,
    Callback::OnBought,
    Callback::OnSold,
    Callback::OnReceived,
    Callback::OnRejected,
    Callback::OnCanceled,
];

#[derive(Debug, Default)]
pub struct PrintStrategy {
    seen: u64,
}

impl PrintStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events printed so far
    pub fn seen(&self) -> u64 {
        self.seen
    }

    fn print(&mut self, callback: Callback, event: &Event) {
        self.seen += 1;
        if let Some(trade) = event.as_trade() {
            info!(
                "[{}] {} {} {} @ {} on {}",
                callback,
                event,
                trade.side(),
                trade.volume(),
                trade.price(),
                trade.exchange()
            );
        } else if let Some(order) = event.as_order() {
            info!("[{}] {} {}", callback, event, order);
        } else {
            info!("[{}] {}", callback, event);
        }
    }
}

#[async_trait]
impl Strategy for PrintStrategy {
    fn name(&self) -> &str {
        "print"
    }

    fn callbacks(&self) -> &[Callback] {
        &CALLBACKS
    }

    async fn on_trade(&mut self, event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        self.print(Callback::OnTrade, event);
        Ok(())
    }

    async fn on_order(&mut self, event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        self.print(Callback::OnOrder, event);
        Ok(())
    }

    async fn on_start(&mut self, event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        self.print(Callback::OnStart, event);
        Ok(())
    }

    async fn on_exit(&mut self, event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        self.print(Callback::OnExit, event);
        info!("print: {} events seen", self.seen);
        Ok(())
    }

    async fn on_error(&mut self, event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        self.seen += 1;
        match event.as_failure() {
            Some(failure) => warn!("[on_error] {}", failure),
            None => warn!("[on_error] {}", event),
        }
        Ok(())
    }

    async fn on_bought(&mut self, event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        self.print(Callback::OnBought, event);
        Ok(())
    }

    async fn on_sold(&mut self, event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        self.print(Callback::OnSold, event);
        Ok(())
    }

    async fn on_received(&mut self, event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        self.print(Callback::OnReceived, event);
        Ok(())
    }

    async fn on_rejected(&mut self, event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        self.print(Callback::OnRejected, event);
        Ok(())
    }

    async fn on_canceled(&mut self, event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        self.print(Callback::OnCanceled, event);
        Ok(())
    }
}
