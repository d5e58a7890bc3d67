//! Event Bus - the single dispatch loop
//!
//! Venue producers run as their own tasks and feed bounded channels; the
//! loop fans them in with the heartbeat, dispatches one event at a time and
//! drains the secondary queue before taking the next external event.

use std::sync::Arc;

use futures::stream::{BoxStream, SelectAll, StreamExt, select_all};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::adapter::ExchangeAdapter;
use crate::config::EngineConfig;
use crate::engine::manager::{MANAGER_CALLBACKS, StrategyManager};
use crate::engine::state::{EngineState, StateMachine};
use crate::error::{ConnectError, Error, Result};
use crate::event::{Event, EventKind, HandlerFailure};
use crate::handler::{Callback, HandlerId, Registry};
use crate::strategy::{self, Strategy, StrategyContext};
use crate::types::StrategyId;

type Merged = SelectAll<BoxStream<'static, Event>>;

/// Requests a graceful stop from any task
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        info!("🛑 Shutdown requested");
        self.0.send_replace(true);
    }
}

pub struct Engine {
    config: EngineConfig,
    state: StateMachine,
    adapters: Vec<Arc<dyn ExchangeAdapter>>,
    manager: StrategyManager,
    strategies: Vec<Box<dyn Strategy>>,
    registry: Registry,
    secondary_tx: flume::Sender<Event>,
    secondary_rx: flume::Receiver<Event>,
    shutdown: Arc<watch::Sender<bool>>,
    producers: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        let (secondary_tx, secondary_rx) = flume::unbounded();
        let (shutdown, _) = watch::channel(false);

        let mut registry = Registry::new();
        registry.register(HandlerId::Manager, MANAGER_CALLBACKS);

        Self {
            config: config.clone(),
            state: StateMachine::new(),
            adapters: Vec::new(),
            manager: StrategyManager::new(config, secondary_tx.clone()),
            strategies: Vec::new(),
            registry,
            secondary_tx,
            secondary_rx,
            shutdown: Arc::new(shutdown),
            producers: Vec::new(),
        }
    }

    /// Install a venue. Each exchange id may be installed once.
    pub fn add_exchange(&mut self, adapter: Arc<dyn ExchangeAdapter>) -> Result<()> {
        self.manager.order_manager_mut().add_adapter(adapter.clone())?;
        info!("Installed exchange {}", adapter.exchange());
        self.adapters.push(adapter);
        Ok(())
    }

    /// Register a strategy after the manager; dispatch follows this order
    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) -> StrategyId {
        let id = StrategyId(self.strategies.len() as u32);
        self.registry
            .register(HandlerId::Strategy(id), strategy.callbacks());
        info!("Registered strategy {} as {}", strategy.name(), id);
        self.strategies.push(strategy);
        id
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    /// Queue for events raised outside the venues (e.g. HALT, DATA)
    pub fn event_sink(&self) -> flume::Sender<Event> {
        self.secondary_tx.clone()
    }

    pub fn state(&self) -> EngineState {
        self.state.state()
    }

    pub fn manager(&self) -> &StrategyManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut StrategyManager {
        &mut self.manager
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // ─────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────

    /// Invoke every subscriber of `event`, one after another.
    ///
    /// A failing callback becomes one ERROR event, dispatched at once, then
    /// the loop backs off. A failure while handling ERROR is fatal.
    pub async fn dispatch(&mut self, event: &Event) -> Result<()> {
        if event.kind() == EventKind::Heartbeat {
            return Ok(());
        }

        let subscribers = self.registry.subscribers(event.kind()).to_vec();
        for (callback, handler) in subscribers {
            if !addressed(handler, event) {
                continue;
            }
            let Err(cause) = self.invoke(callback, handler, event).await else {
                continue;
            };

            if event.kind() == EventKind::Error {
                return Err(fatal(handler, callback, event, cause));
            }

            error!("{}::{} failed on {}: {:#}", handler, callback, event, cause);
            let failure = HandlerFailure {
                source: Box::new(event.clone()),
                callback,
                handler,
                cause: Arc::new(cause),
            };
            self.dispatch_error(&Event::error(failure)).await?;

            let backoff = self.config.error_backoff();
            if !backoff.is_zero() {
                tokio::time::sleep(backoff).await;
            }
        }
        Ok(())
    }

    async fn dispatch_error(&mut self, event: &Event) -> Result<()> {
        let subscribers = self.registry.subscribers(EventKind::Error).to_vec();
        for (callback, handler) in subscribers {
            if let Err(cause) = self.invoke(callback, handler, event).await {
                return Err(fatal(handler, callback, event, cause));
            }
        }
        Ok(())
    }

    async fn invoke(&mut self, callback: Callback, handler: HandlerId, event: &Event) -> anyhow::Result<()> {
        match handler {
            HandlerId::Manager => self.manager.handle(callback, event).await,
            HandlerId::Strategy(id) => {
                let Some(strategy) = self.strategies.get_mut(id.index()) else {
                    anyhow::bail!("{id} is not registered");
                };
                let mut ctx = StrategyContext::new(id, &mut self.manager);
                strategy::invoke(strategy.as_mut(), callback, event, &mut ctx).await
            }
        }
    }

    /// Dispatch everything managers queued, including what that queues
    pub async fn drain(&mut self) -> Result<()> {
        while let Ok(event) = self.secondary_rx.try_recv() {
            self.dispatch(&event).await?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Run until shutdown is requested or every source has closed.
    ///
    /// Returns the fatal error if the loop halted on one; EXIT is not
    /// dispatched in that case.
    pub async fn run(&mut self) -> Result<()> {
        self.state.transition(EngineState::Starting)?;
        if let Err(e) = self.connect_all().await {
            error!("Start failed: {}", e);
            self.teardown().await?;
            return Err(e);
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut merged = select_all(self.spawn_producers());
        self.state.transition(EngineState::Running)?;
        info!(
            "✅ Engine running: {} exchanges, {} strategies",
            self.adapters.len(),
            self.strategies.len()
        );

        if let Err(e) = self.event_loop(&mut merged, &mut shutdown_rx).await {
            error!("💥 Engine halted: {}", e);
            self.teardown().await?;
            return Err(e);
        }

        self.state.transition(EngineState::Stopping)?;
        let exit = self.dispatch_exit().await;
        if let Err(e) = &exit {
            error!("💥 Engine halted during exit: {}", e);
        }
        self.teardown().await?;
        exit
    }

    async fn event_loop(&mut self, merged: &mut Merged, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        self.dispatch(&Event::start()).await?;
        self.drain().await?;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = merged.next() => match next {
                    Some(event) => {
                        self.dispatch(&event).await?;
                        self.drain().await?;
                    }
                    None => {
                        info!("All event sources closed");
                        break;
                    }
                },
            }
        }
        Ok(())
    }

    async fn dispatch_exit(&mut self) -> Result<()> {
        self.dispatch(&Event::exit()).await?;
        self.drain().await
    }

    async fn connect_all(&mut self) -> Result<()> {
        let limit = self.config.adapter_timeout();
        for adapter in &self.adapters {
            let exchange = adapter.exchange().clone();
            match timeout(limit, adapter.connect()).await {
                Ok(Ok(())) => info!("Connected to {}", exchange),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(ConnectError::new(exchange, "connect timed out").into()),
            }
        }
        Ok(())
    }

    fn spawn_producers(&mut self) -> Vec<BoxStream<'static, Event>> {
        let mut streams = Vec::with_capacity(self.adapters.len() + 1);

        for adapter in &self.adapters {
            let (tx, rx) = flume::bounded(self.config.channel_capacity);
            let adapter = adapter.clone();
            self.producers.push(tokio::spawn(async move {
                let exchange = adapter.exchange().clone();
                match adapter.tick(tx).await {
                    Ok(()) => info!("{} tick stream closed", exchange),
                    Err(e) => warn!("{} tick stream failed: {}", exchange, e),
                }
            }));
            streams.push(rx.into_stream().boxed());
        }

        if let Some(period) = self.config.heartbeat() {
            let (tx, rx) = flume::bounded(1);
            self.producers.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if tx.send_async(Event::heartbeat()).await.is_err() {
                        break;
                    }
                }
            }));
            streams.push(rx.into_stream().boxed());
        }
        streams
    }

    /// Stop producers, disconnect venues, return to STOPPED
    async fn teardown(&mut self) -> Result<()> {
        if self.state.state() != EngineState::Stopping {
            self.state.transition(EngineState::Stopping)?;
        }
        for handle in self.producers.drain(..) {
            handle.abort();
        }

        let limit = self.config.adapter_timeout();
        for adapter in &self.adapters {
            match timeout(limit, adapter.disconnect()).await {
                Ok(Ok(())) => debug!("Disconnected from {}", adapter.exchange()),
                Ok(Err(e)) => warn!("Disconnect from {} failed: {}", adapter.exchange(), e),
                Err(_) => warn!("Disconnect from {} timed out", adapter.exchange()),
            }
        }
        self.state.transition(EngineState::Stopped)
    }
}

/// Targeted events reach the manager and their own strategy only.
/// Outcomes without a target stay with the manager.
fn addressed(handler: HandlerId, event: &Event) -> bool {
    match (handler, event.target()) {
        (HandlerId::Manager, _) => true,
        (HandlerId::Strategy(id), Some(target)) => id == target,
        (HandlerId::Strategy(_), None) => !event.kind().is_outcome(),
    }
}

fn fatal(handler: HandlerId, callback: Callback, event: &Event, cause: anyhow::Error) -> Error {
    let origin = match event.as_failure() {
        Some(failure) => failure.to_string(),
        None => event.to_string(),
    };
    Error::FatalErrorLoop {
        handler,
        callback,
        origin,
        cause,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::PaperExchange;
    use crate::event::Payload;
    use crate::config::TradingType;
    use crate::types::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<String>>>);

    impl Log {
        fn push(&self, entry: String) {
            self.0.lock().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().clone()
        }

        fn count(&self, entry: &str) -> usize {
            self.0.lock().iter().filter(|e| e.as_str() == entry).count()
        }
    }

    struct Recorder {
        name: String,
        log: Log,
        entry: Option<Order>,
        entry_on_trade: Option<Order>,
        size_on_trade: bool,
        fail_on_trade: bool,
        fail_on_error: bool,
    }

    impl Recorder {
        fn new(name: &str, log: &Log) -> Self {
            Self {
                name: name.to_string(),
                log: log.clone(),
                entry: None,
                entry_on_trade: None,
                size_on_trade: false,
                fail_on_trade: false,
                fail_on_error: false,
            }
        }

        fn entering(mut self, order: Order) -> Self {
            self.entry = Some(order);
            self
        }

        fn record(&self, what: impl std::fmt::Display) {
            self.log.push(format!("{}:{}", self.name, what));
        }
    }

    #[async_trait]
    impl Strategy for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_trade(&mut self, _event: &Event, ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
            if self.size_on_trade {
                let size: Decimal = ctx.positions(None, None).iter().map(|p| p.size).sum();
                self.record(format!("trade:size={size}"));
            } else {
                self.record("trade");
            }
            if self.fail_on_trade {
                anyhow::bail!("trade handler blew up");
            }
            if let Some(order) = self.entry_on_trade.take() {
                ctx.new_order(order).await?;
            }
            Ok(())
        }

        async fn on_start(&mut self, _event: &Event, ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
            self.record("start");
            if let Some(order) = self.entry.take() {
                ctx.new_order(order).await?;
            }
            Ok(())
        }

        async fn on_received(&mut self, event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
            let id = event.as_order().map(|o| o.id.clone()).unwrap_or_default();
            self.record(format!("received:{id}"));
            Ok(())
        }

        async fn on_bought(&mut self, _event: &Event, ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
            let size: Decimal = ctx.positions(None, None).iter().map(|p| p.size).sum();
            self.record(format!("bought:{size}"));
            Ok(())
        }

        async fn on_traded(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
            self.record("traded");
            Ok(())
        }

        async fn on_error(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
            self.record("error");
            if self.fail_on_error {
                anyhow::bail!("error handler blew up");
            }
            Ok(())
        }

        async fn on_exit(&mut self, _event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
            self.record("exit");
            Ok(())
        }
    }

    fn quiet_config() -> EngineConfig {
        EngineConfig {
            trading_type: TradingType::Simulation,
            error_backoff_ms: 0,
            ..Default::default()
        }
    }

    fn buy_one() -> Order {
        Order::limit("BTC-USD".into(), "paper".into(), Side::Buy, Decimal::ONE, Decimal::from(100)).unwrap()
    }

    fn print(taker_id: &str, volume: i64) -> Event {
        let volume = Decimal::from(volume);
        let taker = Order::limit("BTC-USD".into(), "paper".into(), Side::Buy, volume, Decimal::from(100))
            .unwrap()
            .with_id(taker_id)
            .with_filled(volume)
            .unwrap();
        Event::trade(Trade::new(volume, Decimal::from(100), taker, vec![]).unwrap())
    }

    async fn connected_venue() -> Arc<PaperExchange> {
        let venue = Arc::new(PaperExchange::new("paper").with_first_order_id(42));
        venue.connect().await.unwrap();
        venue
    }

    #[tokio::test]
    async fn test_submit_then_fill_scenario() {
        let venue = connected_venue().await;
        let log = Log::default();
        let mut engine = Engine::new(&quiet_config());
        engine.add_exchange(venue.clone()).unwrap();
        engine.add_strategy(Box::new(Recorder::new("a", &log).entering(buy_one())));

        engine.dispatch(&Event::start()).await.unwrap();
        engine.drain().await.unwrap();
        assert!(engine.manager().order_manager().is_pending("42"));
        assert_eq!(log.count("a:received:42"), 1);

        let taker = venue.submitted()[0].clone().with_filled(Decimal::ONE).unwrap();
        let trade = Trade::new(Decimal::ONE, Decimal::from(100), taker, vec![]).unwrap();
        engine.dispatch(&Event::trade(trade)).await.unwrap();
        engine.drain().await.unwrap();

        assert!(!engine.manager().order_manager().is_pending("42"));
        // the strategy already sees its position when told about the fill
        assert_eq!(log.count("a:bought:1"), 1);
        assert_eq!(log.count("a:traded"), 1);

        let positions = engine.manager().portfolio().positions(Some(StrategyId(0)), None, None);
        assert_eq!(positions[0].size, Decimal::ONE);
        assert_eq!(positions[0].price, Decimal::from(100));
        assert_eq!(engine.manager().correlations(), 0);
        assert!(engine.manager().orders(StrategyId(0), Default::default()).is_empty());
    }

    #[tokio::test]
    async fn test_own_fill_is_visible_in_on_trade() {
        let venue = connected_venue().await;
        let log = Log::default();
        let mut engine = Engine::new(&quiet_config());
        engine.add_exchange(venue.clone()).unwrap();
        let mut recorder = Recorder::new("a", &log).entering(buy_one());
        recorder.size_on_trade = true;
        engine.add_strategy(Box::new(recorder));

        engine.dispatch(&Event::start()).await.unwrap();
        engine.drain().await.unwrap();

        let taker = venue.submitted()[0].clone().with_filled(Decimal::ONE).unwrap();
        let trade = Trade::new(Decimal::ONE, Decimal::from(100), taker, vec![]).unwrap();
        engine.dispatch(&Event::trade(trade)).await.unwrap();
        engine.drain().await.unwrap();

        let entries = log.entries();
        let from_trade: Vec<&str> = entries
            .iter()
            .map(String::as_str)
            .skip_while(|e| !e.starts_with("a:trade"))
            .collect();
        assert_eq!(from_trade, vec!["a:trade:size=1", "a:bought:1", "a:traded"]);

        // booked once, not again on BOUGHT
        let positions = engine.manager().portfolio().positions(Some(StrategyId(0)), None, None);
        assert_eq!(positions[0].size, Decimal::ONE);
        assert_eq!(engine.manager().risk().position(&"BTC-USD".into()), Decimal::ONE);
        assert_eq!(engine.manager().trades(StrategyId(0), Default::default()).len(), 1);
    }

    #[tokio::test]
    async fn test_untargeted_outcome_reaches_no_strategy() {
        let log = Log::default();
        let mut engine = Engine::new(&quiet_config());
        engine.add_strategy(Box::new(Recorder::new("a", &log)));

        let trade = print("foreign", 1).as_trade().cloned().unwrap();
        let outcome = Event::outcome(EventKind::Bought, Payload::Trade(trade), None);
        engine.dispatch(&outcome).await.unwrap();
        engine.drain().await.unwrap();

        assert!(log.entries().is_empty());
        // book-keeping still saw it
        let accounts = engine.manager().portfolio().accounts();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].size, Decimal::ONE);
    }

    #[tokio::test]
    async fn test_outcomes_reach_only_their_strategy() {
        let venue = connected_venue().await;
        let log = Log::default();
        let mut engine = Engine::new(&quiet_config());
        engine.add_exchange(venue).unwrap();
        engine.add_strategy(Box::new(Recorder::new("a", &log).entering(buy_one())));
        engine.add_strategy(Box::new(Recorder::new("b", &log)));

        engine.dispatch(&Event::start()).await.unwrap();
        engine.drain().await.unwrap();

        assert_eq!(log.count("a:received:42"), 1);
        assert!(!log.entries().iter().any(|e| e.starts_with("b:received")));
        assert_eq!(log.count("b:start"), 1);
    }

    #[tokio::test]
    async fn test_handler_failure_produces_one_error() {
        let log = Log::default();
        let mut engine = Engine::new(&quiet_config());
        let mut bad = Recorder::new("bad", &log);
        bad.fail_on_trade = true;
        engine.add_strategy(Box::new(bad));
        engine.add_strategy(Box::new(Recorder::new("watch", &log)));

        engine.dispatch(&print("x", 1)).await.unwrap();
        engine.drain().await.unwrap();

        assert_eq!(log.count("watch:error"), 1);
        assert_eq!(log.count("bad:error"), 1);
        // the remaining handlers still saw the trade
        assert_eq!(log.count("watch:trade"), 1);

        let failure = engine.manager().last_error().unwrap();
        assert_eq!(failure.handler, HandlerId::Strategy(StrategyId(0)));
        assert_eq!(failure.callback, Callback::OnTrade);
        assert_eq!(failure.source.kind(), EventKind::Trade);
    }

    #[tokio::test]
    async fn test_failure_while_handling_error_is_fatal() {
        let log = Log::default();
        let mut engine = Engine::new(&quiet_config());
        let mut bad = Recorder::new("bad", &log);
        bad.fail_on_trade = true;
        bad.fail_on_error = true;
        engine.add_strategy(Box::new(bad));

        let result = engine.dispatch(&print("x", 1)).await;
        match result {
            Err(Error::FatalErrorLoop { handler, callback, .. }) => {
                assert_eq!(handler, HandlerId::Strategy(StrategyId(0)));
                assert_eq!(callback, Callback::OnError);
            }
            other => panic!("expected fatal error, got {other:?}"),
        }
        assert_eq!(log.count("bad:error"), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_reaches_nobody() {
        let log = Log::default();
        let mut engine = Engine::new(&quiet_config());
        engine.add_strategy(Box::new(Recorder::new("a", &log)));
        engine.dispatch(&Event::heartbeat()).await.unwrap();
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_run_until_sources_close() {
        let venue = Arc::new(PaperExchange::new("paper"));
        venue.inject(print("x", 1));
        venue.inject(print("y", 2));
        venue.close_feed();

        let log = Log::default();
        let mut engine = Engine::new(&quiet_config());
        engine.add_exchange(venue.clone()).unwrap();
        engine.add_strategy(Box::new(Recorder::new("a", &log)));

        engine.run().await.unwrap();

        assert_eq!(log.entries(), vec!["a:start", "a:trade", "a:trade", "a:exit"]);
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(!venue.is_connected());
        assert_eq!(engine.manager().portfolio().last_price(&"BTC-USD".into()), Some(Decimal::from(100)));
    }

    #[tokio::test]
    async fn test_run_drains_outcomes_before_next_print() {
        let venue = Arc::new(PaperExchange::new("paper"));
        venue.inject(print("x", 1));
        venue.inject(print("y", 1));
        venue.close_feed();

        let log = Log::default();
        let mut engine = Engine::new(&quiet_config());
        engine.add_exchange(venue.clone()).unwrap();
        let mut recorder = Recorder::new("a", &log);
        recorder.entry_on_trade = Some(buy_one());
        engine.add_strategy(Box::new(recorder));

        engine.run().await.unwrap();

        assert_eq!(
            log.entries(),
            vec!["a:start", "a:trade", "a:received:1", "a:trade", "a:exit"]
        );
        assert_eq!(venue.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_fatal_run_skips_exit() {
        let venue = Arc::new(PaperExchange::new("paper"));
        venue.inject(print("x", 1));
        venue.inject(print("y", 1));
        venue.close_feed();

        let log = Log::default();
        let mut engine = Engine::new(&quiet_config());
        engine.add_exchange(venue.clone()).unwrap();
        let mut bad = Recorder::new("bad", &log);
        bad.fail_on_trade = true;
        bad.fail_on_error = true;
        engine.add_strategy(Box::new(bad));

        let result = engine.run().await;
        assert!(matches!(result, Err(Error::FatalErrorLoop { .. })));
        assert_eq!(log.count("bad:trade"), 1);
        assert_eq!(log.count("bad:exit"), 0);
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(!venue.is_connected());
    }

    #[tokio::test]
    async fn test_shutdown_handle_stops_live_loop() {
        let config = EngineConfig {
            trading_type: TradingType::Live,
            heartbeat_secs: 0,
            error_backoff_ms: 0,
            ..Default::default()
        };
        let venue = Arc::new(PaperExchange::new("paper"));
        let log = Log::default();
        let mut engine = Engine::new(&config);
        engine.add_exchange(venue).unwrap();
        engine.add_strategy(Box::new(Recorder::new("a", &log)));

        let handle = engine.shutdown_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.shutdown();
        });

        tokio::time::timeout(Duration::from_secs(5), engine.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.entries(), vec!["a:start", "a:exit"]);
    }

    #[tokio::test]
    async fn test_unreachable_venue_fails_start() {
        let venue = Arc::new(PaperExchange::new("paper"));
        venue.set_unreachable(true);
        let mut engine = Engine::new(&quiet_config());
        engine.add_exchange(venue).unwrap();

        assert!(matches!(engine.run().await, Err(Error::Connect(_))));
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_duplicate_exchange_rejected() {
        let mut engine = Engine::new(&quiet_config());
        engine.add_exchange(Arc::new(PaperExchange::new("paper"))).unwrap();
        let again = engine.add_exchange(Arc::new(PaperExchange::new("PAPER")));
        assert!(matches!(again, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_halt_event_blocks_new_orders() {
        let venue = connected_venue().await;
        let log = Log::default();
        let mut engine = Engine::new(&quiet_config());
        engine.add_exchange(venue.clone()).unwrap();
        engine.add_strategy(Box::new(Recorder::new("a", &log).entering(buy_one())));

        engine.dispatch(&Event::halt()).await.unwrap();
        engine.dispatch(&Event::start()).await.unwrap();
        engine.drain().await.unwrap();
        assert!(venue.submitted().is_empty());
        assert!(engine.manager().risk().is_paused());

        engine.dispatch(&Event::resume()).await.unwrap();
        assert!(!engine.manager().risk().is_paused());
    }
}
