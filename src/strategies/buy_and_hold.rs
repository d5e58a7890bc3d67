//! Buy-and-hold: one market buy on the first print, held until exit

use async_trait::async_trait;
use orbit_core::engine::OrderFilter;
use orbit_core::{
    Callback, Decimal, Event, ExchangeId, InstrumentId, Order, Side, Strategy, StrategyContext,
};
use tracing::{info, warn};

const CALLBACKS: [Callback; 5] = [
    Callback::OnTrade,
    Callback::OnBought,
    Callback::OnReceived,
    Callback::OnRejected,
    Callback::OnExit,
];

pub struct BuyAndHold {
    instrument: InstrumentId,
    exchange: ExchangeId,
    volume: Decimal,
    entered: bool,
}

impl BuyAndHold {
    pub fn new(instrument: impl Into<InstrumentId>, exchange: impl Into<ExchangeId>, volume: Decimal) -> Self {
        Self {
            instrument: instrument.into(),
            exchange: exchange.into(),
            volume,
            entered: false,
        }
    }
}

#[async_trait]
impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn callbacks(&self) -> &[Callback] {
        &CALLBACKS
    }

    async fn on_trade(&mut self, event: &Event, ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        let Some(trade) = event.as_trade() else {
            return Ok(());
        };
        if self.entered || trade.instrument() != &self.instrument || trade.exchange() != &self.exchange {
            return Ok(());
        }

        // set before submitting: the outcome is dispatched after this callback
        self.entered = true;
        let order = Order::market(self.instrument.clone(), self.exchange.clone(), Side::Buy, self.volume)?;
        info!("buy_and_hold: entering {} {} near {}", self.volume, self.instrument, trade.price());
        ctx.new_order(order).await?;
        Ok(())
    }

    async fn on_received(&mut self, event: &Event, _ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        if let Some(order) = event.as_order() {
            info!("buy_and_hold: {} accepted as {}", order.client_id, order.id);
        }
        Ok(())
    }

    async fn on_rejected(&mut self, event: &Event, ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        let working = ctx.orders(OrderFilter {
            instrument: Some(&self.instrument),
            side: Some(Side::Buy),
            ..Default::default()
        });
        if working.is_empty() {
            warn!("buy_and_hold: entry rejected ({}), retrying on next print", event);
            self.entered = false;
        }
        Ok(())
    }

    async fn on_bought(&mut self, event: &Event, ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        if let Some(trade) = event.as_trade() {
            info!("buy_and_hold: filled {} @ {}", trade.my_fill(), trade.price());
        }
        for pos in ctx.positions(Some(&self.instrument), Some(&self.exchange)) {
            info!("buy_and_hold: holding {} {} @ {}", pos.size, pos.instrument, pos.price);
        }
        Ok(())
    }

    async fn on_exit(&mut self, _event: &Event, ctx: &mut StrategyContext<'_>) -> anyhow::Result<()> {
        let canceled = ctx.cancel_all(Some(&self.instrument)).await?;
        if !canceled.is_empty() {
            info!("buy_and_hold: canceled {} working orders", canceled.len());
        }
        for pos in ctx.positions(Some(&self.instrument), None) {
            info!(
                "buy_and_hold: final {} {} @ {} (last {}, unrealized {})",
                pos.size, pos.instrument, pos.price, pos.last_price, pos.unrealized_pnl
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use orbit_core::{
        Engine, EngineConfig, EngineState, Instrument, InstrumentType, PaperExchange, StrategyId, Trade,
        TradingType,
    };

    use crate::strategies::PrintStrategy;

    fn config() -> EngineConfig {
        EngineConfig {
            trading_type: TradingType::Backtest,
            error_backoff_ms: 0,
            ..Default::default()
        }
    }

    fn venue() -> Arc<PaperExchange> {
        Arc::new(
            PaperExchange::new("paper")
                .with_instrument(Instrument::new("USD", InstrumentType::Currency))
                .with_instrument(Instrument::new("BTC", InstrumentType::Currency))
                .with_instrument(Instrument::pair("BTC-USD", "BTC".into(), "USD".into()))
                .with_balance("USD", Decimal::from(1000))
                .with_auto_fill(),
        )
    }

    fn print(n: u32, price: i64) -> Event {
        let volume = Decimal::ONE;
        let taker = Order::limit("BTC-USD".into(), "paper".into(), Side::Sell, volume, Decimal::from(price))
            .unwrap()
            .with_id(format!("mkt-{n}"))
            .with_filled(volume)
            .unwrap();
        Event::trade(
            Trade::new(volume, Decimal::from(price), taker, vec![])
                .unwrap()
                .with_id(format!("t-{n}")),
        )
    }

    async fn run(venue: Arc<PaperExchange>, prices: Vec<i64>) -> Engine {
        let mut engine = Engine::new(&config());
        engine.add_exchange(venue.clone()).unwrap();
        engine.add_strategy(Box::new(BuyAndHold::new("BTC-USD", "paper", Decimal::new(1, 1))));
        engine.add_strategy(Box::new(PrintStrategy::new()));

        let feeder = tokio::spawn(async move {
            for (n, price) in prices.into_iter().enumerate() {
                venue.inject(print(n as u32, price));
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            venue.close_feed();
        });

        engine.run().await.unwrap();
        feeder.await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_buys_once_and_holds() {
        let venue = venue();
        let engine = run(venue.clone(), vec![100, 110, 120]).await;

        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(venue.submitted().len(), 1);

        let positions = engine
            .manager()
            .portfolio()
            .positions(Some(StrategyId(0)), Some(&"BTC-USD".into()), None);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].size, Decimal::new(1, 1));
        assert_eq!(positions[0].price, Decimal::from(100));
        assert_eq!(positions[0].unrealized_pnl, Decimal::from(2));

        let cash = engine.manager().portfolio().cash(&"paper".into(), "USD").unwrap();
        assert_eq!(cash.balance, Decimal::from(990));
    }

    #[tokio::test]
    async fn test_rejected_entry_is_retried() {
        let venue = venue();
        venue.set_rejecting(true);
        let engine = run(venue.clone(), vec![100, 101]).await;

        assert!(venue.submitted().is_empty());
        assert!(engine.manager().portfolio().positions(Some(StrategyId(0)), None, None).is_empty());
        // one attempt per print
        assert_eq!(
            engine
                .manager()
                .past_orders(StrategyId(0), OrderFilter::default())
                .len(),
            2
        );
    }
}
