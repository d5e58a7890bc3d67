use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing_subscriber::{fmt, EnvFilter};

use orbit_core::snapshot::PortfolioSnapshot;
use orbit_core::{Engine, Event, Instrument, InstrumentType, Order, PaperExchange, Side, Trade};
use orbit_tx::config::PaperConfig;
use orbit_tx::strategies::{BuyAndHold, PrintStrategy};
use orbit_tx::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::load_default();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    tracing::info!("🦀 Orbit TX starting ({:?})...", config.engine.trading_type);

    let paper = &config.paper;
    let venue = Arc::new(
        PaperExchange::new(paper.exchange.as_str())
            .with_instrument(Instrument::new(paper.base.as_str(), InstrumentType::Currency))
            .with_instrument(Instrument::new(paper.quote.as_str(), InstrumentType::Currency))
            .with_instrument(Instrument::pair(
                paper.instrument.as_str(),
                paper.base.as_str().into(),
                paper.quote.as_str().into(),
            ))
            .with_balance(&paper.quote, paper.cash)
            .with_auto_fill(),
    );

    let mut engine = Engine::new(&config.engine);
    engine.add_exchange(venue.clone())?;

    if let Some(path) = config.snapshot.as_deref().filter(|p| p.exists()) {
        let snapshot = PortfolioSnapshot::load(path)?;
        engine.manager_mut().portfolio_mut().restore(&snapshot);
    }

    let strategies = &config.strategies;
    if strategies.buy_and_hold.enabled {
        engine.add_strategy(Box::new(BuyAndHold::new(
            paper.instrument.as_str(),
            paper.exchange.as_str(),
            strategies.buy_and_hold.volume,
        )));
    }
    if strategies.print.enabled {
        engine.add_strategy(Box::new(PrintStrategy::new()));
    }

    let feeder = tokio::spawn(feed(venue, paper.clone()));

    let shutdown = engine.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("🛑 Ctrl-C received, stopping...");
            shutdown.shutdown();
        }
    });

    let result = engine.run().await;
    feeder.abort();

    if let Some(path) = &config.snapshot {
        engine.manager().portfolio().snapshot().store(path)?;
    }

    result?;
    tracing::info!("✅ Orbit TX stopped");
    Ok(())
}

/// Synthetic sawtooth prints on the paper venue, then close its feed
async fn feed(venue: Arc<PaperExchange>, paper: PaperConfig) {
    let instrument = paper.instrument.as_str();
    let exchange = paper.exchange.as_str();

    for n in 0..paper.ticks {
        let offset = (n % 20) as i64 - 10;
        let price = paper.start_price + paper.step * Decimal::from(offset.abs());
        let side = if offset < 0 { Side::Sell } else { Side::Buy };

        let print = Order::limit(instrument.into(), exchange.into(), side, Decimal::ONE, price)
            .and_then(|o| o.with_id(format!("mkt-{n}")).with_filled(Decimal::ONE))
            .and_then(|taker| Trade::new(Decimal::ONE, price, taker, Vec::new()));
        match print {
            Ok(trade) => {
                if !venue.inject(Event::trade(trade.with_id(format!("print-{n}")))) {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Synthetic print {} skipped: {}", n, e);
                continue;
            }
        }
        tokio::time::sleep(Duration::from_millis(paper.interval_ms)).await;
    }

    tracing::info!("📡 Synthetic feed finished after {} prints", paper.ticks);
    venue.close_feed();
}
