//! # Range strategy over a synthetic tape
//!
//! Builds an oscillating trade tape with a slow drift, emulates the range
//! strategy over it with a stop-loss, then compares the result with buy and hold.

use std::{error::Error, sync::Arc, time::Duration};

use chrono::{DateTime, Duration as Span};
use tradeloop::prelude::*;

/// Prints important notifications and above.
struct Stdout;

impl NotificationSink for Stdout {
    fn name(&self) -> &str {
        "stdout"
    }

    fn send(&mut self, severity: Severity, who: &str, message: &str) -> Result<()> {
        println!("[{severity}] {who}: {message}");
        Ok(())
    }
}

fn synthetic_tape() -> Vec<TapeRecord> {
    let t0 = DateTime::from_timestamp_secs(1759813200).unwrap_or_default();
    (0..2_000)
        .map(|i| {
            let minutes = i as f64;
            let price = 60_000.0 + 900.0 * (minutes / 45.0).sin() + 400.0 * (minutes / 7.0).cos() - 0.5 * minutes;
            let side = if i % 3 == 0 { OrderSide::Sell } else { OrderSide::Buy };
            TapeRecord::from((i as u64, price, 0.01 + (i % 5) as f64 * 0.02, t0 + Span::minutes(i), side))
        })
        .collect()
}

fn main() -> std::result::Result<(), Box<dyn Error>> {
    let tape = synthetic_tape();
    let first_price = tape[0].price();
    let last_price = tape[tape.len() - 1].price();
    let initial_funds: f64 = 10_000.0;

    let config = BacktestConfig::new("BTC", "USD")
        .fees(0.1, 0.2)
        .fund("USD", initial_funds)
        .book(20, 0.05);
    let engine = BacktestEngine::new(tape, config)?;
    let (start, end) = engine.time_range();
    let gateway = SimulatedExchange::new(engine).with_name("replay");

    let registry = Registry::with_builtins();
    let params = StrategyParams::new()
        .set("volatility", 3.0)
        .set("take_profit", 1.2)
        .set("window_secs", 7200.0);
    let strategy = registry.create_strategy("range", &params)?;

    let notifier = NotifierHub::with_min_severity(Severity::Important);
    notifier.add_sink(Stdout);

    let runner_config = RunnerConfig::new("range-demo", "BTC", "USD")
        .interval(Duration::from_secs(300))
        .stop_loss(StopLossConfig::new(Duration::from_secs(6 * 3600), 4.0));
    let runner = StrategyRunner::builder(runner_config)
        .boxed_strategy(strategy)
        .gateway(Arc::new(gateway.clone()))
        .clock(Arc::new(VirtualClock::new(start)))
        .notifier(Arc::new(notifier))
        .build()?;

    let stats = runner.emulate(start, end)?;
    println!("cycles {} criticals {} intents {}", stats.cycles, stats.criticals, stats.intents);

    let engine = gateway.engine();
    println!("trades {}", engine.trades().len());
    for (currency, amount) in engine.funds() {
        println!("{currency} {amount:.8}");
    }

    let equity = engine.equity();
    println!("equity {equity:.2} ({:.2}%)", initial_funds.change(equity));
    let buy_and_hold = (initial_funds / first_price) * last_price;
    println!("buy and hold {buy_and_hold:.2} ({:.2}%)", first_price.change(last_price));

    #[cfg(feature = "metrics")]
    println!("\n{}", Metrics::from(&*engine));

    Ok(())
}
