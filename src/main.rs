//! tradeloop CLI: emulate the range strategy over a JSON trade tape.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};
use tradeloop::prelude::*;
use tradeloop::utils::read_tape;

#[derive(Parser)]
#[command(name = "tradeloop", about = "Emulate the range strategy over a recorded trade tape")]
struct Cli {
    /// JSON trade tape: [{"id", "price", "volume", "time" (ms), "side"}, ...].
    #[arg(long)]
    tape: PathBuf,

    /// Base currency code.
    #[arg(long, default_value = "BTC")]
    base: String,

    /// Quote currency code.
    #[arg(long, default_value = "USD")]
    quote: String,

    /// Initial funds, as CURRENCY=AMOUNT. Repeatable.
    #[arg(long = "fund", value_parser = parse_fund, default_value = "USD=1000")]
    funds: Vec<(String, f64)>,

    /// Seconds between two strategy cycles.
    #[arg(long, default_value_t = 60)]
    interval: u64,

    /// Maker fee, in percent.
    #[arg(long, default_value_t = 0.1)]
    maker_fee: f64,

    /// Taker fee, in percent.
    #[arg(long, default_value_t = 0.2)]
    taker_fee: f64,

    /// Band width, in percent of the mean price.
    #[arg(long, default_value_t = 2.0)]
    volatility: f64,

    /// Take-profit band width, in percent of the mean price.
    #[arg(long, default_value_t = 1.0)]
    take_profit: f64,

    /// Minimum fraction of recent trades inside the band.
    #[arg(long, default_value_t = 0.8)]
    threshold: f64,

    /// Recent-trade window, in seconds.
    #[arg(long, default_value_t = 3600)]
    window: u64,

    /// Percent of the quote funds kept aside.
    #[arg(long, default_value_t = 0.0)]
    reserve: f64,

    /// Stop-loss trigger, in percent below the sell price.
    #[arg(long)]
    stop_loss: Option<f64>,

    /// Minimum age of a sell order before the stop-loss applies, in seconds.
    #[arg(long, default_value_t = 3600)]
    stop_loss_delay: u64,

    /// Failed cycles tolerated before the run stops.
    #[arg(long, default_value_t = 3)]
    max_criticals: u32,

    /// Seed of the synthetic order book.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn parse_fund(value: &str) -> std::result::Result<(String, f64), String> {
    let (currency, amount) = value
        .split_once('=')
        .ok_or_else(|| format!("expected CURRENCY=AMOUNT, got {value}"))?;
    let amount = amount.parse::<f64>().map_err(|e| format!("invalid amount {amount}: {e}"))?;
    Ok((currency.to_uppercase(), amount))
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let tape = read_tape(&cli.tape).with_context(|| format!("reading {}", cli.tape.display()))?;
    if tape.is_empty() {
        bail!("{} holds no trade", cli.tape.display());
    }

    let backtest = cli
        .funds
        .iter()
        .fold(BacktestConfig::new(&cli.base, &cli.quote), |config, (currency, amount)| {
            config.fund(currency, *amount)
        })
        .fees(cli.maker_fee, cli.taker_fee)
        .seed(cli.seed);
    let engine = BacktestEngine::new(tape, backtest)?;
    let (start, end) = engine.time_range();
    info!(records = engine.tape().len(), %start, %end, "tape loaded");

    let range = RangeConfig::default()
        .window(Duration::from_secs(cli.window))
        .bands(cli.volatility, cli.take_profit)
        .in_range_threshold(cli.threshold)
        .reserve(cli.reserve);
    let mut runner_config = RunnerConfig::new("range", &cli.base, &cli.quote)
        .interval(Duration::from_secs(cli.interval))
        .max_criticals(cli.max_criticals);
    if let Some(percent) = cli.stop_loss {
        runner_config = runner_config.stop_loss(StopLossConfig::new(Duration::from_secs(cli.stop_loss_delay), percent));
    }

    let gateway = SimulatedExchange::new(engine);
    let runner = StrategyRunner::builder(runner_config)
        .strategy(RangeStrategy::new(range)?)
        .gateway(Arc::new(gateway.clone()))
        .clock(Arc::new(VirtualClock::new(start)))
        .build()?;
    let stats = runner.emulate(start, end)?;

    let engine = gateway.engine();
    println!("cycles: {} (criticals: {}, intents: {})", stats.cycles, stats.criticals, stats.intents);
    println!("trades: {}", engine.trades().len());
    for (currency, amount) in engine.funds() {
        println!("{currency}: {amount:.8}");
    }

    #[cfg(feature = "metrics")]
    println!("\n{}", Metrics::from(&*engine));

    Ok(())
}
