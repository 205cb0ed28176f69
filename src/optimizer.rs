//! Range strategy parameter sweeps.
//!
//! The [`Optimizer`] replays the same tape once per [`RangeConfig`], each run
//! on its own engine, and reports the final equity of every run. Runs are
//! spread over the rayon thread pool.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    clock::VirtualClock,
    engine::{BacktestConfig, BacktestEngine, TapeRecord},
    errors::Result,
    gateway::SimulatedExchange,
    runner::{RunnerConfig, StrategyRunner},
    strategy::{RangeConfig, RangeStrategy},
};

use rayon::prelude::*;

/// Generates every valid combination of band widths on top of `base`.
///
/// Combinations whose take-profit band is not narrower than the volatility
/// band are skipped.
///
/// ### Arguments
/// * `base` - Configuration providing every other setting.
/// * `volatilities` - Band widths to try, in percent.
/// * `take_profits` - Take-profit widths to try, in percent.
pub fn band_grid(base: &RangeConfig, volatilities: &[f64], take_profits: &[f64]) -> Vec<RangeConfig> {
    volatilities
        .iter()
        .flat_map(|&volatility| take_profits.iter().map(move |&take_profit| (volatility, take_profit)))
        .map(|(volatility, take_profit)| base.bands(volatility, take_profit))
        .filter(|config| config.validate().is_ok())
        .collect()
}

/// Runs one emulation per range configuration over the whole tape.
#[derive(Debug, Clone)]
pub struct Optimizer {
    tape: Vec<TapeRecord>,
    backtest: BacktestConfig,
    runner: RunnerConfig,
}

impl From<(&BacktestEngine, RunnerConfig)> for Optimizer {
    fn from((engine, runner): (&BacktestEngine, RunnerConfig)) -> Self {
        Self {
            tape: engine.tape().to_vec(),
            backtest: engine.config().clone(),
            runner,
        }
    }
}

impl Optimizer {
    /// Creates a new `Optimizer`.
    ///
    /// ### Arguments
    /// * `tape` - Trade tape replayed by every run.
    /// * `backtest` - Engine settings: pair, fees, initial funds.
    /// * `runner` - Runner settings: cycle interval, criticals, stop-loss.
    pub fn new(tape: Vec<TapeRecord>, backtest: BacktestConfig, runner: RunnerConfig) -> Self {
        Self { tape, backtest, runner }
    }

    /// Emulates the range strategy with each configuration, from the first to
    /// the last tape record.
    ///
    /// ### Returns
    /// Each configuration with the final equity in quote currency, in the
    /// order of `combinations`.
    ///
    /// ### Errors
    /// The first error met by any run.
    pub fn sweep(&self, combinations: &[RangeConfig]) -> Result<Vec<(RangeConfig, f64)>> {
        info!(runs = combinations.len(), records = self.tape.len(), "parameter sweep started");
        let results = combinations
            .par_iter()
            .map(|config| Ok((*config, self.run(config)?)))
            .collect::<Result<Vec<_>>>()?;
        info!(runs = results.len(), "parameter sweep done");
        Ok(results)
    }

    /// Returns the configuration with the highest final equity.
    pub fn best(&self, combinations: &[RangeConfig]) -> Result<Option<(RangeConfig, f64)>> {
        let results = self.sweep(combinations)?;
        Ok(results.into_iter().max_by(|a, b| a.1.total_cmp(&b.1)))
    }

    fn run(&self, config: &RangeConfig) -> Result<f64> {
        let engine = BacktestEngine::new(self.tape.clone(), self.backtest.clone())?;
        let (start, end) = engine.time_range();
        let gateway = SimulatedExchange::new(engine);
        let strategy = RangeStrategy::new(*config)?;

        let runner = StrategyRunner::builder(self.runner.clone())
            .strategy(strategy)
            .gateway(Arc::new(gateway.clone()))
            .clock(Arc::new(VirtualClock::new(start)))
            .build()?;
        let stats = runner.emulate(start, end)?;

        let equity = gateway.engine().equity();
        debug!(
            volatility = config.volatility,
            take_profit = config.take_profit,
            cycles = stats.cycles,
            equity,
            "sweep run done"
        );
        Ok(equity)
    }
}
