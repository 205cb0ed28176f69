//! # tradeloop: trading strategies in repeated cycles
//!
//! **tradeloop** runs trading strategies against an exchange, one decision
//! cycle at a time. The same strategy code runs live on a real venue or
//! against a deterministic replay of a historical trade tape.
//!
//! ## Core Components
//! | Component   | Description                                                                                     |
//! |-------------|-------------------------------------------------------------------------------------------------|
//! | **`StrategyRunner`** | Drives one strategy live on its own thread, or steps it through a time range.           |
//! | **`Strategy`** | Turns a market `Snapshot` into order intents.                                                 |
//! | **`RangeStrategy`** | Reference strategy trading the oscillations of a price inside a band.                    |
//! | **`ExchangeGateway`** | Venue operations: prices, funds, orders, trades, order book.                            |
//! | **`BacktestEngine`** | Tape replay with escrowed funds, maker/taker fills and fees.                            |
//! | **`SimulatedExchange`** | Thread-safe gateway over a `BacktestEngine`.                                          |
//! | **`OrderBook`** | Depth levels and the price at which a market order would fill.                               |
//! | **`aggregate`** | Fixed-width OHLCV bars from ticks, with gap filling and grouping.                           |
//! | **`Metrics`** | Fill counts, fees, equity and drawdown of an emulated run.                                     |
//! | **`Optimizer`** | Parallel sweep of range strategy parameters.                                                 |
//!
//! ## Features
//! | Feature      | Description                                                        |
//! |--------------|--------------------------------------------------------------------|
//! | `metrics`    | Engine event journal and `Metrics` (default).                      |
//! | `serde`      | Serialize/deserialize the data model, read JSON tapes.             |
//! | `optimizer`  | Parameter sweeps on the `rayon` thread pool.                       |
//! | `cli`        | The `tradeloop` binary.                                            |
//!
//! ## Emulating a strategy
//! ```rust
//! use std::sync::Arc;
//!
//! use tradeloop::prelude::*;
//! use chrono::{DateTime, Duration};
//!
//! let t0 = DateTime::from_timestamp_secs(1515151500).unwrap();
//! let tape = (0..120)
//!     .map(|i| {
//!         let price = 100.0 + 1.5 * (i as f64 / 9.0).sin();
//!         TapeRecord::from((i as u64, price, 1.0, t0 + Duration::minutes(i), OrderSide::Buy))
//!     })
//!     .collect::<Vec<_>>();
//!
//! let config = BacktestConfig::new("BTC", "USD").fees(0.1, 0.2).fund("USD", 1000.0);
//! let gateway = SimulatedExchange::new(BacktestEngine::new(tape, config).unwrap());
//! let strategy = RangeStrategy::new(RangeConfig::default().bands(4.0, 1.5)).unwrap();
//!
//! let runner = StrategyRunner::builder(RunnerConfig::new("range", "BTC", "USD"))
//!     .strategy(strategy)
//!     .gateway(Arc::new(gateway.clone()))
//!     .clock(Arc::new(VirtualClock::new(t0)))
//!     .build()
//!     .unwrap();
//!
//! let stats = runner.emulate(t0, t0 + Duration::minutes(119)).unwrap();
//! assert_eq!(stats.cycles, 120);
//! println!("{:?}", gateway.engine().funds());
//! ```
#![warn(missing_docs)]

/// Time source: wall clock or virtual clock.
pub mod clock;

/// Backtest engine: tape, orders, wallet and matching.
pub mod engine;

/// Error types for the library.
pub mod errors;

/// Exchange abstraction and the simulated exchange.
pub mod gateway;

/// Market data: order books and candle aggregation.
pub mod market;

/// Notification fan-out.
pub mod notify;

/// Name to constructor registry.
pub mod registry;

/// Strategy execution loop.
pub mod runner;

/// Strategy trait, snapshots and the range strategy.
pub mod strategy;

/// Tape loading.
pub mod utils;

/// Emulation metrics: fills, fees, equity, drawdown.
#[cfg(feature = "metrics")]
pub mod metrics;

/// Strategy parameter optimization.
#[cfg(feature = "optimizer")]
pub mod optimizer;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use super::*;
    pub use crate::clock::*;
    pub use crate::engine::*;
    pub use crate::errors::*;
    pub use crate::gateway::*;
    pub use crate::market::*;
    pub use crate::notify::*;
    pub use crate::registry::*;
    pub use crate::runner::*;
    pub use crate::strategy::*;

    #[cfg(feature = "metrics")]
    pub use crate::metrics::*;

    #[cfg(feature = "optimizer")]
    pub use crate::optimizer::*;
}

use std::ops::{Add, Div, Mul, Sub};

/// Trait for performing percentage-based calculations.
///
/// This trait provides methods to add, subtract, and calculate percentages
/// for numeric types, enabling common financial calculations.
pub trait PercentCalculus<Rhs = Self> {
    /// Adds a percentage to the value.
    ///
    /// ### Arguments
    /// * `rhs` - The percentage to add (e.g., 10.0 for 10%).
    ///
    /// ### Returns
    /// The value increased by the given percentage.
    fn addpercent(self, rhs: Rhs) -> Self;

    /// Subtracts a percentage from the value.
    ///
    /// ### Arguments
    /// * `rhs` - The percentage to subtract (e.g., 10.0 for 10%).
    ///
    /// ### Returns
    /// The value decreased by the given percentage.
    fn subpercent(self, rhs: Rhs) -> Self;

    /// Calculates the absolute value of a percentage.
    ///
    /// ### Arguments
    /// * `percent` - The percentage to calculate (e.g., 10.0 for 10%).
    ///
    /// ### Returns
    /// The absolute value of the given percentage.
    fn how_many(self, percent: Self) -> Self;

    /// Calculates the percentage change between two values.
    ///
    /// ### Arguments
    /// * `new` - The new value to compare with.
    ///
    /// ### Returns
    /// The percentage change from the original value to the new value.
    fn change(self, new: Self) -> Self;
}

impl PercentCalculus for f64 {
    fn addpercent(self, percent: Self) -> Self {
        self.add(self.mul(percent.div(100.0)))
    }

    fn subpercent(self, percent: Self) -> Self {
        self.sub(self.mul(percent.div(100.0)))
    }

    fn how_many(self, percent: Self) -> Self {
        percent.mul(self.div(100.0))
    }

    fn change(self, new: Self) -> Self {
        new.sub(self).div(self).mul(100.0)
    }
}

#[cfg(test)]
mod percent {
    use super::*;

    #[test]
    fn add() {
        assert_eq!(110.0, 100.0.addpercent(10.0))
    }

    #[test]
    fn sub() {
        assert_eq!(90.0, 100.0.subpercent(10.0))
    }

    #[test]
    fn how_many() {
        assert_eq!(10.0, 100.0.how_many(10.0))
    }

    #[test]
    fn change() {
        assert_eq!(10.0, 100.0.change(110.0))
    }
}
