//! Pluggable decision logic.
//!
//! A [`Strategy`] reads a per-cycle [`Snapshot`] and returns
//! [`OrderIntent`]s; the runner executes them and reports each
//! [`IntentOutcome`] back. Strategies never talk to the venue directly, so
//! they can be tested against any [`ExchangeGateway`](crate::gateway::ExchangeGateway).

mod range;
mod snapshot;

use std::collections::BTreeMap;

use chrono::Duration;

pub use range::*;
pub use snapshot::*;

use crate::{
    engine::{Order, OrderSide},
    errors::{Error, Result},
};

/// Optional inputs a strategy relies on, checked against the gateway when
/// the runner is built.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StrategyCapabilities {
    /// Needs the public trade history.
    pub market_analytics: bool,
    /// Needs depth snapshots.
    pub order_book: bool,
}

/// What a strategy wants the runner to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderIntent {
    /// Place a limit order.
    Place {
        /// Buy or sell.
        side: OrderSide,
        /// Base currency amount.
        volume: f64,
        /// Limit price.
        price: f64,
    },
    /// Cancel an open order.
    Cancel(Order),
}

/// Result of an executed intent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntentOutcome {
    /// The order is on the venue (it may already be filled).
    Placed(Order),
    /// The order was cancelled.
    Cancelled(Order),
    /// The venue had not enough funds; nothing changed.
    Skipped(OrderIntent),
}

/// Decision logic driven by a strategy runner.
pub trait Strategy: Send {
    /// Returns the strategy name.
    fn name(&self) -> &str;

    /// Returns what the strategy needs from the gateway.
    fn capabilities(&self) -> StrategyCapabilities {
        StrategyCapabilities::default()
    }

    /// Returns how far back [`Snapshot::recent_trades`] looks.
    fn analytics_window(&self) -> Duration {
        Duration::hours(1)
    }

    /// Decides what to do in this cycle.
    fn decide(&mut self, snapshot: &Snapshot<'_>) -> Result<Vec<OrderIntent>>;

    /// Receives the outcome of each intent returned by the last `decide`.
    fn on_outcome(&mut self, _outcome: &IntentOutcome) {}
}

/// Named numeric parameters used to build strategies from a registry.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyParams(BTreeMap<String, f64>);

impl StrategyParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter.
    pub fn set(mut self, name: impl ToString, value: f64) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    /// Returns a parameter, if set.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Returns a parameter, failing when it is absent.
    pub fn require(&self, name: &str) -> Result<f64> {
        self.get(name).ok_or_else(|| Error::MissingParameter(name.to_string()))
    }
}

impl<S: ToString> FromIterator<(S, f64)> for StrategyParams {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(name, value)| (name.to_string(), value)).collect())
    }
}

#[cfg(test)]
#[test]
fn require_missing_parameter() {
    let params = StrategyParams::from_iter([("volatility", 2.0)]);
    assert_eq!(params.require("volatility").unwrap(), 2.0);
    assert!(matches!(params.require("window"), Err(Error::MissingParameter(name)) if name == "window"));
}
