//! Performance metrics for emulated runs.
//!
//! The engine journals an [`Event`] for every placed, cancelled and filled
//! order, followed by a funds snapshot after each fill or cancellation.
//! [`Metrics`] summarizes that journal: fill counts by liquidity, fees,
//! equity at both ends of the run and the max drawdown of the equity curve.
//!
//! It needs the `metrics` feature, enabled by default.

use std::fmt;

use crate::engine::*;

use chrono::{DateTime, Utc};

/// Events generated while replaying a tape.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An order was accepted and its funds escrowed.
    Placed(DateTime<Utc>, Order),

    /// A resting order was cancelled and its escrow refunded.
    Cancelled(DateTime<Utc>, Order),

    /// An order was filled, as a maker or as a taker.
    Filled(DateTime<Utc>, Trade),

    /// The funds after a fill or a cancellation.
    FundsUpdate {
        /// Moment
        datetime: DateTime<Utc>,
        /// Available quote currency.
        quote_available: f64,
        /// Available base currency.
        base_available: f64,
        /// Quote currency escrowed by open orders.
        quote_locked: f64,
        /// Base currency escrowed by open orders.
        base_locked: f64,
        /// Holdings valued in quote currency at the current tape price.
        equity: f64,
    },
}

impl From<(DateTime<Utc>, &BacktestEngine)> for Event {
    fn from((datetime, engine): (DateTime<Utc>, &BacktestEngine)) -> Self {
        let (base, quote) = (&engine.config().base, &engine.config().quote);
        let wallet = engine.wallet();
        Self::FundsUpdate {
            datetime,
            quote_available: wallet.available(quote),
            base_available: wallet.available(base),
            quote_locked: wallet.locked(quote),
            base_locked: wallet.locked(base),
            equity: engine.equity(),
        }
    }
}

/// Summary of an emulated run, built from the engine journal.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    quote: String,
    fees: Funds,
    events: Vec<Event>,
    initial_equity: f64,
    final_equity: f64,
}

impl From<&BacktestEngine> for Metrics {
    fn from(value: &BacktestEngine) -> Self {
        let config = value.config();
        let wallet = value.wallet();
        let first_price = value.tape()[0].price();
        let initial = wallet.initial_funds();
        let initial_of = |currency: &str| initial.get(currency).copied().unwrap_or_default();

        let fees = [&config.base, &config.quote]
            .into_iter()
            .map(|currency| (currency.clone(), wallet.fees_paid(currency)))
            .collect();

        Self {
            quote: config.quote.clone(),
            fees,
            events: value.events().cloned().collect(),
            initial_equity: initial_of(&config.quote) + initial_of(&config.base) * first_price,
            final_equity: value.equity(),
        }
    }
}

impl Metrics {
    /// Creates a new `Metrics` from a journal and the equity at both ends of the run.
    pub fn new(quote: impl ToString, events: Vec<Event>, initial_equity: f64, final_equity: f64, fees: Funds) -> Self {
        Self {
            quote: quote.to_string(),
            fees,
            events,
            initial_equity,
            final_equity,
        }
    }

    /// Returns the events.
    pub fn events(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// Returns the equity in quote currency at the first tape price.
    pub fn initial_equity(&self) -> f64 {
        self.initial_equity
    }

    /// Returns the equity in quote currency at the end of the run.
    pub fn final_equity(&self) -> f64 {
        self.final_equity
    }

    /// Returns the equity change in percent.
    pub fn return_percent(&self) -> f64 {
        if self.initial_equity == 0.0 {
            return 0.0;
        }
        crate::PercentCalculus::change(self.initial_equity, self.final_equity)
    }

    /// Returns the cumulative fees per currency.
    pub fn fees(&self) -> &Funds {
        &self.fees
    }

    /// Returns the number of fills with the given liquidity.
    pub fn fills(&self, liquidity: Liquidity) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::Filled(_, trade) if trade.liquidity() == Some(liquidity)))
            .count()
    }

    /// Returns the number of cancelled orders.
    pub fn cancellations(&self) -> usize {
        self.events.iter().filter(|event| matches!(event, Event::Cancelled(..))).count()
    }

    /// Computes the maximum drawdown of the equity samples, as a percentage.
    pub fn max_drawdown(&self) -> f64 {
        let mut max_peak = self.initial_equity;
        let mut max_drawdown = 0.0;

        for event in &self.events {
            let Event::FundsUpdate { equity, .. } = event else {
                continue;
            };
            if *equity > max_peak {
                max_peak = *equity;
            }
            if max_peak > 0.0 {
                let drawdown = (max_peak - equity) / max_peak;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }

        max_drawdown * 100.0
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Emulation Metrics ===")?;
        writeln!(f, "Initial Equity: {:.2} {}", self.initial_equity, self.quote)?;
        writeln!(f, "Final Equity: {:.2} {}", self.final_equity, self.quote)?;
        writeln!(f, "Return: {:.2}%", self.return_percent())?;
        for (currency, fee) in &self.fees {
            writeln!(f, "Fees paid ({currency}): {fee:.8}")?;
        }
        writeln!(f)?;
        writeln!(f, "Maker Fills: {}", self.fills(Liquidity::Maker))?;
        writeln!(f, "Taker Fills: {}", self.fills(Liquidity::Taker))?;
        writeln!(f, "Cancelled Orders: {}", self.cancellations())?;
        write!(f, "Max Drawdown: {:.2}%", self.max_drawdown())
    }
}
