use std::time::Duration;

use crate::errors::{Error, Result};

/// Stop-loss protection of resting sell orders.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopLossConfig {
    /// Minimum age of a sell order before it can be liquidated.
    pub delay: Duration,
    /// Price drop from the order price, in percent, that triggers liquidation.
    pub percent: f64,
}

impl StopLossConfig {
    /// Stop-loss for sells older than `delay` that lost `percent`.
    pub fn new(delay: Duration, percent: f64) -> Self {
        Self { delay, percent }
    }
}

/// Bounded wait for a market order to fill.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillWaitConfig {
    /// Delay between two polls of the open orders.
    pub poll_interval: Duration,
    /// Time after which the order is cancelled.
    pub timeout: Duration,
}

impl Default for FillWaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

impl FillWaitConfig {
    /// Returns the maximum number of polls: `ceil(timeout / poll_interval)`.
    pub fn max_polls(&self) -> u64 {
        let polls = self.timeout.as_millis().div_ceil(self.poll_interval.as_millis().max(1));
        u64::try_from(polls).unwrap_or(u64::MAX).max(1)
    }
}

/// Settings of a [`StrategyRunner`](super::StrategyRunner).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Runner name, used in logs and notifications.
    pub name: String,
    /// Base currency code.
    pub base: String,
    /// Quote currency code.
    pub quote: String,
    /// Delay between two cycles (virtual step in emulation).
    pub interval: Duration,
    /// Failed cycles tolerated before the runner stops itself.
    pub max_criticals: u32,
    /// Stop-loss protection, disabled when `None`.
    pub stop_loss: Option<StopLossConfig>,
    /// Wait applied to stop-loss liquidations.
    pub fill_wait: FillWaitConfig,
}

impl RunnerConfig {
    /// Creates a configuration trading `base`/`quote` every minute.
    pub fn new(name: impl ToString, base: impl ToString, quote: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            base: base.to_string(),
            quote: quote.to_string(),
            interval: Duration::from_secs(60),
            max_criticals: 3,
            stop_loss: None,
            fill_wait: FillWaitConfig::default(),
        }
    }

    /// Sets the time between two cycles.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets how many consecutive critical errors stop the runner.
    pub fn max_criticals(mut self, max_criticals: u32) -> Self {
        self.max_criticals = max_criticals;
        self
    }

    /// Enables the stop-loss.
    pub fn stop_loss(mut self, stop_loss: StopLossConfig) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    /// Sets how long a market order is polled for its fill.
    pub fn fill_wait(mut self, fill_wait: FillWaitConfig) -> Self {
        self.fill_wait = fill_wait;
        self
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::MissingParameter("name".to_string()));
        }
        if self.base.is_empty() || self.quote.is_empty() || self.base == self.quote {
            return Err(Error::invalid("pair", format!("{}/{} is not a pair", self.base, self.quote)));
        }
        if self.interval.is_zero() {
            return Err(Error::invalid("interval", "must be positive"));
        }
        if self.max_criticals == 0 {
            return Err(Error::invalid("max_criticals", "must be at least 1"));
        }
        if let Some(stop_loss) = &self.stop_loss
            && !(stop_loss.percent > 0.0 && stop_loss.percent < 100.0)
        {
            return Err(Error::invalid(
                "stop_loss.percent",
                format!("must be in (0, 100) (got: {})", stop_loss.percent),
            ));
        }
        if self.fill_wait.poll_interval.is_zero() || self.fill_wait.timeout.is_zero() {
            return Err(Error::invalid("fill_wait", "poll interval and timeout must be positive"));
        }
        Ok(())
    }
}
