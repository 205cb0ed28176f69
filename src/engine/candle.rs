use chrono::{DateTime, Duration, Utc};

use crate::errors::{Error, Result};

/// Fixed-width OHLCV bar covering `[open_time, close_time)`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    open_time: DateTime<Utc>,
    close_time: DateTime<Utc>,
    completed: bool,
}

impl Candle {
    /// Returns the open price.
    pub fn open(&self) -> f64 {
        self.open
    }

    /// Returns the high price.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Returns the low price.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Returns the close price.
    pub fn close(&self) -> f64 {
        self.close
    }

    /// Returns the traded volume.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Returns the window start (inclusive).
    pub fn open_time(&self) -> DateTime<Utc> {
        self.open_time
    }

    /// Returns the window end (exclusive).
    pub fn close_time(&self) -> DateTime<Utc> {
        self.close_time
    }

    /// Returns the window width.
    pub fn width(&self) -> Duration {
        self.close_time - self.open_time
    }

    /// Returns whether the window was sealed by a later sample.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Opens a flat bar at `price`: no sample fell in its window yet.
    pub(crate) fn flat(price: f64, open_time: DateTime<Utc>, close_time: DateTime<Utc>) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
            open_time,
            close_time,
            completed: false,
        }
    }

    /// Folds a sample into the bar. `first` replaces the inherited flat price.
    pub(crate) fn push(&mut self, price: f64, volume: f64, first: bool) {
        if first {
            self.open = price;
            self.high = price;
            self.low = price;
        } else {
            self.high = self.high.max(price);
            self.low = self.low.min(price);
        }
        self.close = price;
        self.volume += volume;
    }

    pub(crate) fn seal(&mut self) {
        self.completed = true;
    }
}

/// Builder for [`Candle`]; `build` enforces the bar invariants.
#[derive(Debug, Default)]
pub struct CandleBuilder {
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
    open_time: Option<DateTime<Utc>>,
    close_time: Option<DateTime<Utc>>,
    completed: bool,
}

impl CandleBuilder {
    /// Starts a new builder.
    pub fn builder() -> Self {
        Self {
            completed: true,
            ..Default::default()
        }
    }

    /// Sets the open price.
    pub fn open(mut self, open: f64) -> Self {
        self.open = Some(open);
        self
    }

    /// Sets the high price.
    pub fn high(mut self, high: f64) -> Self {
        self.high = Some(high);
        self
    }

    /// Sets the low price.
    pub fn low(mut self, low: f64) -> Self {
        self.low = Some(low);
        self
    }

    /// Sets the close price.
    pub fn close(mut self, close: f64) -> Self {
        self.close = Some(close);
        self
    }

    /// Sets the volume.
    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Sets the window start.
    pub fn open_time(mut self, open_time: DateTime<Utc>) -> Self {
        self.open_time = Some(open_time);
        self
    }

    /// Sets the window end.
    pub fn close_time(mut self, close_time: DateTime<Utc>) -> Self {
        self.close_time = Some(close_time);
        self
    }

    /// Marks the bar as sealed or still accumulating (sealed by default).
    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Validates and builds the candle.
    pub fn build(self) -> Result<Candle> {
        let missing = |field: &str| Error::InvalidCandle(format!("missing {field}"));
        let open = self.open.ok_or_else(|| missing("open"))?;
        let high = self.high.ok_or_else(|| missing("high"))?;
        let low = self.low.ok_or_else(|| missing("low"))?;
        let close = self.close.ok_or_else(|| missing("close"))?;
        let volume = self.volume.unwrap_or(0.0);
        let open_time = self.open_time.ok_or_else(|| missing("open_time"))?;
        let close_time = self.close_time.ok_or_else(|| missing("close_time"))?;

        if high < open.max(close) || low > open.min(close) || low > high {
            return Err(Error::InvalidCandle(format!(
                "high {high} and low {low} must bound open {open} and close {close}"
            )));
        }
        if volume < 0.0 {
            return Err(Error::InvalidCandle(format!("negative volume {volume}")));
        }
        if close_time <= open_time {
            return Err(Error::InvalidCandle(format!("window {open_time} .. {close_time} is empty")));
        }

        Ok(Candle {
            open,
            high,
            low,
            close,
            volume,
            open_time,
            close_time,
            completed: self.completed,
        })
    }
}
