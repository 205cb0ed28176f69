//! Time source of the strategy runner.
//!
//! Live runs read the wall clock; emulations drive a [`VirtualClock`] forward
//! in lockstep with the tape, so one cycle implementation serves both.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::errors::{Error, Result};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Blocks for `duration` (virtual clocks return immediately).
    fn sleep(&self, duration: Duration);

    /// Moves the clock to `time`. Only virtual clocks can be advanced.
    fn advance_to(&self, time: DateTime<Utc>) -> Result<()>;

    /// Returns whether the clock is advanced externally.
    fn is_virtual(&self) -> bool;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn advance_to(&self, _time: DateTime<Utc>) -> Result<()> {
        Err(Error::Emulation("the system clock cannot be advanced".to_string()))
    }

    fn is_virtual(&self) -> bool {
        false
    }
}

/// Manually advanced clock used by emulations.
#[derive(Debug)]
pub struct VirtualClock {
    now: Mutex<DateTime<Utc>>,
}

impl VirtualClock {
    /// Creates a clock standing at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn sleep(&self, _duration: Duration) {}

    fn advance_to(&self, time: DateTime<Utc>) -> Result<()> {
        let mut now = self.now.lock();
        if time < *now {
            return Err(Error::TimeWentBackwards {
                current: *now,
                requested: time,
            });
        }
        *now = time;
        Ok(())
    }

    fn is_virtual(&self) -> bool {
        true
    }
}
