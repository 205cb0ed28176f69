//! Strategy execution loop.
//!
//! A [`StrategyRunner`] drives one [`Strategy`] through repeated cycles,
//! either live on its own thread ([`StrategyRunner::start`]) or stepped
//! through a simulated time range ([`StrategyRunner::emulate`]). Both modes
//! share the same cycle:
//!
//! 1. take a fresh [`Snapshot`] (with the fills pushed since the last cycle),
//! 2. enforce the stop-loss,
//! 3. ask the strategy for intents and execute them,
//! 4. report every outcome back to the strategy.
//!
//! A failing cycle is logged and counted as a critical; the runner stops
//! itself once `max_criticals` is reached.

mod config;
mod fill;
mod protection;

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
        mpsc,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

pub use config::*;
pub use fill::*;

use crate::{
    clock::{Clock, SystemClock},
    engine::Fill,
    errors::{Error, Result},
    gateway::{ExchangeGateway, TimeControl},
    notify::{LogNotifier, Notifier},
    strategy::{IntentOutcome, OrderIntent, Snapshot, Strategy},
};

/// Lifecycle of a runner: `Stopped -> Running -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Idle, may be started.
    Stopped,
    /// Cycling.
    Running,
    /// Finishing the current cycle.
    Stopping,
}

/// Counters of the last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunnerStats {
    /// Cycles executed.
    pub cycles: u64,
    /// Cycles that failed.
    pub criticals: u32,
    /// Intents executed on the gateway.
    pub intents: u64,
}

/// Builder for [`StrategyRunner`].
pub struct StrategyRunnerBuilder {
    config: RunnerConfig,
    strategy: Option<Box<dyn Strategy>>,
    gateway: Option<Arc<dyn ExchangeGateway>>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl StrategyRunnerBuilder {
    /// Sets the strategy (required).
    pub fn strategy(mut self, strategy: impl Strategy + 'static) -> Self {
        self.strategy = Some(Box::new(strategy));
        self
    }

    /// Sets an already boxed strategy, as returned by a registry.
    pub fn boxed_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Sets the gateway (required).
    pub fn gateway(mut self, gateway: Arc<dyn ExchangeGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Sets the clock, [`SystemClock`] by default.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the notifier, [`LogNotifier`] by default.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Validates the configuration and the strategy/gateway capabilities.
    pub fn build(self) -> Result<StrategyRunner> {
        self.config.validate()?;
        let strategy = self.strategy.ok_or_else(|| Error::MissingParameter("strategy".to_string()))?;
        let gateway = self.gateway.ok_or_else(|| Error::MissingParameter("gateway".to_string()))?;

        let needs = strategy.capabilities();
        let offers = gateway.capabilities();
        let missing = if needs.market_analytics && !offers.recent_trades {
            Some("market analytics")
        } else if needs.order_book && !offers.order_book {
            Some("order book")
        } else {
            None
        };
        if let Some(capability) = missing {
            return Err(Error::MissingCapability {
                strategy: strategy.name().to_string(),
                gateway: gateway.name().to_string(),
                capability,
            });
        }

        let fills = if offers.fill_events { gateway.fill_events() } else { None };
        info!(
            runner = %self.config.name,
            strategy = strategy.name(),
            gateway = gateway.name(),
            pushed_fills = fills.is_some(),
            "strategy runner created"
        );

        Ok(StrategyRunner {
            inner: Arc::new(Inner {
                strategy_name: strategy.name().to_string(),
                config: self.config,
                gateway,
                clock: self.clock,
                notifier: self.notifier,
                strategy: Mutex::new(strategy),
                fills: Mutex::new(fills),
                state: Mutex::new(RunnerState::Stopped),
                wake: Condvar::new(),
                cycles: AtomicU64::new(0),
                criticals: AtomicU32::new(0),
                intents: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        })
    }
}

/// Runs a strategy in repeated cycles against a gateway.
pub struct StrategyRunner {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    config: RunnerConfig,
    strategy_name: String,
    gateway: Arc<dyn ExchangeGateway>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    strategy: Mutex<Box<dyn Strategy>>,
    fills: Mutex<Option<mpsc::Receiver<Fill>>>,
    state: Mutex<RunnerState>,
    // Signalled on every state change
    wake: Condvar,
    cycles: AtomicU64,
    criticals: AtomicU32,
    intents: AtomicU64,
}

impl StrategyRunner {
    /// Starts building a runner.
    pub fn builder(config: RunnerConfig) -> StrategyRunnerBuilder {
        StrategyRunnerBuilder {
            config,
            strategy: None,
            gateway: None,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Returns the runner configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.inner.config
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> RunnerState {
        *self.inner.state.lock()
    }

    /// Returns `true` while the loop thread is alive and not asked to stop.
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Returns the counters of the current or last run.
    pub fn stats(&self) -> RunnerStats {
        self.inner.stats()
    }

    /// Starts the live loop on a dedicated thread.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        self.inner.enter_running()?;
        if let Some(previous) = worker.take()
            && previous.join().is_err()
        {
            error!(runner = %self.inner.config.name, "previous worker panicked");
        }

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(format!("runner-{}", self.inner.config.name))
            .spawn(move || inner.run_live());
        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.inner.leave_running();
                Err(e.into())
            }
        }
    }

    /// Requests a stop and blocks until the in-flight cycle, if any, is done.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == RunnerState::Running {
                *state = RunnerState::Stopping;
            }
        }
        self.inner.wake.notify_all();

        let worker = self.worker.lock().take();
        if let Some(handle) = worker
            && handle.join().is_err()
        {
            error!(runner = %self.inner.config.name, "worker panicked");
            self.inner.leave_running();
        }

        let mut state = self.inner.state.lock();
        while *state == RunnerState::Stopping {
            self.inner.wake.wait(&mut state);
        }
    }

    /// Steps the strategy through `[start, end]` on the calling thread.
    ///
    /// Before each cycle the clock and the simulated market are advanced by
    /// the configured interval. Requires a gateway with time control and a
    /// virtual clock; the range must lie within the simulated data.
    pub fn emulate(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<RunnerStats> {
        let inner = &self.inner;
        let control = inner
            .gateway
            .time_control()
            .ok_or_else(|| Error::Emulation(format!("gateway {} has no time control", inner.gateway.name())))?;
        if !inner.clock.is_virtual() {
            return Err(Error::Emulation("a virtual clock is required".to_string()));
        }
        if end < start {
            return Err(Error::invalid("end", format!("{end} is before {start}")));
        }
        let (first, last) = control.time_range();
        if let Some(time) = [start, end].into_iter().find(|t| *t < first || *t > last) {
            return Err(Error::OutOfRange {
                time,
                start: first,
                end: last,
            });
        }
        let step = chrono::Duration::from_std(inner.config.interval).map_err(|e| Error::invalid("interval", e))?;

        inner.enter_running()?;
        info!(runner = %inner.config.name, %start, %end, "emulation started");
        let result = inner.emulate_steps(control, start, end, step);
        inner.leave_running();

        let stats = inner.stats();
        info!(runner = %inner.config.name, cycles = stats.cycles, criticals = stats.criticals, "emulation finished");
        result.map(|()| stats)
    }
}

impl Drop for StrategyRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn is_running(&self) -> bool {
        *self.state.lock() == RunnerState::Running
    }

    fn stats(&self) -> RunnerStats {
        RunnerStats {
            cycles: self.cycles.load(Ordering::SeqCst),
            criticals: self.criticals.load(Ordering::SeqCst),
            intents: self.intents.load(Ordering::SeqCst),
        }
    }

    /// `Stopped -> Running`, resetting the counters.
    fn enter_running(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != RunnerState::Stopped {
            return Err(Error::AlreadyRunning(self.config.name.clone()));
        }
        *state = RunnerState::Running;
        self.cycles.store(0, Ordering::SeqCst);
        self.criticals.store(0, Ordering::SeqCst);
        self.intents.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn leave_running(&self) {
        *self.state.lock() = RunnerState::Stopped;
        self.wake.notify_all();
    }

    fn run_live(&self) {
        info!(runner = %self.config.name, interval = ?self.config.interval, "strategy runner started");
        self.notifier.send_info(&self.config.name, "started");

        while self.is_running() {
            self.cycle();

            let deadline = Instant::now() + self.config.interval;
            let mut state = self.state.lock();
            while *state == RunnerState::Running {
                if self.wake.wait_until(&mut state, deadline).timed_out() {
                    break;
                }
            }
        }

        self.leave_running();
        info!(runner = %self.config.name, "strategy runner stopped");
    }

    fn emulate_steps(
        &self,
        control: &dyn TimeControl,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: chrono::Duration,
    ) -> Result<()> {
        let mut time = start;
        while time <= end && self.is_running() {
            self.clock.advance_to(time)?;
            control.set_iteration_time(time)?;
            self.cycle();
            time += step;
        }
        Ok(())
    }

    /// Runs one cycle, turning any error or panic into a critical.
    fn cycle(&self) {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_cycle())).unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panicked".to_string());
            Err(Error::Strategy {
                strategy: self.strategy_name.clone(),
                message,
            })
        });

        match result {
            Ok(intents) => debug!(runner = %self.config.name, cycle, intents, "cycle done"),
            Err(e) => self.record_critical(cycle, &e),
        }
    }

    fn run_cycle(&self) -> Result<usize> {
        let fills = self
            .fills
            .lock()
            .as_ref()
            .map(|receiver| receiver.try_iter().collect())
            .unwrap_or_default();

        let mut strategy = self.strategy.lock();
        let snapshot = Snapshot::new(
            self.gateway.as_ref(),
            &self.config.base,
            &self.config.quote,
            self.clock.now(),
            strategy.analytics_window(),
            fills,
        );

        protection::enforce_stop_loss(
            &self.config,
            self.gateway.as_ref(),
            self.clock.as_ref(),
            self.notifier.as_ref(),
            &snapshot,
        )?;

        let intents = strategy.decide(&snapshot)?;
        let count = intents.len();
        for intent in intents {
            let outcome = self.execute(intent)?;
            strategy.on_outcome(&outcome);
        }
        Ok(count)
    }

    fn execute(&self, intent: OrderIntent) -> Result<IntentOutcome> {
        let (base, quote) = (&self.config.base, &self.config.quote);
        let outcome = match intent {
            OrderIntent::Place { side, volume, price } => match self.gateway.place_order(base, quote, side, volume, price) {
                Ok(order) => IntentOutcome::Placed(order),
                Err(e @ Error::InsufficientFunds { .. }) => {
                    info!(runner = %self.config.name, %side, volume, price, reason = %e, "order skipped");
                    return Ok(IntentOutcome::Skipped(intent));
                }
                Err(e) => return Err(e),
            },
            OrderIntent::Cancel(order) => {
                self.gateway.cancel_order(base, quote, &order)?;
                IntentOutcome::Cancelled(order)
            }
        };
        self.intents.fetch_add(1, Ordering::SeqCst);
        debug!(runner = %self.config.name, ?outcome, "intent executed");
        Ok(outcome)
    }

    fn record_critical(&self, cycle: u64, err: &Error) {
        let criticals = self.criticals.fetch_add(1, Ordering::SeqCst) + 1;
        error!(
            runner = %self.config.name,
            cycle,
            criticals,
            max = self.config.max_criticals,
            error = %err,
            "cycle failed"
        );
        if criticals < self.config.max_criticals {
            return;
        }

        {
            let mut state = self.state.lock();
            if *state == RunnerState::Running {
                *state = RunnerState::Stopping;
            }
        }
        self.wake.notify_all();
        self.notifier.send_error(
            &self.config.name,
            &format!("stopped after {criticals} failed cycles, last error: {err}"),
        );
    }
}
