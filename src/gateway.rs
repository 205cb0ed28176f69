//! Venue abstraction.
//!
//! [`ExchangeGateway`] is what a runner trades against: a live venue client
//! or the [`SimulatedExchange`] wrapping a [`BacktestEngine`].

use std::sync::{Arc, mpsc};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};

use crate::{
    engine::{BacktestEngine, Fill, Funds, Order, OrderSide, Trade},
    errors::{Error, Result},
    market::OrderBook,
};

/// Optional features of a gateway.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatewayCapabilities {
    /// Public trade history ([`ExchangeGateway::recent_trades`]).
    pub recent_trades: bool,
    /// Depth snapshots ([`ExchangeGateway::order_book`]).
    pub order_book: bool,
    /// Pushed fills ([`ExchangeGateway::fill_events`]).
    pub fill_events: bool,
}

/// A live or simulated venue for one or more currency pairs.
pub trait ExchangeGateway: Send + Sync {
    /// Returns the gateway name.
    fn name(&self) -> &str;

    /// Returns what the venue supports.
    fn capabilities(&self) -> GatewayCapabilities;

    /// Returns the last traded price.
    fn last_price(&self, base: &str, quote: &str) -> Result<f64>;

    /// Returns a depth snapshot.
    fn order_book(&self, base: &str, quote: &str) -> Result<OrderBook>;

    /// Returns the available balances.
    fn funds(&self, base: &str, quote: &str) -> Result<Funds>;

    /// Places a limit order.
    fn place_order(&self, base: &str, quote: &str, side: OrderSide, volume: f64, price: f64) -> Result<Order>;

    /// Cancels an open order.
    fn cancel_order(&self, base: &str, quote: &str, order: &Order) -> Result<()>;

    /// Returns the open orders, sorted ascending by price.
    fn my_orders(&self, base: &str, quote: &str) -> Result<Vec<Order>>;

    /// Returns our completed trades, newest first.
    fn my_trades(&self, base: &str, quote: &str) -> Result<Vec<Trade>>;

    /// Returns the public trades executed since `since`.
    fn recent_trades(&self, _base: &str, _quote: &str, _since: DateTime<Utc>) -> Result<Vec<Trade>> {
        Err(Error::gateway(self.name(), "recent trades are not supported"))
    }

    /// Returns a receiver of pushed fills, when supported.
    fn fill_events(&self) -> Option<mpsc::Receiver<Fill>> {
        None
    }

    /// Returns the time-advance control of simulated gateways.
    fn time_control(&self) -> Option<&dyn TimeControl> {
        None
    }
}

/// Time advance of a simulated gateway.
pub trait TimeControl: Send + Sync {
    /// Moves the simulated market to `time`.
    fn set_iteration_time(&self, time: DateTime<Utc>) -> Result<()>;

    /// Returns the first and last times that can be simulated.
    fn time_range(&self) -> (DateTime<Utc>, DateTime<Utc>);
}

/// Thread-safe handle on a [`BacktestEngine`].
///
/// Clones share the same engine, so a caller can keep one to inspect the
/// simulation while a runner trades through another.
#[derive(Debug, Clone)]
pub struct SimulatedExchange {
    name: String,
    engine: Arc<Mutex<BacktestEngine>>,
}

impl SimulatedExchange {
    /// Wraps an engine under the `backtest` name.
    pub fn new(engine: BacktestEngine) -> Self {
        Self {
            name: "backtest".to_string(),
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    /// Renames the gateway.
    pub fn with_name(mut self, name: impl ToString) -> Self {
        self.name = name.to_string();
        self
    }

    /// Locks the engine.
    pub fn engine(&self) -> MutexGuard<'_, BacktestEngine> {
        self.engine.lock()
    }

    fn checked(&self, base: &str, quote: &str) -> Result<MutexGuard<'_, BacktestEngine>> {
        let engine = self.engine.lock();
        let config = engine.config();
        if config.base != base || config.quote != quote {
            return Err(Error::UnknownPair(base.to_string(), quote.to_string()));
        }
        Ok(engine)
    }
}

impl ExchangeGateway for SimulatedExchange {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> GatewayCapabilities {
        GatewayCapabilities {
            recent_trades: true,
            order_book: true,
            fill_events: true,
        }
    }

    fn last_price(&self, base: &str, quote: &str) -> Result<f64> {
        Ok(self.checked(base, quote)?.current_price())
    }

    fn order_book(&self, base: &str, quote: &str) -> Result<OrderBook> {
        Ok(self.checked(base, quote)?.order_book())
    }

    fn funds(&self, base: &str, quote: &str) -> Result<Funds> {
        Ok(self.checked(base, quote)?.funds())
    }

    fn place_order(&self, base: &str, quote: &str, side: OrderSide, volume: f64, price: f64) -> Result<Order> {
        self.checked(base, quote)?.place_order(side, volume, price)
    }

    fn cancel_order(&self, base: &str, quote: &str, order: &Order) -> Result<()> {
        self.checked(base, quote)?.cancel_order(order.id())?;
        Ok(())
    }

    fn my_orders(&self, base: &str, quote: &str) -> Result<Vec<Order>> {
        Ok(self.checked(base, quote)?.open_orders())
    }

    fn my_trades(&self, base: &str, quote: &str) -> Result<Vec<Trade>> {
        Ok(self.checked(base, quote)?.my_trades())
    }

    fn recent_trades(&self, base: &str, quote: &str, since: DateTime<Utc>) -> Result<Vec<Trade>> {
        Ok(self.checked(base, quote)?.recent_trades(since))
    }

    fn fill_events(&self) -> Option<mpsc::Receiver<Fill>> {
        Some(self.engine.lock().subscribe())
    }

    fn time_control(&self) -> Option<&dyn TimeControl> {
        Some(self)
    }
}

impl TimeControl for SimulatedExchange {
    fn set_iteration_time(&self, time: DateTime<Utc>) -> Result<()> {
        self.engine.lock().set_iteration_time(time)
    }

    fn time_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        self.engine.lock().time_range()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BacktestConfig, TapeRecord};

    fn exchange() -> SimulatedExchange {
        let t0 = DateTime::from_timestamp_secs(1515151515).unwrap();
        let tape = vec![
            TapeRecord::from((1, 100.0, 1.0, t0, OrderSide::Buy)),
            TapeRecord::from((2, 95.0, 1.0, t0 + chrono::Duration::seconds(10), OrderSide::Sell)),
        ];
        let config = BacktestConfig::new("BTC", "USD").fund("USD", 500.0);
        SimulatedExchange::new(BacktestEngine::new(tape, config).unwrap())
    }

    #[test]
    fn rejects_unknown_pair() {
        let gateway = exchange();
        assert!(matches!(gateway.last_price("ETH", "USD"), Err(Error::UnknownPair(_, _))));
        assert_eq!(gateway.last_price("BTC", "USD").unwrap(), 100.0);
    }

    #[test]
    fn clones_share_the_engine() {
        let gateway = exchange();
        let observer = gateway.clone();

        gateway.place_order("BTC", "USD", OrderSide::Buy, 1.0, 96.0).unwrap();
        assert_eq!(observer.engine().open_orders().len(), 1);
        assert_eq!(observer.funds("BTC", "USD").unwrap()["USD"], 404.0);
    }

    #[test]
    fn time_control_drives_fills() {
        let gateway = exchange();
        let fills = gateway.fill_events().unwrap();
        let order = gateway.place_order("BTC", "USD", OrderSide::Buy, 1.0, 96.0).unwrap();

        let control = gateway.time_control().unwrap();
        let (start, end) = control.time_range();
        assert!(start < end);
        control.set_iteration_time(end).unwrap();

        assert!(gateway.my_orders("BTC", "USD").unwrap().is_empty());
        assert_eq!(fills.try_recv().unwrap().order, order);
        assert_eq!(gateway.my_trades("BTC", "USD").unwrap().len(), 1);
    }
}
