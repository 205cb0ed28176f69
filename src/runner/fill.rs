use tracing::{debug, warn};

use crate::{
    clock::Clock,
    engine::Order,
    errors::Result,
    gateway::ExchangeGateway,
    runner::FillWaitConfig,
};

/// How a fill wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillWait {
    /// The order left the open orders.
    Filled,
    /// The order was still open at the timeout and got cancelled.
    TimedOut,
}

/// Polls the open orders until `order` is gone, at most
/// [`FillWaitConfig::max_polls`] times, then cancels it.
///
/// ### Returns
/// [`FillWait::Filled`] once the order is no longer open, or
/// [`FillWait::TimedOut`] after it was cancelled.
pub fn wait_for_market_fill(
    gateway: &dyn ExchangeGateway,
    clock: &dyn Clock,
    base: &str,
    quote: &str,
    order: &Order,
    config: &FillWaitConfig,
) -> Result<FillWait> {
    let polls = config.max_polls();
    for poll in 1..=polls {
        if !gateway.my_orders(base, quote)?.contains(order) {
            debug!(id = order.id(), poll, "market order filled");
            return Ok(FillWait::Filled);
        }
        if poll < polls {
            clock.sleep(config.poll_interval);
        }
    }

    warn!(id = order.id(), polls, "market order not filled in time, cancelling");
    gateway.cancel_order(base, quote, order)?;
    Ok(FillWait::TimedOut)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::DateTime;

    use super::*;
    use crate::{
        clock::VirtualClock,
        engine::{BacktestConfig, BacktestEngine, OrderSide, TapeRecord},
        gateway::SimulatedExchange,
    };

    fn exchange() -> SimulatedExchange {
        let t0 = DateTime::from_timestamp_secs(1515151515).unwrap();
        let tape = vec![TapeRecord::from((1, 100.0, 1.0, t0, OrderSide::Buy))];
        let config = BacktestConfig::new("BTC", "USD").fund("BTC", 2.0);
        SimulatedExchange::new(BacktestEngine::new(tape, config).unwrap())
    }

    #[test]
    fn crossing_order_is_filled() {
        let gateway = exchange();
        let clock = VirtualClock::new(DateTime::default());
        let order = gateway.place_order("BTC", "USD", OrderSide::Sell, 1.0, 99.0).unwrap();

        let wait = wait_for_market_fill(&gateway, &clock, "BTC", "USD", &order, &FillWaitConfig::default());
        assert_eq!(wait.unwrap(), FillWait::Filled);
    }

    #[test]
    fn resting_order_times_out_and_is_cancelled() {
        let gateway = exchange();
        let clock = VirtualClock::new(DateTime::default());
        let order = gateway.place_order("BTC", "USD", OrderSide::Sell, 1.0, 120.0).unwrap();
        let config = FillWaitConfig {
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_millis(250),
        };

        let wait = wait_for_market_fill(&gateway, &clock, "BTC", "USD", &order, &config);
        assert_eq!(wait.unwrap(), FillWait::TimedOut);
        assert!(gateway.my_orders("BTC", "USD").unwrap().is_empty());
        assert_eq!(gateway.funds("BTC", "USD").unwrap()["BTC"], 2.0);
    }
}
