use chrono::Duration;
use tracing::{info, warn};

use crate::{
    PercentCalculus,
    clock::Clock,
    engine::{Order, OrderSide},
    errors::{Error, Result},
    gateway::ExchangeGateway,
    market::NO_SELL_FILL,
    notify::Notifier,
    runner::{FillWait, RunnerConfig, wait_for_market_fill},
    strategy::Snapshot,
};

/// Cancels and sells at market every resting sell order older than the
/// stop-loss delay whose price dropped beyond the stop-loss percent.
///
/// Live gateways price the sell from their order book; simulated gateways
/// use the last tape price.
///
/// ### Returns
/// The liquidated orders.
pub(crate) fn enforce_stop_loss(
    config: &RunnerConfig,
    gateway: &dyn ExchangeGateway,
    clock: &dyn Clock,
    notifier: &dyn Notifier,
    snapshot: &Snapshot<'_>,
) -> Result<Vec<Order>> {
    let Some(stop_loss) = config.stop_loss else {
        return Ok(Vec::new());
    };
    let delay = Duration::from_std(stop_loss.delay).map_err(|e| Error::invalid("stop_loss.delay", e))?;

    let mut liquidated = Vec::new();
    for order in snapshot.open_orders()?.iter().filter(|o| o.side() == OrderSide::Sell) {
        if snapshot.time() - order.created_at() <= delay {
            continue;
        }
        let price = snapshot.price()?;
        let change = order.price().change(price);
        if -change <= stop_loss.percent {
            continue;
        }

        warn!(runner = %config.name, id = order.id(), order_price = order.price(), price, change, "stop-loss triggered");
        gateway.cancel_order(&config.base, &config.quote, order)?;

        // Simulated books are synthetic and must not price simulated fills.
        let mut sell_price = price;
        if gateway.capabilities().order_book && gateway.time_control().is_none() {
            let book_price = snapshot.order_book()?.find_price_for_sell(order.volume());
            if book_price != NO_SELL_FILL {
                sell_price = book_price;
            }
        }
        let market = gateway.place_order(&config.base, &config.quote, OrderSide::Sell, order.volume(), sell_price)?;
        let wait = wait_for_market_fill(gateway, clock, &config.base, &config.quote, &market, &config.fill_wait)?;
        info!(runner = %config.name, id = market.id(), sell_price, ?wait, "stop-loss liquidation done");

        let outcome = match wait {
            FillWait::Filled => "sold",
            FillWait::TimedOut => "not filled, cancelled",
        };
        notifier.send_warning(
            &config.name,
            &format!(
                "stop-loss on sell {} {} at {}: market sell at {sell_price} {outcome}",
                order.volume(),
                config.base,
                order.price()
            ),
        );
        liquidated.push(*order);
    }
    Ok(liquidated)
}
