use std::cell::OnceCell;

use chrono::{DateTime, Duration, Utc};

use crate::{
    engine::{Fill, Funds, Order, Trade},
    errors::Result,
    gateway::ExchangeGateway,
    market::OrderBook,
};

/// Read-through cache of the market state for one cycle.
///
/// Each value is fetched from the gateway at most once, on first use, and
/// stays as read for the rest of the cycle.
pub struct Snapshot<'a> {
    gateway: &'a dyn ExchangeGateway,
    base: &'a str,
    quote: &'a str,
    time: DateTime<Utc>,
    window: Duration,
    fills: Vec<Fill>,
    price: OnceCell<f64>,
    funds: OnceCell<Funds>,
    orders: OnceCell<Vec<Order>>,
    book: OnceCell<OrderBook>,
    recent: OnceCell<Vec<Trade>>,
}

/// Returns the cached value, fetching it first if needed.
fn cached<'c, T>(cell: &'c OnceCell<T>, fetch: impl FnOnce() -> Result<T>) -> Result<&'c T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = fetch()?;
    Ok(cell.get_or_init(|| value))
}

impl<'a> Snapshot<'a> {
    /// Creates an empty snapshot of `base`/`quote` at `time`.
    ///
    /// ### Arguments
    /// * `window` - how far back [`Snapshot::recent_trades`] looks.
    /// * `fills` - fills pushed by the gateway since the previous cycle.
    pub fn new(
        gateway: &'a dyn ExchangeGateway,
        base: &'a str,
        quote: &'a str,
        time: DateTime<Utc>,
        window: Duration,
        fills: Vec<Fill>,
    ) -> Self {
        Self {
            gateway,
            base,
            quote,
            time,
            window,
            fills,
            price: OnceCell::new(),
            funds: OnceCell::new(),
            orders: OnceCell::new(),
            book: OnceCell::new(),
            recent: OnceCell::new(),
        }
    }

    /// Base currency of the pair.
    pub fn base(&self) -> &str {
        self.base
    }

    /// Quote currency of the pair.
    pub fn quote(&self) -> &str {
        self.quote
    }

    /// Returns the cycle time.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Returns the gateway the snapshot reads from.
    pub fn gateway(&self) -> &'a dyn ExchangeGateway {
        self.gateway
    }

    /// Returns the last traded price.
    pub fn price(&self) -> Result<f64> {
        cached(&self.price, || self.gateway.last_price(self.base, self.quote)).copied()
    }

    /// Returns the available balances.
    pub fn funds(&self) -> Result<&Funds> {
        cached(&self.funds, || self.gateway.funds(self.base, self.quote))
    }

    /// Returns the available balance of `currency`, zero when not held.
    pub fn available(&self, currency: &str) -> Result<f64> {
        Ok(self.funds()?.get(currency).copied().unwrap_or(0.0))
    }

    /// Returns the open orders, sorted ascending by price.
    pub fn open_orders(&self) -> Result<&[Order]> {
        cached(&self.orders, || self.gateway.my_orders(self.base, self.quote)).map(Vec::as_slice)
    }

    /// Returns the depth snapshot.
    pub fn order_book(&self) -> Result<&OrderBook> {
        cached(&self.book, || self.gateway.order_book(self.base, self.quote))
    }

    /// Returns the public trades of the analytics window.
    pub fn recent_trades(&self) -> Result<&[Trade]> {
        cached(&self.recent, || {
            self.gateway.recent_trades(self.base, self.quote, self.time - self.window)
        })
        .map(Vec::as_slice)
    }

    /// Returns the fills pushed since the previous cycle.
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    /// Returns whether `order` is still open.
    ///
    /// A pushed fill answers without polling the gateway.
    pub fn is_open(&self, order: &Order) -> Result<bool> {
        if self.fills.iter().any(|fill| fill.order == *order) {
            return Ok(false);
        }
        Ok(self.open_orders()?.contains(order))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        engine::OrderSide,
        errors::Error,
        gateway::{ExchangeGateway, GatewayCapabilities},
    };

    #[derive(Default)]
    struct CountingGateway {
        calls: AtomicUsize,
    }

    impl ExchangeGateway for CountingGateway {
        fn name(&self) -> &str {
            "counting"
        }

        fn capabilities(&self) -> GatewayCapabilities {
            GatewayCapabilities::default()
        }

        fn last_price(&self, _: &str, _: &str) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(100.0)
        }

        fn order_book(&self, _: &str, _: &str) -> Result<OrderBook> {
            Err(Error::gateway("counting", "no book"))
        }

        fn funds(&self, _: &str, _: &str) -> Result<Funds> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Funds::from([("USD".to_string(), 10.0)]))
        }

        fn place_order(&self, _: &str, _: &str, _: OrderSide, _: f64, _: f64) -> Result<Order> {
            Err(Error::gateway("counting", "read only"))
        }

        fn cancel_order(&self, _: &str, _: &str, _: &Order) -> Result<()> {
            Err(Error::gateway("counting", "read only"))
        }

        fn my_orders(&self, _: &str, _: &str) -> Result<Vec<Order>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Order::from((7, OrderSide::Sell, 110.0, 1.0, DateTime::default()))])
        }

        fn my_trades(&self, _: &str, _: &str) -> Result<Vec<Trade>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn values_are_fetched_once() {
        let gateway = CountingGateway::default();
        let snapshot = Snapshot::new(&gateway, "BTC", "USD", DateTime::default(), Duration::hours(1), Vec::new());

        assert_eq!(snapshot.price().unwrap(), 100.0);
        assert_eq!(snapshot.price().unwrap(), 100.0);
        assert_eq!(snapshot.available("USD").unwrap(), 10.0);
        assert_eq!(snapshot.available("BTC").unwrap(), 0.0);
        assert_eq!(snapshot.open_orders().unwrap().len(), 1);
        assert_eq!(snapshot.open_orders().unwrap().len(), 1);

        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn errors_are_not_cached() {
        let gateway = CountingGateway::default();
        let snapshot = Snapshot::new(&gateway, "BTC", "USD", DateTime::default(), Duration::hours(1), Vec::new());

        assert!(snapshot.order_book().is_err());
        assert!(snapshot.recent_trades().is_err());
    }

    #[test]
    fn pushed_fill_closes_order() {
        let gateway = CountingGateway::default();
        let order = Order::from((7, OrderSide::Sell, 110.0, 1.0, DateTime::default()));
        let trade = Trade::from((1, OrderSide::Sell, 110.0, 1.0, DateTime::default()));
        let fills = vec![Fill { order, trade }];
        let snapshot = Snapshot::new(&gateway, "BTC", "USD", DateTime::default(), Duration::hours(1), fills);

        assert!(!snapshot.is_open(&order).unwrap());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }
}
