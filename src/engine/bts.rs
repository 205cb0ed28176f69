use std::sync::{Arc, mpsc};

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, trace};

#[cfg(feature = "metrics")]
use crate::metrics::*;
use crate::{
    PercentCalculus,
    engine::*,
    errors::{Error, Result},
    market::{OrderBook, PriceLevel},
};

/// Volume range of the synthetic book levels, in base currency.
const BOOK_LEVEL_VOLUME: std::ops::Range<f64> = 0.1..5.0;

/// Settings of a [`BacktestEngine`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    /// Base currency code (e.g. `BTC`).
    pub base: String,
    /// Quote currency code (e.g. `USD`).
    pub quote: String,
    /// Maker fee percentage (e.g. 0.1 for 0.1%).
    pub maker_fee: f64,
    /// Taker fee percentage (e.g. 0.2 for 0.2%).
    pub taker_fee: f64,
    /// Initial funds per currency.
    pub funds: Funds,
    /// Number of levels on each side of the synthetic book.
    pub book_depth: usize,
    /// Distance between two synthetic levels, as a percentage of the price.
    pub book_step: f64,
    /// Seed of the synthetic book volumes.
    pub seed: u64,
}

impl BacktestConfig {
    /// Creates a fee-free configuration for the `base`/`quote` pair.
    pub fn new(base: impl ToString, quote: impl ToString) -> Self {
        Self {
            base: base.to_string(),
            quote: quote.to_string(),
            maker_fee: 0.0,
            taker_fee: 0.0,
            funds: Funds::new(),
            book_depth: 10,
            book_step: 0.1,
            seed: 42,
        }
    }

    /// Sets the maker and taker fee percentages.
    pub fn fees(mut self, maker_fee: f64, taker_fee: f64) -> Self {
        self.maker_fee = maker_fee;
        self.taker_fee = taker_fee;
        self
    }

    /// Sets the initial balance of `currency`.
    pub fn fund(mut self, currency: impl ToString, amount: f64) -> Self {
        self.funds.insert(currency.to_string(), amount);
        self
    }

    /// Sets the synthetic book depth and level step percentage.
    pub fn book(mut self, depth: usize, step: f64) -> Self {
        self.book_depth = depth;
        self.book_step = step;
        self
    }

    /// Sets the seed of the synthetic book.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.base.is_empty() || self.quote.is_empty() || self.base == self.quote {
            return Err(Error::invalid("pair", format!("{}/{} is not a pair", self.base, self.quote)));
        }
        for (name, fee) in [("maker_fee", self.maker_fee), ("taker_fee", self.taker_fee)] {
            if !(0.0..100.0).contains(&fee) {
                return Err(Error::invalid(name, format!("must be in [0, 100) (got: {fee})")));
            }
        }
        if self.book_depth == 0 {
            return Err(Error::invalid("book_depth", "must be at least 1"));
        }
        if self.book_step <= 0.0 || !self.book_step.is_finite() {
            return Err(Error::invalid("book_step", format!("must be positive (got: {})", self.book_step)));
        }
        Ok(())
    }
}

/// Deterministic replay of a trade tape with simulated order matching.
///
/// Orders escrow their funds when placed. A resting order fills as a maker the
/// first time the tape price crosses it; an order crossing the tape price when
/// placed fills immediately as a taker. Fills settle at the order price.
///
/// The synthetic order book uses its own seeded generator: nothing random
/// takes part in fill decisions, so the same tape and the same call sequence
/// always produce the same funds and trades.
#[derive(Debug)]
pub struct BacktestEngine {
    config: BacktestConfig,
    tape: Arc<[TapeRecord]>,
    current_tick: usize,
    last_time: DateTime<Utc>,
    wallet: Wallet,
    orders: Vec<Order>,
    trades: Vec<Trade>,
    next_order_id: u64,
    next_trade_id: u64,
    book_rng: StdRng,
    subscribers: Vec<mpsc::Sender<Fill>>,
    #[cfg(feature = "metrics")]
    events: Vec<Event>,
}

impl BacktestEngine {
    /// Creates a new engine over `tape`, which does not need to be sorted.
    ///
    /// ### Example
    /// ```rust
    /// use tradeloop::prelude::*;
    /// use chrono::{DateTime, Duration};
    ///
    /// let t0 = DateTime::from_timestamp_secs(1515151515).unwrap();
    /// let tape = vec![
    ///     TapeRecord::from((1, 100.0, 1.0, t0, OrderSide::Buy)),
    ///     TapeRecord::from((2, 95.0, 1.0, t0 + Duration::seconds(1), OrderSide::Sell)),
    /// ];
    /// let config = BacktestConfig::new("BTC", "USD").fund("USD", 1000.0);
    /// let mut engine = BacktestEngine::new(tape, config).unwrap();
    ///
    /// engine.place_order(OrderSide::Buy, 1.0, 98.0).unwrap();
    /// engine.set_iteration_time(t0 + Duration::seconds(1)).unwrap();
    /// assert_eq!(engine.wallet().available("BTC"), 1.0);
    /// ```
    pub fn new(tape: impl Into<Vec<TapeRecord>>, config: BacktestConfig) -> Result<Self> {
        config.validate()?;
        let mut tape = tape.into();
        if tape.is_empty() {
            return Err(Error::TapeEmpty);
        }
        if let Some(record) = tape
            .iter()
            .find(|r| !(r.price() > 0.0 && r.price().is_finite() && r.volume() >= 0.0 && r.volume().is_finite()))
        {
            return Err(Error::invalid(
                "tape",
                format!("record {} has price {} and volume {}", record.id(), record.price(), record.volume()),
            ));
        }
        sort_tape(&mut tape);
        let tape: Arc<[TapeRecord]> = Arc::from(tape);

        Ok(Self {
            last_time: tape[0].time(),
            tape,
            current_tick: 0,
            wallet: Wallet::new(config.funds.clone())?,
            orders: Vec::new(),
            trades: Vec::new(),
            next_order_id: 1,
            next_trade_id: 1,
            book_rng: StdRng::seed_from_u64(config.seed),
            subscribers: Vec::new(),
            #[cfg(feature = "metrics")]
            events: Vec::new(),
            config,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Returns the sorted tape.
    pub fn tape(&self) -> &[TapeRecord] {
        &self.tape
    }

    /// Returns the first and last tape times.
    pub fn time_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let first = self.tape.first().map(|r| r.time()).unwrap_or(self.last_time);
        let last = self.tape.last().map(|r| r.time()).unwrap_or(self.last_time);
        (first, last)
    }

    /// Returns the index of the current tape record.
    pub fn current_tick(&self) -> usize {
        self.current_tick
    }

    /// Returns the virtual time.
    pub fn last_time(&self) -> DateTime<Utc> {
        self.last_time
    }

    /// Returns the price of the current tape record.
    pub fn current_price(&self) -> f64 {
        self.tape[self.current_tick].price()
    }

    /// Returns the fund ledger.
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Returns the available funds.
    pub fn funds(&self) -> Funds {
        self.wallet.funds()
    }

    /// Returns the open orders, sorted ascending by price.
    pub fn open_orders(&self) -> Vec<Order> {
        let mut orders = self.orders.clone();
        orders.sort_by(|a, b| a.price().total_cmp(&b.price()).then(a.id().cmp(&b.id())));
        orders
    }

    /// Returns the completed simulated trades, in execution order.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Returns the completed simulated trades, newest first.
    pub fn my_trades(&self) -> Vec<Trade> {
        let mut trades = self.trades.clone();
        trades.reverse();
        trades
    }

    /// Returns the tape trades seen since `since`, up to the current record.
    pub fn recent_trades(&self, since: DateTime<Utc>) -> Vec<Trade> {
        self.tape[..=self.current_tick]
            .iter()
            .filter(|r| r.time() >= since)
            .map(|r| r.to_trade())
            .collect()
    }

    /// Returns the total holdings valued in quote currency at the current price.
    pub fn equity(&self) -> f64 {
        self.wallet.total(&self.config.quote) + self.wallet.total(&self.config.base) * self.current_price()
    }

    /// Returns an iterator over the recorded events.
    #[cfg(feature = "metrics")]
    pub fn events(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    /// Registers a fill listener; every later fill is pushed to the receiver.
    pub fn subscribe(&mut self) -> mpsc::Receiver<Fill> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(sender);
        receiver
    }

    /// Moves the virtual clock to `time`.
    ///
    /// The cursor advances through every record up to `time` and, at each
    /// reached record, resting orders crossed by its price fill as makers.
    pub fn set_iteration_time(&mut self, time: DateTime<Utc>) -> Result<()> {
        let (start, end) = self.time_range();
        if time < start || time > end {
            return Err(Error::OutOfRange { time, start, end });
        }
        if time < self.last_time {
            return Err(Error::TimeWentBackwards {
                current: self.last_time,
                requested: time,
            });
        }

        while self.current_tick + 1 < self.tape.len() && self.tape[self.current_tick + 1].time() <= time {
            self.current_tick += 1;
            self.match_orders()?;
        }
        self.last_time = time;
        trace!(tick = self.current_tick, %time, "tape advanced");
        Ok(())
    }

    /// Places a limit order, escrowing its funds.
    ///
    /// The returned order is already filled when its price crosses the
    /// current tape price.
    pub fn place_order(&mut self, side: OrderSide, volume: f64, price: f64) -> Result<Order> {
        if volume <= 0.0 || !volume.is_finite() {
            return Err(Error::InvalidVolume(volume));
        }
        if price <= 0.0 || !price.is_finite() {
            return Err(Error::InvalidPrice(price));
        }

        let order = Order::from((self.next_order_id, side, price, volume, self.last_time));
        let (currency, amount) = self.escrow(&order);
        self.wallet.lock(&currency, amount)?;
        self.next_order_id += 1;
        #[cfg(feature = "metrics")]
        self.events.push(Event::Placed(self.last_time, order));
        debug!(id = order.id(), %side, volume, price, "order placed");

        if self.crosses(&order, self.current_price()) {
            self.fill(&order, Liquidity::Taker)?;
        } else {
            self.orders.push(order);
        }
        Ok(order)
    }

    /// Cancels an open order and refunds its escrow.
    pub fn cancel_order(&mut self, id: u64) -> Result<Order> {
        let idx = self
            .orders
            .iter()
            .position(|o| o.id() == id)
            .ok_or(Error::OrderNotFound(id))?;
        let order = self.orders[idx];
        let (currency, amount) = self.escrow(&order);
        self.wallet.unlock(&currency, amount)?;
        self.orders.remove(idx);
        #[cfg(feature = "metrics")]
        {
            self.events.push(Event::Cancelled(self.last_time, order));
            let update = Event::from((self.last_time, &*self));
            self.events.push(update);
        }
        debug!(id, "order cancelled");
        Ok(order)
    }

    /// Builds a synthetic symmetric ladder around the current price.
    ///
    /// Volumes are random and not historically accurate.
    pub fn order_book(&mut self) -> OrderBook {
        let price = self.current_price();
        let mut asks = Vec::with_capacity(self.config.book_depth);
        let mut bids = Vec::with_capacity(self.config.book_depth);

        for level in 1..=self.config.book_depth {
            let distance = self.config.book_step * level as f64;
            asks.push(PriceLevel::new(price.addpercent(distance), self.book_rng.random_range(BOOK_LEVEL_VOLUME)));
            let bid = price.subpercent(distance);
            if bid > 0.0 {
                bids.push(PriceLevel::new(bid, self.book_rng.random_range(BOOK_LEVEL_VOLUME)));
            }
        }

        OrderBook::new(asks, bids)
    }

    /// Resets the engine to the start of the tape with the initial funds.
    pub fn reset(&mut self) {
        #[cfg(feature = "metrics")]
        {
            self.events = Vec::new();
        }

        self.current_tick = 0;
        self.last_time = self.tape[0].time();
        self.wallet.reset();
        self.orders = Vec::new();
        self.trades = Vec::new();
        self.next_order_id = 1;
        self.next_trade_id = 1;
        self.book_rng = StdRng::seed_from_u64(self.config.seed);
    }

    fn crosses(&self, order: &Order, price: f64) -> bool {
        match order.side() {
            OrderSide::Buy => price <= order.price(),
            OrderSide::Sell => price >= order.price(),
        }
    }

    /// Currency and amount escrowed by `order`.
    fn escrow(&self, order: &Order) -> (String, f64) {
        match order.side() {
            OrderSide::Buy => (self.config.quote.clone(), order.notional()),
            OrderSide::Sell => (self.config.base.clone(), order.volume()),
        }
    }

    /// Fills resting orders crossed by the current record.
    fn match_orders(&mut self) -> Result<()> {
        let price = self.current_price();
        let (filled, resting): (Vec<Order>, Vec<Order>) =
            self.orders.iter().partition(|order| self.crosses(order, price));
        self.orders = resting;
        for order in filled {
            self.fill(&order, Liquidity::Maker)?;
        }
        Ok(())
    }

    /// Settles `order`: consumes its escrow and credits the counter currency
    /// net of exactly one fee.
    fn fill(&mut self, order: &Order, liquidity: Liquidity) -> Result<()> {
        let fee_percent = match liquidity {
            Liquidity::Maker => self.config.maker_fee,
            Liquidity::Taker => self.config.taker_fee,
        };
        let escrow = self.escrow(order);
        let credit = match order.side() {
            OrderSide::Buy => (self.config.base.clone(), order.volume()),
            OrderSide::Sell => (self.config.quote.clone(), order.notional()),
        };
        let fee = self
            .wallet
            .settle((&escrow.0, escrow.1), (&credit.0, credit.1), fee_percent / 100.0)?;

        let time = self.tape[self.current_tick].time().max(order.created_at());
        let trade = Trade::from_fill(self.next_trade_id, order, time, fee, liquidity);
        self.next_trade_id += 1;
        self.trades.push(trade);
        self.subscribers
            .retain(|subscriber| subscriber.send(Fill { order: *order, trade }).is_ok());
        #[cfg(feature = "metrics")]
        {
            self.events.push(Event::Filled(time, trade));
            let update = Event::from((time, &*self));
            self.events.push(update);
        }
        debug!(id = order.id(), ?liquidity, price = order.price(), fee, "order filled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_secs(1515151515 + secs).unwrap()
    }

    fn tape(prices: &[f64]) -> Vec<TapeRecord> {
        prices
            .iter()
            .enumerate()
            .map(|(i, price)| TapeRecord::from((i as u64 + 1, *price, 1.0, t(i as i64), OrderSide::Buy)))
            .collect()
    }

    fn engine(prices: &[f64], maker_fee: f64, taker_fee: f64) -> BacktestEngine {
        let config = BacktestConfig::new("BTC", "USD")
            .fees(maker_fee, taker_fee)
            .fund("USD", 1000.0)
            .fund("BTC", 10.0);
        BacktestEngine::new(tape(prices), config).unwrap()
    }

    #[test]
    fn new_rejects_empty_tape() {
        let result = BacktestEngine::new(Vec::new(), BacktestConfig::new("BTC", "USD"));
        assert!(matches!(result, Err(Error::TapeEmpty)));
    }

    #[test]
    fn new_rejects_broken_records() {
        let t0 = t(0);
        for (price, volume) in [(f64::NAN, 1.0), (0.0, 1.0), (-5.0, 1.0), (f64::INFINITY, 1.0), (100.0, -1.0)] {
            let records = vec![
                TapeRecord::from((1, 100.0, 1.0, t0, OrderSide::Buy)),
                TapeRecord::from((2, price, volume, t0, OrderSide::Sell)),
            ];
            let result = BacktestEngine::new(records, BacktestConfig::new("BTC", "USD"));
            assert!(
                matches!(result, Err(Error::InvalidParameter { ref name, .. }) if name == "tape"),
                "price {price} volume {volume}"
            );
        }
    }

    #[test]
    fn new_rejects_bad_fees() {
        let config = BacktestConfig::new("BTC", "USD").fees(-1.0, 0.0);
        let result = BacktestEngine::new(tape(&[100.0]), config);
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn new_sorts_tape() {
        let mut records = tape(&[100.0, 95.0, 105.0]);
        records.reverse();
        let engine = BacktestEngine::new(records, BacktestConfig::new("BTC", "USD")).unwrap();
        assert_eq!(engine.current_price(), 100.0);
        assert_eq!(engine.time_range(), (t(0), t(2)));
    }

    #[test]
    fn scenario_resting_buy_fills_as_maker() {
        let mut bt = engine(&[100.0, 95.0, 105.0], 0.0, 0.0);

        let order = bt.place_order(OrderSide::Buy, 1.0, 98.0).unwrap();
        assert_eq!(bt.open_orders(), vec![order]);
        assert_eq!(bt.wallet().available("USD"), 902.0);
        assert_eq!(bt.wallet().locked("USD"), 98.0);

        bt.set_iteration_time(t(1)).unwrap();

        assert!(bt.open_orders().is_empty());
        assert_eq!(bt.wallet().available("BTC"), 11.0);
        assert_eq!(bt.wallet().available("USD"), 902.0);
        assert_eq!(bt.wallet().locked("USD"), 0.0);
        assert_eq!(bt.trades().len(), 1);
        assert_eq!(bt.trades()[0].liquidity(), Some(Liquidity::Maker));
    }

    #[test]
    fn scenario_crossing_buy_fills_as_taker() {
        let mut bt = engine(&[100.0, 95.0], 0.1, 1.0);

        bt.place_order(OrderSide::Buy, 1.0, 100.0).unwrap();

        assert!(bt.open_orders().is_empty());
        let trade = bt.trades()[0];
        assert_eq!(trade.liquidity(), Some(Liquidity::Taker));
        assert_eq!(trade.fee(), 0.01);
        assert_eq!(bt.wallet().available("USD"), 900.0);
        assert!((bt.wallet().available("BTC") - 10.99).abs() < 1e-9);
    }

    #[test]
    fn scenario_maker_fee_applied_once() {
        let mut bt = engine(&[100.0, 95.0], 1.0, 2.0);

        bt.place_order(OrderSide::Buy, 2.0, 98.0).unwrap();
        bt.set_iteration_time(t(1)).unwrap();

        assert_eq!(bt.trades()[0].fee(), 0.02);
        assert_eq!(bt.wallet().fees_paid("BTC"), 0.02);
        assert_eq!(bt.wallet().fees_paid("USD"), 0.0);
        assert!((bt.wallet().available("BTC") - 11.98).abs() < 1e-9);
    }

    #[test]
    fn scenario_sell_fills_when_tape_rises() {
        let mut bt = engine(&[100.0, 95.0, 105.0], 0.0, 0.0);

        bt.place_order(OrderSide::Sell, 2.0, 104.0).unwrap();
        assert_eq!(bt.wallet().available("BTC"), 8.0);

        bt.set_iteration_time(t(1)).unwrap();
        assert_eq!(bt.open_orders().len(), 1);

        bt.set_iteration_time(t(2)).unwrap();
        assert!(bt.open_orders().is_empty());
        assert_eq!(bt.wallet().available("USD"), 1208.0);
        assert_eq!(bt.wallet().total("BTC"), 8.0);
    }

    #[test]
    fn cancel_refunds_escrow() {
        let mut bt = engine(&[100.0, 95.0], 0.0, 0.0);

        let order = bt.place_order(OrderSide::Buy, 1.0, 90.0).unwrap();
        bt.cancel_order(order.id()).unwrap();

        assert!(bt.open_orders().is_empty());
        assert_eq!(bt.wallet().available("USD"), 1000.0);
        assert_eq!(bt.wallet().locked("USD"), 0.0);
        assert!(matches!(bt.cancel_order(order.id()), Err(Error::OrderNotFound(_))));
    }

    #[test]
    fn place_rejects_bad_input_without_escrow() {
        let mut bt = engine(&[100.0], 0.0, 0.0);

        assert!(matches!(bt.place_order(OrderSide::Buy, 0.0, 90.0), Err(Error::InvalidVolume(_))));
        assert!(matches!(bt.place_order(OrderSide::Buy, 1.0, -1.0), Err(Error::InvalidPrice(_))));
        assert!(matches!(
            bt.place_order(OrderSide::Buy, 100.0, 90.0),
            Err(Error::InsufficientFunds { .. })
        ));
        assert_eq!(bt.wallet().available("USD"), 1000.0);
        assert!(bt.open_orders().is_empty());
    }

    #[test]
    fn set_iteration_time_bounds() {
        let mut bt = engine(&[100.0, 95.0, 105.0], 0.0, 0.0);

        assert!(matches!(bt.set_iteration_time(t(3)), Err(Error::OutOfRange { .. })));
        assert!(matches!(bt.set_iteration_time(t(-1)), Err(Error::OutOfRange { .. })));

        bt.set_iteration_time(t(2)).unwrap();
        assert_eq!(bt.current_tick(), 2);
        assert!(matches!(bt.set_iteration_time(t(1)), Err(Error::TimeWentBackwards { .. })));
        bt.set_iteration_time(t(2)).unwrap();
    }

    #[test]
    fn cursor_never_looks_ahead() {
        let mut bt = engine(&[100.0, 95.0, 105.0], 0.0, 0.0);
        bt.set_iteration_time(t(1) - Duration::milliseconds(1)).unwrap();
        assert_eq!(bt.current_price(), 100.0);
        assert_eq!(bt.recent_trades(t(0)).len(), 1);
    }

    #[test]
    fn open_orders_sorted_by_price_and_trades_newest_first() {
        let mut bt = engine(&[100.0, 95.0, 90.0], 0.0, 0.0);

        bt.place_order(OrderSide::Buy, 1.0, 96.0).unwrap();
        bt.place_order(OrderSide::Buy, 1.0, 91.0).unwrap();
        bt.place_order(OrderSide::Buy, 1.0, 93.0).unwrap();
        let prices = bt.open_orders().iter().map(|o| o.price()).collect::<Vec<_>>();
        assert_eq!(prices, vec![91.0, 93.0, 96.0]);

        bt.set_iteration_time(t(2)).unwrap();
        let trades = bt.my_trades();
        assert_eq!(trades.len(), 3);
        assert!(trades[0].created_at() >= trades[2].created_at());
        assert_eq!(trades[2].price(), 96.0);
    }

    #[test]
    fn subscribers_receive_fills() {
        let mut bt = engine(&[100.0, 95.0], 0.0, 0.0);
        let receiver = bt.subscribe();

        let order = bt.place_order(OrderSide::Buy, 1.0, 98.0).unwrap();
        bt.set_iteration_time(t(1)).unwrap();

        let fill = receiver.try_recv().unwrap();
        assert_eq!(fill.order, order);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn synthetic_book_is_sorted_and_seeded() {
        let mut bt = engine(&[100.0], 0.0, 0.0);
        let book = bt.order_book();

        assert_eq!(book.asks().len(), 10);
        assert_eq!(book.bids().len(), 10);
        assert!(book.asks()[0].price > 100.0);
        assert!(book.bids()[0].price < 100.0);
        assert!(book.asks().windows(2).all(|w| w[0].price < w[1].price));
        assert!(book.bids().windows(2).all(|w| w[0].price > w[1].price));

        bt.reset();
        assert_eq!(bt.order_book(), book);
    }

    #[test]
    fn book_randomness_does_not_change_fills() {
        let run = |read_book: bool| {
            let mut bt = engine(&[100.0, 97.0, 95.0, 103.0], 0.1, 0.2);
            bt.place_order(OrderSide::Buy, 1.0, 96.0).unwrap();
            if read_book {
                bt.order_book();
            }
            bt.set_iteration_time(t(2)).unwrap();
            bt.place_order(OrderSide::Sell, 0.5, 102.0).unwrap();
            bt.set_iteration_time(t(3)).unwrap();
            (bt.funds(), bt.trades().to_vec())
        };

        assert_eq!(run(false), run(true));
    }

    #[test]
    fn replay_is_deterministic() {
        let run = || {
            let mut bt = engine(&[100.0, 99.0, 97.5, 101.0, 96.0, 104.0], 0.1, 0.25);
            bt.place_order(OrderSide::Buy, 1.5, 98.0).unwrap();
            bt.set_iteration_time(t(2)).unwrap();
            let sell = bt.place_order(OrderSide::Sell, 1.0, 110.0).unwrap();
            bt.place_order(OrderSide::Buy, 1.0, 101.0).unwrap();
            bt.set_iteration_time(t(4)).unwrap();
            bt.cancel_order(sell.id()).unwrap();
            bt.place_order(OrderSide::Sell, 2.0, 103.0).unwrap();
            bt.set_iteration_time(t(5)).unwrap();
            (bt.funds(), bt.trades().to_vec(), bt.open_orders())
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut bt = engine(&[100.0, 95.0], 0.0, 0.0);
        bt.place_order(OrderSide::Buy, 1.0, 98.0).unwrap();
        bt.set_iteration_time(t(1)).unwrap();

        bt.reset();
        assert_eq!(bt.current_tick(), 0);
        assert_eq!(bt.last_time(), t(0));
        assert!(bt.trades().is_empty());
        assert_eq!(bt.wallet().available("USD"), 1000.0);
        assert_eq!(bt.wallet().available("BTC"), 10.0);
    }
}
