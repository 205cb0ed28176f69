use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    PercentCalculus,
    engine::{Order, OrderSide, Trade},
    errors::{Error, Result},
    strategy::{IntentOutcome, OrderIntent, Snapshot, Strategy, StrategyCapabilities, StrategyParams},
};

/// Whether a price sitting exactly on a band bound counts as inside.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Boundary {
    /// `lower <= price <= upper`
    #[default]
    Inclusive,
    /// `lower < price < upper`
    Exclusive,
}

/// Parameters of the [`RangeStrategy`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeConfig {
    /// Recent-trade window used to compute the mean price.
    pub window: Duration,
    /// Width of the volatility band, in percent of the mean.
    pub volatility: f64,
    /// Minimum fraction (0..=1) of recent trades inside the band.
    pub in_range_threshold: f64,
    /// Width of the take-profit band, in percent of the mean.
    pub take_profit: f64,
    /// Percent of the available quote funds kept aside.
    pub reserve: f64,
    /// Minimum quote amount worth an order.
    pub min_amount: f64,
    /// Price-on-bound rule.
    pub band_boundary: Boundary,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3600),
            volatility: 2.0,
            in_range_threshold: 0.8,
            take_profit: 1.0,
            reserve: 0.0,
            min_amount: 10.0,
            band_boundary: Boundary::Inclusive,
        }
    }
}

impl RangeConfig {
    /// Sets how far back trades are analysed.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Sets the volatility and take-profit band widths, in percent.
    pub fn bands(mut self, volatility: f64, take_profit: f64) -> Self {
        self.volatility = volatility;
        self.take_profit = take_profit;
        self
    }

    /// Sets the fraction of trades that must sit in the band, in `[0, 1]`.
    pub fn in_range_threshold(mut self, threshold: f64) -> Self {
        self.in_range_threshold = threshold;
        self
    }

    /// Sets the percent of quote funds never spent.
    pub fn reserve(mut self, reserve: f64) -> Self {
        self.reserve = reserve;
        self
    }

    /// Sets the smallest order value, in quote currency.
    pub fn min_amount(mut self, min_amount: f64) -> Self {
        self.min_amount = min_amount;
        self
    }

    /// Sets whether band bounds count as inside.
    pub fn band_boundary(mut self, boundary: Boundary) -> Self {
        self.band_boundary = boundary;
        self
    }

    /// Reads the configuration from named parameters.
    ///
    /// `volatility` and `take_profit` are required; `window_secs`,
    /// `in_range_threshold`, `reserve`, `min_amount` and `band_exclusive`
    /// (non-zero for [`Boundary::Exclusive`]) fall back to the defaults.
    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        let default = Self::default();
        let window = match params.get("window_secs") {
            Some(secs) if secs > 0.0 && secs.is_finite() => Duration::from_secs_f64(secs),
            Some(secs) => return Err(Error::invalid("window_secs", format!("must be positive (got: {secs})"))),
            None => default.window,
        };
        let band_boundary = match params.get("band_exclusive") {
            Some(flag) if flag != 0.0 => Boundary::Exclusive,
            _ => Boundary::Inclusive,
        };

        let config = Self {
            window,
            volatility: params.require("volatility")?,
            in_range_threshold: params.get("in_range_threshold").unwrap_or(default.in_range_threshold),
            take_profit: params.require("take_profit")?,
            reserve: params.get("reserve").unwrap_or(default.reserve),
            min_amount: params.get("min_amount").unwrap_or(default.min_amount),
            band_boundary,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(Error::invalid("window", "must be positive"));
        }
        if !(self.volatility > 0.0 && self.volatility < 200.0) {
            return Err(Error::invalid("volatility", format!("must be in (0, 200) (got: {})", self.volatility)));
        }
        if !(self.take_profit > 0.0 && self.take_profit < self.volatility) {
            return Err(Error::invalid(
                "take_profit",
                format!("must be in (0, volatility) (got: {})", self.take_profit),
            ));
        }
        if !(self.in_range_threshold > 0.0 && self.in_range_threshold <= 1.0) {
            return Err(Error::invalid(
                "in_range_threshold",
                format!("must be in (0, 1] (got: {})", self.in_range_threshold),
            ));
        }
        if !(0.0..100.0).contains(&self.reserve) {
            return Err(Error::invalid("reserve", format!("must be in [0, 100) (got: {})", self.reserve)));
        }
        if !(self.min_amount >= 0.0) {
            return Err(Error::invalid("min_amount", format!("must not be negative (got: {})", self.min_amount)));
        }
        Ok(())
    }
}

/// Volatility band computed when entering a range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    /// Lower bound.
    pub lower: f64,
    /// Mean of the trades the band was computed from.
    pub mean: f64,
    /// Upper bound.
    pub upper: f64,
}

impl Band {
    /// Band of `width` percent centered on `mean`.
    pub fn around(mean: f64, width: f64) -> Self {
        Self {
            lower: mean.subpercent(width / 2.0),
            mean,
            upper: mean.addpercent(width / 2.0),
        }
    }

    /// Returns `true` if `price` is inside the band.
    pub fn contains(&self, price: f64, boundary: Boundary) -> bool {
        match boundary {
            Boundary::Inclusive => self.lower <= price && price <= self.upper,
            Boundary::Exclusive => self.lower < price && price < self.upper,
        }
    }

    /// Returns the fraction of `trades` priced inside the band.
    pub fn coverage(&self, trades: &[Trade], boundary: Boundary) -> f64 {
        if trades.is_empty() {
            return 0.0;
        }
        let inside = trades.iter().filter(|t| self.contains(t.price(), boundary)).count();
        inside as f64 / trades.len() as f64
    }
}

/// Where the range trade stands.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RangeState {
    /// Waiting for a stable range.
    #[default]
    None,
    /// Range found, buy not placed yet.
    New {
        /// Band of the range.
        band: Band,
        /// Target buy price.
        buy_price: f64,
        /// Target sell price.
        sell_price: f64,
    },
    /// Buy order resting.
    PlacedBuy {
        /// Band of the range.
        band: Band,
        /// Resting buy order.
        buy: Order,
        /// Target sell price.
        sell_price: f64,
    },
    /// Bought, sell order resting.
    PlacedSell {
        /// Band of the range.
        band: Band,
        /// Resting sell order.
        sell: Order,
    },
}

impl RangeState {
    /// Returns the band the state was entered with.
    pub fn band(&self) -> Option<Band> {
        match self {
            Self::None => None,
            Self::New { band, .. } | Self::PlacedBuy { band, .. } | Self::PlacedSell { band, .. } => Some(*band),
        }
    }
}

/// Buys low and sells high inside a stable price range.
///
/// The strategy waits until most recent trades sit inside a volatility band
/// around their mean, buys below the mean, then sells above it. When the
/// price leaves the original band the targets are dropped and a resting buy
/// is cancelled.
#[derive(Debug, Clone)]
pub struct RangeStrategy {
    name: String,
    config: RangeConfig,
    state: RangeState,
}

impl RangeStrategy {
    /// Validates `config` and starts with no range.
    pub fn new(config: RangeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: "range".to_string(),
            config,
            state: RangeState::None,
        })
    }

    /// Renames the strategy, as seen in logs and notifications.
    pub fn with_name(mut self, name: impl ToString) -> Self {
        self.name = name.to_string();
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RangeConfig {
        &self.config
    }

    /// Returns where the range trade stands.
    pub fn state(&self) -> &RangeState {
        &self.state
    }

    fn reset(&mut self, reason: &str) {
        info!(strategy = %self.name, reason, "range reset");
        self.state = RangeState::None;
    }

    /// Looks for a range in the recent trades.
    fn find_range(&self, trades: &[Trade]) -> Option<RangeState> {
        let mean = trades.iter().map(|t| t.price()).sum::<f64>() / trades.len() as f64;
        let band = Band::around(mean, self.config.volatility);
        let coverage = band.coverage(trades, self.config.band_boundary);
        if coverage < self.config.in_range_threshold {
            debug!(strategy = %self.name, mean, coverage, "no stable range");
            return None;
        }

        let target = Band::around(mean, self.config.take_profit);
        debug!(strategy = %self.name, mean, coverage, buy = target.lower, sell = target.upper, "range found");
        Some(RangeState::New {
            band,
            buy_price: target.lower,
            sell_price: target.upper,
        })
    }

    fn buy_intent(&mut self, snapshot: &Snapshot<'_>, buy_price: f64) -> Result<Option<OrderIntent>> {
        let available = snapshot.available(snapshot.quote())?;
        let reserved = available.how_many(self.config.reserve);
        let spendable = available - reserved;
        if spendable <= self.config.min_amount {
            info!(strategy = %self.name, spendable, reserved, min = self.config.min_amount, "not enough funds to buy");
            self.state = RangeState::None;
            return Ok(None);
        }
        Ok(Some(OrderIntent::Place {
            side: OrderSide::Buy,
            volume: spendable / buy_price,
            price: buy_price,
        }))
    }

    fn sell_intent(&mut self, snapshot: &Snapshot<'_>, buy: &Order, sell_price: f64) -> Result<Option<OrderIntent>> {
        let volume = buy.volume().min(snapshot.available(snapshot.base())?);
        if volume <= 0.0 {
            warn!(strategy = %self.name, buy = buy.id(), "bought volume is not available");
            self.state = RangeState::None;
            return Ok(None);
        }
        Ok(Some(OrderIntent::Place {
            side: OrderSide::Sell,
            volume,
            price: sell_price,
        }))
    }
}

impl Strategy for RangeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> StrategyCapabilities {
        StrategyCapabilities {
            market_analytics: true,
            order_book: false,
        }
    }

    fn analytics_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.window).unwrap_or(chrono::Duration::MAX)
    }

    fn decide(&mut self, snapshot: &Snapshot<'_>) -> Result<Vec<OrderIntent>> {
        let trades = snapshot.recent_trades()?;
        if trades.is_empty() {
            debug!(strategy = %self.name, "no recent trades");
            return Ok(Vec::new());
        }
        let in_range = self
            .state
            .band()
            .is_none_or(|band| band.coverage(trades, self.config.band_boundary) >= self.config.in_range_threshold);

        match self.state {
            RangeState::None => {
                let Some(state) = self.find_range(trades) else {
                    return Ok(Vec::new());
                };
                self.state = state;
                if let RangeState::New { buy_price, .. } = state {
                    return Ok(self.buy_intent(snapshot, buy_price)?.into_iter().collect());
                }
                Ok(Vec::new())
            }
            RangeState::New { buy_price, .. } => {
                if !in_range {
                    self.reset("price left the band");
                    return Ok(Vec::new());
                }
                Ok(self.buy_intent(snapshot, buy_price)?.into_iter().collect())
            }
            RangeState::PlacedBuy { buy, sell_price, .. } => {
                if !snapshot.is_open(&buy)? {
                    return Ok(self.sell_intent(snapshot, &buy, sell_price)?.into_iter().collect());
                }
                if !in_range {
                    self.reset("price left the band");
                    return Ok(vec![OrderIntent::Cancel(buy)]);
                }
                Ok(Vec::new())
            }
            RangeState::PlacedSell { sell, .. } => {
                if !snapshot.is_open(&sell)? {
                    info!(strategy = %self.name, price = sell.price(), volume = sell.volume(), "range trade completed");
                    self.state = RangeState::None;
                } else if !in_range {
                    self.reset("price left the band");
                }
                Ok(Vec::new())
            }
        }
    }

    fn on_outcome(&mut self, outcome: &IntentOutcome) {
        match (*outcome, self.state) {
            (IntentOutcome::Placed(buy), RangeState::New { band, sell_price, .. }) if buy.side() == OrderSide::Buy => {
                self.state = RangeState::PlacedBuy { band, buy, sell_price };
            }
            (IntentOutcome::Placed(sell), RangeState::PlacedBuy { band, .. }) if sell.side() == OrderSide::Sell => {
                self.state = RangeState::PlacedSell { band, sell };
            }
            (IntentOutcome::Skipped(OrderIntent::Place { side: OrderSide::Buy, .. }), RangeState::New { .. }) => {
                self.reset("buy skipped");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::{
        engine::{BacktestConfig, BacktestEngine, TapeRecord},
        gateway::{ExchangeGateway, SimulatedExchange, TimeControl},
    };

    fn t(minutes: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_secs(1515151500).unwrap() + chrono::Duration::minutes(minutes)
    }

    /// An hour around 100, a dip to 99.4, then a rise to 100.6.
    fn exchange() -> SimulatedExchange {
        let mut tape = (0..60)
            .map(|i| {
                let price = if i % 2 == 0 { 100.2 } else { 99.8 };
                TapeRecord::from((i as u64, price, 1.0, t(i), OrderSide::Buy))
            })
            .collect::<Vec<_>>();
        tape.push(TapeRecord::from((60, 99.4, 1.0, t(60), OrderSide::Sell)));
        tape.push(TapeRecord::from((61, 100.0, 1.0, t(61), OrderSide::Buy)));
        tape.push(TapeRecord::from((62, 100.6, 1.0, t(62), OrderSide::Buy)));
        tape.push(TapeRecord::from((63, 80.0, 1.0, t(63), OrderSide::Sell)));
        tape.push(TapeRecord::from((64, 80.0, 1.0, t(120), OrderSide::Sell)));

        let config = BacktestConfig::new("BTC", "USD").fund("USD", 1000.0);
        SimulatedExchange::new(BacktestEngine::new(tape, config).unwrap())
    }

    /// Runs one decision at `time` the way a runner does.
    fn step(strategy: &mut RangeStrategy, gateway: &SimulatedExchange, time: DateTime<Utc>) -> Vec<OrderIntent> {
        gateway.set_iteration_time(time).unwrap();
        let snapshot = Snapshot::new(gateway, "BTC", "USD", time, strategy.analytics_window(), Vec::new());
        let intents = strategy.decide(&snapshot).unwrap();
        for intent in &intents {
            let outcome = match *intent {
                OrderIntent::Place { side, volume, price } => {
                    IntentOutcome::Placed(gateway.place_order("BTC", "USD", side, volume, price).unwrap())
                }
                OrderIntent::Cancel(order) => {
                    gateway.cancel_order("BTC", "USD", &order).unwrap();
                    IntentOutcome::Cancelled(order)
                }
            };
            strategy.on_outcome(&outcome);
        }
        intents
    }

    #[test]
    fn from_params_requires_bands() {
        let params = StrategyParams::new().set("volatility", 2.0);
        assert!(matches!(RangeConfig::from_params(&params), Err(Error::MissingParameter(_))));

        let params = params.set("take_profit", 1.0).set("band_exclusive", 1.0).set("window_secs", 600.0);
        let config = RangeConfig::from_params(&params).unwrap();
        assert_eq!(config.band_boundary, Boundary::Exclusive);
        assert_eq!(config.window, Duration::from_secs(600));
    }

    #[test]
    fn validate_rejects_wide_take_profit() {
        let config = RangeConfig::default().bands(1.0, 2.0);
        assert!(matches!(RangeStrategy::new(config), Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn boundary_rule_is_literal() {
        let band = Band { lower: 99.0, mean: 100.0, upper: 101.0 };
        assert!(band.contains(101.0, Boundary::Inclusive));
        assert!(!band.contains(101.0, Boundary::Exclusive));
        assert!(band.contains(100.5, Boundary::Exclusive));
    }

    #[test]
    fn scenario_full_range_cycle() {
        let gateway = exchange();
        let mut strategy = RangeStrategy::new(RangeConfig::default()).unwrap();

        let intents = step(&mut strategy, &gateway, t(59));
        assert!(matches!(intents[..], [OrderIntent::Place { side: OrderSide::Buy, .. }]));
        assert!(matches!(strategy.state(), RangeState::PlacedBuy { .. }));

        let intents = step(&mut strategy, &gateway, t(60));
        assert!(matches!(intents[..], [OrderIntent::Place { side: OrderSide::Sell, .. }]));
        assert!(matches!(strategy.state(), RangeState::PlacedSell { .. }));

        assert!(step(&mut strategy, &gateway, t(61)).is_empty());
        assert!(matches!(strategy.state(), RangeState::PlacedSell { .. }));

        step(&mut strategy, &gateway, t(62));
        assert_eq!(strategy.state(), &RangeState::None);

        let funds = gateway.funds("BTC", "USD").unwrap();
        assert!(funds["USD"] > 1005.0);
        assert!(funds["BTC"].abs() < 1e-9);
    }

    #[test]
    fn scenario_game_over_cancels_resting_buy() {
        let gateway = exchange();
        let config = RangeConfig::default().window(Duration::from_secs(120));
        let mut strategy = RangeStrategy::new(config).unwrap();

        step(&mut strategy, &gateway, t(59));
        let RangeState::PlacedBuy { buy, .. } = *strategy.state() else {
            panic!("expected a resting buy");
        };
        gateway.cancel_order("BTC", "USD", &buy).unwrap();
        let buy = gateway.place_order("BTC", "USD", OrderSide::Buy, 1.0, 50.0).unwrap();
        strategy.state = match strategy.state {
            RangeState::PlacedBuy { band, sell_price, .. } => RangeState::PlacedBuy { band, buy, sell_price },
            other => other,
        };

        // two minutes of trades at 80 are all outside the band
        let intents = step(&mut strategy, &gateway, t(120));
        assert_eq!(intents, vec![OrderIntent::Cancel(buy)]);
        assert_eq!(strategy.state(), &RangeState::None);
        assert!(gateway.my_orders("BTC", "USD").unwrap().is_empty());
    }

    #[test]
    fn not_enough_funds_reverts_to_none() {
        let gateway = exchange();
        let config = RangeConfig::default().min_amount(5000.0);
        let mut strategy = RangeStrategy::new(config).unwrap();

        assert!(step(&mut strategy, &gateway, t(59)).is_empty());
        assert_eq!(strategy.state(), &RangeState::None);
    }

    #[test]
    fn reserve_is_kept_aside() {
        let gateway = exchange();
        let mut strategy = RangeStrategy::new(RangeConfig::default().reserve(25.0)).unwrap();

        let intents = step(&mut strategy, &gateway, t(59));
        let [OrderIntent::Place { side: OrderSide::Buy, volume, price }] = intents[..] else {
            panic!("expected one buy, got {intents:?}");
        };
        assert!((volume * price - 750.0).abs() < 1e-9);
        assert!((gateway.funds("BTC", "USD").unwrap()["USD"] - 250.0).abs() < 1e-9);
    }

    #[test]
    fn skipped_buy_resets() {
        let mut strategy = RangeStrategy::new(RangeConfig::default()).unwrap();
        let band = Band::around(100.0, 2.0);
        strategy.state = RangeState::New {
            band,
            buy_price: 99.5,
            sell_price: 100.5,
        };
        strategy.on_outcome(&IntentOutcome::Skipped(OrderIntent::Place {
            side: OrderSide::Buy,
            volume: 1.0,
            price: 99.5,
        }));
        assert_eq!(strategy.state(), &RangeState::None);
    }
}
