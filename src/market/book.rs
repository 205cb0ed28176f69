/// Price returned by [`OrderBook::find_price_for_sell`] when bids are too thin.
pub const NO_SELL_FILL: f64 = 0.0;

/// Price returned by [`OrderBook::find_price_for_buy`] when asks are too thin.
pub const NO_BUY_FILL: f64 = f64::INFINITY;

/// A single price level of the book.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    /// Level price.
    pub price: f64,
    /// Volume resting at this price, in base currency.
    pub volume: f64,
}

impl PriceLevel {
    /// Creates a new price level.
    pub fn new(price: f64, volume: f64) -> Self {
        Self { price, volume }
    }

    /// Returns the quote notional at this level.
    pub fn notional(&self) -> f64 {
        self.price * self.volume
    }
}

/// Two-sided depth snapshot: asks ascending, bids descending.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBook {
    asks: Vec<PriceLevel>,
    bids: Vec<PriceLevel>,
}

impl OrderBook {
    /// Creates a book, sorting both sides.
    pub fn new(mut asks: Vec<PriceLevel>, mut bids: Vec<PriceLevel>) -> Self {
        asks.sort_by(|a, b| a.price.total_cmp(&b.price));
        bids.sort_by(|a, b| b.price.total_cmp(&a.price));
        Self { asks, bids }
    }

    /// Returns the asks, best (lowest) first.
    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    /// Returns the bids, best (highest) first.
    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    /// Lowest ask, if any.
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    /// Highest bid, if any.
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    /// Returns best ask minus best bid.
    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }

    /// Worst bid price needed to sell `volume` base units against visible depth.
    ///
    /// ### Returns
    /// The price of the first level at which the cumulative bid volume
    /// exceeds `volume`, or [`NO_SELL_FILL`] when depth is insufficient.
    pub fn find_price_for_sell(&self, volume: f64) -> f64 {
        let mut cumulated = 0.0;
        for level in &self.bids {
            cumulated += level.volume;
            if cumulated > volume {
                return level.price;
            }
        }
        NO_SELL_FILL
    }

    /// Worst ask price needed to spend `amount` quote units against visible depth.
    ///
    /// ### Returns
    /// The price of the first level at which the cumulative ask notional
    /// exceeds `amount`, or [`NO_BUY_FILL`] when depth is insufficient.
    pub fn find_price_for_buy(&self, amount: f64) -> f64 {
        let mut cumulated = 0.0;
        for level in &self.asks {
            cumulated += level.notional();
            if cumulated > amount {
                return level.price;
            }
        }
        NO_BUY_FILL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBook {
        OrderBook::new(
            vec![PriceLevel::new(102.0, 1.0), PriceLevel::new(101.0, 2.0)],
            vec![PriceLevel::new(99.0, 3.0), PriceLevel::new(100.0, 2.0)],
        )
    }

    #[test]
    fn new_sorts_both_sides() {
        let book = book();
        assert_eq!(book.best_ask(), Some(PriceLevel::new(101.0, 2.0)));
        assert_eq!(book.best_bid(), Some(PriceLevel::new(100.0, 2.0)));
        assert_eq!(book.spread(), Some(1.0));
    }

    #[test]
    fn scenario_sell_crosses_into_second_level() {
        assert_eq!(book().find_price_for_sell(2.5), 99.0);
    }

    #[test]
    fn sell_needs_strictly_more_depth() {
        // exactly 2.0 at the best bid is not enough to exceed 2.0
        assert_eq!(book().find_price_for_sell(2.0), 99.0);
        assert_eq!(book().find_price_for_sell(1.9), 100.0);
        assert_eq!(book().find_price_for_sell(5.0), NO_SELL_FILL);
    }

    #[test]
    fn buy_walks_notional() {
        // 101 * 2 = 202 at the best ask
        assert_eq!(book().find_price_for_buy(150.0), 101.0);
        assert_eq!(book().find_price_for_buy(250.0), 102.0);
        assert_eq!(book().find_price_for_buy(304.0), NO_BUY_FILL);
    }

    #[test]
    fn empty_sides_return_sentinels() {
        let book = OrderBook::default();
        assert_eq!(book.find_price_for_sell(0.1), NO_SELL_FILL);
        assert_eq!(book.find_price_for_buy(0.1), NO_BUY_FILL);
        assert_eq!(book.spread(), None);
    }
}
