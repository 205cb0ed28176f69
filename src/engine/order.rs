use chrono::{DateTime, Utc};

/// Represents the side of an order (buy or sell).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderSide {
    /// Spend quote currency to receive base currency.
    Buy,
    /// Spend base currency to receive quote currency.
    Sell,
}

impl OrderSide {
    /// Returns the other side.
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Whether a fill rested on the book or crossed it on placement.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liquidity {
    /// Resting order filled later by the tape crossing its price.
    Maker,
    /// Order that crossed the market when it was placed.
    Taker,
}

/// A limit order resting on a venue.
///
/// Orders are immutable once placed: they only disappear, by cancel or fill.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy)]
pub struct Order {
    id: u64,
    side: OrderSide,
    price: f64,
    volume: f64,
    created_at: DateTime<Utc>,
}

impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

type O1 = (u64, OrderSide, f64, f64, DateTime<Utc>);
impl From<O1> for Order {
    fn from((id, side, price, volume, created_at): O1) -> Self {
        Self {
            id,
            side,
            price,
            volume,
            created_at,
        }
    }
}

impl Order {
    /// Returns the venue id of the order.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the side of the order.
    pub fn side(&self) -> OrderSide {
        self.side
    }

    /// Returns the limit price.
    pub fn price(&self) -> f64 {
        self.price
    }

    /// Returns the volume, in base currency.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Returns when the order was placed.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the counter-currency notional (price * volume).
    pub fn notional(&self) -> f64 {
        self.price * self.volume
    }
}

/// A completed trade. Trades are append-only once recorded.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    id: u64,
    order_id: Option<u64>,
    side: OrderSide,
    price: f64,
    volume: f64,
    created_at: DateTime<Utc>,
    notional: f64,
    fee: f64,
    liquidity: Option<Liquidity>,
}

type T1 = (u64, OrderSide, f64, f64, DateTime<Utc>);
impl From<T1> for Trade {
    fn from((id, side, price, volume, created_at): T1) -> Self {
        Self {
            id,
            order_id: None,
            side,
            price,
            volume,
            created_at,
            notional: price * volume,
            fee: 0.0,
            liquidity: None,
        }
    }
}

impl Trade {
    /// Records the fill of `order` at `time`.
    pub fn from_fill(id: u64, order: &Order, time: DateTime<Utc>, fee: f64, liquidity: Liquidity) -> Self {
        Self {
            id,
            order_id: Some(order.id()),
            side: order.side(),
            price: order.price(),
            volume: order.volume(),
            created_at: time,
            notional: order.notional(),
            fee,
            liquidity: Some(liquidity),
        }
    }

    /// Returns the trade id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the id of the order that produced this trade, if it was ours.
    pub fn order_id(&self) -> Option<u64> {
        self.order_id
    }

    /// Returns the side.
    pub fn side(&self) -> OrderSide {
        self.side
    }

    /// Returns the execution price.
    pub fn price(&self) -> f64 {
        self.price
    }

    /// Returns the volume, in base currency.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Returns the execution time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the counter-currency notional.
    pub fn notional(&self) -> f64 {
        self.notional
    }

    /// Returns the fee charged on the credited currency.
    pub fn fee(&self) -> f64 {
        self.fee
    }

    /// Returns whether the trade was a maker or taker fill (simulated trades only).
    pub fn liquidity(&self) -> Option<Liquidity> {
        self.liquidity
    }
}

/// Pushed by gateways that can notify fills without being polled.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    /// The order that was filled.
    pub order: Order,
    /// The resulting trade.
    pub trade: Trade,
}

#[cfg(test)]
#[test]
fn order_equality_by_id() {
    let t = DateTime::default();
    let order1: Order = (1, OrderSide::Buy, 100.0, 1.0, t).into();
    let order2: Order = (1, OrderSide::Sell, 90.0, 2.0, t).into();
    let order3: Order = (2, OrderSide::Buy, 100.0, 1.0, t).into();
    assert_eq!(order1, order2);
    assert_ne!(order1, order3);
}

#[cfg(test)]
#[test]
fn order_notional() {
    let order: Order = (1, OrderSide::Buy, 100.0, 2.5, DateTime::default()).into();
    assert_eq!(order.notional(), 250.0);
}

#[cfg(test)]
#[test]
fn trade_from_fill_copies_order() {
    let order: Order = (7, OrderSide::Sell, 120.0, 0.5, DateTime::default()).into();
    let trade = Trade::from_fill(1, &order, DateTime::default(), 0.06, Liquidity::Maker);
    assert_eq!(trade.order_id(), Some(7));
    assert_eq!(trade.side(), OrderSide::Sell);
    assert_eq!(trade.notional(), 60.0);
    assert_eq!(trade.liquidity(), Some(Liquidity::Maker));
}
