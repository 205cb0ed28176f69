use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use chrono::serde::ts_milliseconds;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{OrderSide, Trade};

/// Anything with a time, a price and a volume: ticks, tape records, trades.
pub trait PricePoint {
    /// Returns when the sample was observed.
    fn time(&self) -> DateTime<Utc>;
    /// Returns the observed price.
    fn price(&self) -> f64;
    /// Returns the traded volume.
    fn volume(&self) -> f64;
}

// {"id": 1, "price": 100.5, "volume": 0.2, "time": 1515151515000, "side": "buy"}

/// One historical trade of the tape.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapeRecord {
    id: u64,
    price: f64,
    volume: f64,
    #[cfg_attr(feature = "serde", serde(with = "ts_milliseconds"))]
    time: DateTime<Utc>,
    side: OrderSide,
}

type R1 = (u64, f64, f64, DateTime<Utc>, OrderSide);
impl From<R1> for TapeRecord {
    fn from((id, price, volume, time, side): R1) -> Self {
        Self {
            id,
            price,
            volume,
            time,
            side,
        }
    }
}

impl TapeRecord {
    /// Returns the tape id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the aggressor side.
    pub fn side(&self) -> OrderSide {
        self.side
    }

    /// Converts the record to a public market trade.
    pub fn to_trade(&self) -> Trade {
        Trade::from((self.id, self.side, self.price, self.volume, self.time))
    }
}

impl PricePoint for TapeRecord {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn price(&self) -> f64 {
        self.price
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

impl PricePoint for Trade {
    fn time(&self) -> DateTime<Utc> {
        self.created_at()
    }

    fn price(&self) -> f64 {
        Trade::price(self)
    }

    fn volume(&self) -> f64 {
        Trade::volume(self)
    }
}

/// Sorts records chronologically, ties broken by id so loading is order-independent.
pub fn sort_tape(records: &mut [TapeRecord]) {
    records.sort_by(|a, b| a.time.cmp(&b.time).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
#[test]
fn sort_is_order_independent() {
    let t = DateTime::from_timestamp_secs(1515151515).unwrap();
    let a: TapeRecord = (2, 100.0, 1.0, t, OrderSide::Buy).into();
    let b: TapeRecord = (1, 101.0, 1.0, t, OrderSide::Sell).into();
    let c: TapeRecord = (3, 99.0, 1.0, t - chrono::Duration::seconds(1), OrderSide::Buy).into();

    let mut first = vec![a, b, c];
    let mut second = vec![c, a, b];
    sort_tape(&mut first);
    sort_tape(&mut second);

    assert_eq!(first, second);
    assert_eq!(first.iter().map(|r| r.id()).collect::<Vec<_>>(), vec![3, 1, 2]);
}
