//! Market data helpers: bar aggregation and order book pricing.

mod aggregator;
mod book;

pub use aggregator::*;
pub use book::*;
