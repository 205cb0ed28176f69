//! Core simulation components.
//!
//! This module provides the fundamental types of the tape replay:
//! - `Order`, `Trade` and `Fill`: what a venue accepts and reports.
//! - `TapeRecord`: one historical trade.
//! - `Wallet`: funds with escrow, fees and reset.
//! - `Candle`: OHLCV bar produced by the aggregator.
//! - `BacktestEngine`: the deterministic matching engine.

mod bts;
mod candle;
mod order;
mod tape;
mod wallet;

pub use bts::*;
pub use candle::*;
pub use order::*;
pub use tape::*;
pub use wallet::*;
