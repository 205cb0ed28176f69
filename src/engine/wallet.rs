use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Available balance per currency code.
pub type Funds = BTreeMap<String, f64>;

/// Rounding slack tolerated when escrowing and releasing funds.
const DUST: f64 = 1e-9;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
struct Balance {
    // Free to escrow
    available: f64,
    // Escrowed against open orders
    locked: f64,
    // Cumulative fees charged in this currency
    fees: f64,
}

/// Multi-currency fund ledger with escrow for open orders.
///
/// Balances never go negative: funds are only mutated by placement (escrow),
/// cancel (refund) and fill (credit net of fee).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    // Initial funds used for reset
    initial: Funds,
    balances: BTreeMap<String, Balance>,
}

impl Wallet {
    /// Creates a new wallet with the given initial funds.
    /// Negative balances are rejected.
    pub fn new(initial: Funds) -> Result<Self> {
        if let Some((currency, amount)) = initial.iter().find(|(_, amount)| **amount < 0.0 || !amount.is_finite()) {
            return Err(Error::invalid(format!("funds.{currency}"), format!("must be positive (got: {amount})")));
        }

        let balances = initial
            .iter()
            .map(|(currency, amount)| {
                let balance = Balance {
                    available: *amount,
                    ..Default::default()
                };
                (currency.clone(), balance)
            })
            .collect();

        Ok(Self { initial, balances })
    }

    /// Returns the funds the wallet started with.
    pub fn initial_funds(&self) -> &Funds {
        &self.initial
    }

    /// Returns the available (not escrowed) balance, zero for unknown currencies.
    pub fn available(&self, currency: &str) -> f64 {
        self.balances.get(currency).map(|b| b.available).unwrap_or(0.0)
    }

    /// Returns the escrowed balance.
    pub fn locked(&self, currency: &str) -> f64 {
        self.balances.get(currency).map(|b| b.locked).unwrap_or(0.0)
    }

    /// Returns available plus escrowed balance.
    pub fn total(&self, currency: &str) -> f64 {
        self.available(currency) + self.locked(currency)
    }

    /// Returns the fees paid in this currency.
    pub fn fees_paid(&self, currency: &str) -> f64 {
        self.balances.get(currency).map(|b| b.fees).unwrap_or(0.0)
    }

    /// Returns the available balance of every currency.
    pub fn funds(&self) -> Funds {
        self.balances
            .iter()
            .map(|(currency, balance)| (currency.clone(), balance.available))
            .collect()
    }

    /// Escrows funds for an order.
    pub(crate) fn lock(&mut self, currency: &str, amount: f64) -> Result<()> {
        if amount <= 0.0 || !amount.is_finite() {
            return Err(Error::invalid("escrow", format!("must be positive (got: {amount})")));
        }
        let available = self.available(currency);
        if available + DUST < amount {
            return Err(Error::InsufficientFunds {
                currency: currency.to_string(),
                required: amount,
                available,
            });
        }
        let balance = self
            .balances
            .get_mut(currency)
            .ok_or_else(|| Error::UnknownCurrency(currency.to_string()))?;
        balance.available = (balance.available - amount).max(0.0);
        balance.locked += amount;
        Ok(())
    }

    /// Refunds escrowed funds when an order is cancelled.
    pub(crate) fn unlock(&mut self, currency: &str, amount: f64) -> Result<()> {
        let balance = self.release(currency, amount)?;
        balance.available += amount;
        Ok(())
    }

    /// Consumes the escrow of a filled order and credits the counter currency
    /// with `gross` net of one fee application. Returns the fee charged.
    pub(crate) fn settle(&mut self, escrow: (&str, f64), credit: (&str, f64), fee_rate: f64) -> Result<f64> {
        let (debit_currency, escrowed) = escrow;
        let (credit_currency, gross) = credit;
        self.release(debit_currency, escrowed)?;

        let fee = gross * fee_rate;
        let balance = self.balances.entry(credit_currency.to_string()).or_default();
        balance.available += gross - fee;
        balance.fees += fee;
        Ok(fee)
    }

    fn release(&mut self, currency: &str, amount: f64) -> Result<&mut Balance> {
        if amount <= 0.0 || !amount.is_finite() {
            return Err(Error::invalid("escrow", format!("must be positive (got: {amount})")));
        }
        let balance = self
            .balances
            .get_mut(currency)
            .ok_or_else(|| Error::UnknownCurrency(currency.to_string()))?;
        if balance.locked - amount < -DUST {
            return Err(Error::UnlockBalance(currency.to_string(), amount, balance.locked));
        }
        balance.locked = (balance.locked - amount).max(0.0);
        Ok(balance)
    }

    /// Resets the wallet to its initial funds.
    pub(crate) fn reset(&mut self) {
        *self = Self {
            initial: self.initial.clone(),
            balances: self
                .initial
                .iter()
                .map(|(currency, amount)| {
                    let balance = Balance {
                        available: *amount,
                        ..Default::default()
                    };
                    (currency.clone(), balance)
                })
                .collect(),
        };
    }
}
