use chrono::{DateTime, Utc};

/// Result of every fallible operation in the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the engine, gateways, strategies and runners.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The venue (or its transport) failed to answer a request.
    #[error("Gateway error ({gateway}): {message}")]
    Gateway {
        /// Name of the failing gateway.
        gateway: String,
        /// Human readable cause.
        message: String,
    },

    /// A required configuration parameter is missing.
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// A configuration parameter is out of its accepted domain.
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The strategy needs a capability the gateway does not offer.
    #[error("Strategy {strategy} requires {capability} but gateway {gateway} does not provide it")]
    MissingCapability {
        /// Strategy name.
        strategy: String,
        /// Gateway name.
        gateway: String,
        /// Missing capability.
        capability: &'static str,
    },

    /// Emulation was requested on a runner that cannot emulate.
    #[error("Emulation unavailable: {0}")]
    Emulation(String),

    /// The tape holds no record.
    #[error("Tape is empty: emulation requires at least one trade")]
    TapeEmpty,

    /// The requested time is outside of the tape.
    #[error("Time {time} is outside of the tape range [{start}, {end}]")]
    OutOfRange {
        /// Requested time.
        time: DateTime<Utc>,
        /// First tape time.
        start: DateTime<Utc>,
        /// Last tape time.
        end: DateTime<Utc>,
    },

    /// Time can only move forward.
    #[error("Time went backwards: {requested} is before {current}")]
    TimeWentBackwards {
        /// Current time.
        current: DateTime<Utc>,
        /// Requested time.
        requested: DateTime<Utc>,
    },

    /// The wallet does not have enough funds to escrow the order.
    #[error("Insufficient {currency} funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Currency code.
        currency: String,
        /// Required amount.
        required: f64,
        /// Available amount.
        available: f64,
    },

    /// The currency is not held in the wallet.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    /// More funds were released than were escrowed.
    #[error("Cannot release {1} {0}: only {2} escrowed")]
    UnlockBalance(String, f64, f64),

    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(u64),

    /// Order volume must be positive and finite.
    #[error("Volume must be positive (got: {0})")]
    InvalidVolume(f64),

    /// Order price must be positive and finite.
    #[error("Price must be positive (got: {0})")]
    InvalidPrice(f64),

    /// The gateway does not trade this pair.
    #[error("Unknown pair {0}/{1}")]
    UnknownPair(String, String),

    /// `start` was called on a running runner.
    #[error("Strategy runner {0} is already running")]
    AlreadyRunning(String),

    /// Candle width must be between 1 second and 24 hours.
    #[error("Candle width must be between 1s and 24h (got: {0}s)")]
    InvalidWidth(i64),

    /// Candles to group do not share the same width.
    #[error("Candles must share the same width: {0}s and {1}s")]
    MixedCandleWidths(i64, i64),

    /// Group size must be at least one.
    #[error("Group size must be at least 1 (got: {0})")]
    InvalidGroupSize(usize),

    /// Candle fields do not describe a valid bar.
    #[error("Invalid candle: {0}")]
    InvalidCandle(String),

    /// A strategy failed to decide.
    #[error("Strategy {strategy} failed: {message}")]
    Strategy {
        /// Strategy name.
        strategy: String,
        /// Human readable cause.
        message: String,
    },

    /// Nothing registered under this name.
    #[error("Nothing registered under the name {0}")]
    NotRegistered(String),

    /// I/O error occurred.
    // utils.rs
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error occurred.
    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    /// Builds a gateway error.
    pub fn gateway(gateway: impl ToString, message: impl ToString) -> Self {
        Self::Gateway {
            gateway: gateway.to_string(),
            message: message.to_string(),
        }
    }

    /// Builds an invalid parameter error.
    pub fn invalid(name: impl ToString, reason: impl ToString) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Configuration and simulation-range errors abort construction or emulation.
    /// Everything else raised during a cycle only counts as a critical.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter(_)
                | Self::InvalidParameter { .. }
                | Self::MissingCapability { .. }
                | Self::Emulation(_)
                | Self::TapeEmpty
                | Self::OutOfRange { .. }
                | Self::TimeWentBackwards { .. }
        )
    }
}

#[cfg(test)]
#[test]
fn fatal_classification() {
    assert!(Error::MissingParameter("volatility".into()).is_fatal());
    assert!(Error::TapeEmpty.is_fatal());
    assert!(!Error::gateway("sim", "timeout").is_fatal());
    assert!(!Error::OrderNotFound(3).is_fatal());
}
