//! Best-effort notifications.
//!
//! Runners report important events through a [`Notifier`], which never fails:
//! transports that can fail implement [`NotificationSink`] and are fanned out
//! by a [`NotifierHub`] that logs and swallows their errors.

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::errors::Result;

/// Notification severity, lowest first.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Routine information.
    Info,
    /// Worth a human look.
    Important,
    /// Something went wrong but the runner carries on.
    Warning,
    /// The runner failed.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Important => write!(f, "important"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Fire-and-forget notification channel.
pub trait Notifier: Send + Sync {
    /// Sends `message` on behalf of `who`.
    fn notify(&self, severity: Severity, who: &str, message: &str);

    /// Sends at info severity.
    fn send_info(&self, who: &str, message: &str) {
        self.notify(Severity::Info, who, message);
    }

    /// Sends at important severity.
    fn send_important(&self, who: &str, message: &str) {
        self.notify(Severity::Important, who, message);
    }

    /// Sends at warning severity.
    fn send_warning(&self, who: &str, message: &str) {
        self.notify(Severity::Warning, who, message);
    }

    /// Sends at error severity.
    fn send_error(&self, who: &str, message: &str) {
        self.notify(Severity::Error, who, message);
    }
}

/// A transport that may fail (mail, chat, webhook...).
pub trait NotificationSink: Send {
    /// Returns the transport name, used in logs.
    fn name(&self) -> &str;

    /// Delivers one notification.
    fn send(&mut self, severity: Severity, who: &str, message: &str) -> Result<()>;
}

/// Forwards notifications to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, severity: Severity, who: &str, message: &str) {
        match severity {
            Severity::Info => info!(target: "tradeloop::notify", who, "{message}"),
            Severity::Important => info!(target: "tradeloop::notify", who, important = true, "{message}"),
            Severity::Warning => warn!(target: "tradeloop::notify", who, "{message}"),
            Severity::Error => error!(target: "tradeloop::notify", who, "{message}"),
        }
    }
}

/// Process-wide fan-out to every registered sink.
///
/// Sends are serialized: sinks are called one notification at a time.
pub struct NotifierHub {
    sinks: Mutex<Vec<Box<dyn NotificationSink>>>,
    min_severity: Severity,
}

impl NotifierHub {
    /// Creates a hub without sinks, forwarding every severity.
    pub fn new() -> Self {
        Self::with_min_severity(Severity::Info)
    }

    /// Creates a hub dropping notifications below `min_severity`.
    pub fn with_min_severity(min_severity: Severity) -> Self {
        Self {
            sinks: Mutex::new(Vec::new()),
            min_severity,
        }
    }

    /// Registers a sink.
    pub fn add_sink(&self, sink: impl NotificationSink + 'static) {
        self.sinks.lock().push(Box::new(sink));
    }

    /// Returns the number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Returns `true` without sinks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NotifierHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for NotifierHub {
    fn notify(&self, severity: Severity, who: &str, message: &str) {
        if severity < self.min_severity {
            return;
        }
        let mut sinks = self.sinks.lock();
        for sink in sinks.iter_mut() {
            if let Err(e) = sink.send(severity, who, message) {
                warn!(sink = sink.name(), %severity, error = %e, "notification dropped");
            }
        }
    }
}
