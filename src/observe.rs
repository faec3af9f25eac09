//! Wire-level observability.
//!
//! Every line sent or received is handed to a [`LineObserver`]. The default
//! [`TracingObserver`] logs to the `tmi_chat::wire` target at `trace` level.
//! Lines pass through [`redact`] first, so a `PASS` secret never reaches an
//! observer in full.

use std::borrow::Cow;
use std::fmt;

/// Characters of a secret left visible after masking.
const VISIBLE_SECRET_CHARS: usize = 4;

/// Which way a line travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Received from the server.
    Inbound,
    /// Sent to the server.
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inbound => "<<",
            Self::Outbound => ">>",
        })
    }
}

/// Receives every wire line, already redacted.
pub trait LineObserver: Send + Sync {
    /// Called once per line, without the line terminator.
    fn observe(&self, direction: Direction, line: &str);
}

impl<F> LineObserver for F
where
    F: Fn(Direction, &str) + Send + Sync,
{
    fn observe(&self, direction: Direction, line: &str) {
        self(direction, line)
    }
}

/// Logs wire lines with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl LineObserver for TracingObserver {
    fn observe(&self, direction: Direction, line: &str) {
        tracing::trace!(target: "tmi_chat::wire", %direction, "{}", line);
    }
}

/// Keep the first few characters of a secret and mask the rest. A secret
/// no longer than the visible part is masked entirely.
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= VISIBLE_SECRET_CHARS {
        return "***".to_owned();
    }
    let visible: String = secret.chars().take(VISIBLE_SECRET_CHARS).collect();
    format!("{}***", visible)
}

/// Mask the secret of a `PASS` line. Other lines are returned unchanged.
pub fn redact(line: &str) -> Cow<'_, str> {
    match line.strip_prefix("PASS ") {
        Some(secret) => Cow::Owned(format!("PASS {}", mask_secret(secret))),
        None => Cow::Borrowed(line),
    }
}
