//! Sluice error types
//!
//! Two layers: [`TransportError`] is an ordinary value produced by an
//! [`Invoker`](crate::Invoker) and travels through the window like any other
//! outcome. [`SluiceError`] is raised to the consumer and ends the stream.

use std::time::Duration;

/// Failure of a single remote call.
///
/// Captured by the invoker and returned as data, never raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("cannot serialize request: {0}")]
    Encode(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl TransportError {
    /// HTTP status code, if the endpoint answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let msg = err.to_string();
        if err.is_timeout() || timed_out(&err) {
            TransportError::Timeout(msg)
        } else if err.is_connect() {
            TransportError::Connect(msg)
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                message: msg,
            }
        } else if err.is_decode() {
            TransportError::Decode(msg)
        } else {
            TransportError::Http(msg)
        }
    }
}

/// Whether an I/O timeout sits anywhere in the error's source chain.
fn timed_out(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = err.source();
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = e.source();
    }
    false
}

/// Sluice error types
#[derive(Debug, thiserror::Error)]
pub enum SluiceError {
    // Fatal to the current dispatch
    #[error("deadline of {budget:?} exceeded while waiting for a pending call")]
    DeadlineExceeded { budget: Duration },

    #[error("invoker panicked on item {index}: {message}")]
    InvokerPanicked { index: u64, message: String },

    #[error("pending call for item {index} was cancelled outside the dispatcher")]
    TaskCancelled { index: u64 },

    /// Raised by the fail-fast policy at the position of the first failing item.
    #[error("remote call for item {index} failed: {source}")]
    Transport {
        index: u64,
        #[source]
        source: TransportError,
    },

    // Setup errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SluiceError {
    /// Position of the item this error is attached to, if any.
    pub fn index(&self) -> Option<u64> {
        match self {
            Self::InvokerPanicked { index, .. }
            | Self::TaskCancelled { index }
            | Self::Transport { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Result type alias for Sluice operations
pub type Result<T> = std::result::Result<T, SluiceError>;
