use thiserror::Error;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Result type for NAD operations
pub type Result<T> = std::result::Result<T, NadError>;

/// Errors that can occur when talking to a NAD receiver
#[derive(Error, Debug)]
pub enum NadError {
    /// I/O error while connecting to the receiver
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client was closed and will not reconnect
    #[error("Client closed")]
    Closed,

    /// The connection is halted and auto-reconnect is disabled
    #[error("Connection halted")]
    Halted,

    /// Timed out waiting for the device to report its identity
    #[error("Timed out waiting for device")]
    Timeout,

    /// The update channel was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Update channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Configuration was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NadError {
    /// Whether the device is merely not available yet.
    ///
    /// Connect-time I/O failures and ready timeouts mean setup should be
    /// retried later rather than abandoned.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, NadError::Io(_) | NadError::Timeout)
    }
}

/// Subscriber side of the update channel: a dropped session closes it, a slow
/// subscriber loses the oldest updates.
impl From<RecvError> for NadError {
    fn from(e: RecvError) -> Self {
        match e {
            RecvError::Closed => NadError::ConnectionClosed,
            RecvError::Lagged(missed) => {
                NadError::ChannelError(format!("subscriber missed {} updates", missed))
            }
        }
    }
}

/// `Empty` is not an error for callers and is handled before conversion
impl From<TryRecvError> for NadError {
    fn from(e: TryRecvError) -> Self {
        match e {
            TryRecvError::Lagged(missed) => RecvError::Lagged(missed).into(),
            TryRecvError::Closed | TryRecvError::Empty => NadError::ConnectionClosed,
        }
    }
}
