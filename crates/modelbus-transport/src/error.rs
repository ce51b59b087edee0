use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// An address string could not be parsed.
    #[error("invalid address '{0}' (expected mem:<key>, unix:<path> or unix-listen:<path>)")]
    InvalidAddress(String),

    /// The endpoint behind an address cannot be used.
    #[error("endpoint {address} unavailable: {reason}")]
    Unavailable { address: String, reason: String },

    /// The local handle has been closed.
    #[error("transport closed")]
    Closed,

    /// The peer stopped receiving; nothing sent now can be delivered.
    #[error("peer disconnected")]
    Disconnected,

    /// The peer finished sending and every queued message has been read.
    #[error("end of input")]
    EndOfInput,

    /// No message arrived within the requested bound.
    #[error("no message within {0:?}")]
    Timeout(Duration),

    /// The message exceeds the transport's size limit.
    #[error("message too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The peer sent something this transport does not understand.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl TransportError {
    /// True when the error means "no more input will ever arrive" rather
    /// than a local or I/O failure.
    pub fn is_end_of_input(&self) -> bool {
        matches!(self, TransportError::EndOfInput)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
