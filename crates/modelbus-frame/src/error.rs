/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x4D42 \"MB\")")]
    InvalidMagic,

    /// The frame header names a kind this version does not know.
    #[error("unknown frame kind {0}")]
    UnknownKind(u16),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection was closed in the middle of a frame.
    #[error("connection closed mid-frame ({buffered} bytes buffered)")]
    Truncated { buffered: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
