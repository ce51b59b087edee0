use std::fmt;
use std::time::Duration;

use modelbus_serialize::SerializeError;
use modelbus_transport::TransportError;

use crate::channel::Direction;

/// Errors returned by channels, RPC endpoints and the registry.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The name cannot be resolved or its endpoint cannot be opened.
    #[error("channel {name:?} unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    /// A live channel with this name already exists in the registry.
    #[error("channel {0:?} is already open")]
    AlreadyOpen(String),

    /// The channel has been closed locally.
    #[error("channel {0:?} is closed")]
    Closed(String),

    /// The peer finished sending and every message has been received.
    #[error("end of input on channel {0:?}")]
    EndOfInput(String),

    /// The operation is not allowed in the channel's direction.
    #[error("cannot {op} on {direction} channel {name:?}")]
    WrongDirection {
        name: String,
        direction: Direction,
        op: &'static str,
    },

    /// No message arrived within the requested bound.
    #[error("no message on channel {name:?} within {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// An RPC answer or response was requested with no request outstanding.
    #[error("no pending request on {0:?}")]
    NoPendingRequest(String),

    /// An RPC peer broke the request/response sequence.
    #[error("protocol violation on {name:?}: {reason}")]
    Protocol { name: String, reason: String },

    /// A message could not be encoded or decoded.
    #[error("channel {name:?}: {source}")]
    Codec {
        name: String,
        #[source]
        source: SerializeError,
    },

    /// The underlying transport failed.
    #[error("channel {name:?}: {source}")]
    Transport {
        name: String,
        #[source]
        source: TransportError,
    },

    /// The channel directory could not be loaded.
    #[error("invalid channel directory: {0}")]
    Directory(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The failure taxonomy every [`ChannelError`] projects onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ChannelUnavailable,
    ChannelClosed,
    EndOfInput,
    ArityMismatch,
    TypeMismatch,
    ParseError,
    MalformedObject,
    TransportError,
    Timeout,
    Usage,
}

impl ErrorKind {
    /// Classic signed status for this kind. Always negative.
    pub fn status_code(self) -> i32 {
        match self {
            ErrorKind::EndOfInput => -1,
            ErrorKind::ChannelUnavailable => -2,
            ErrorKind::ChannelClosed => -3,
            ErrorKind::ArityMismatch => -4,
            ErrorKind::TypeMismatch => -5,
            ErrorKind::ParseError => -6,
            ErrorKind::MalformedObject => -7,
            ErrorKind::TransportError => -8,
            ErrorKind::Timeout => -9,
            ErrorKind::Usage => -10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ChannelUnavailable => "channel_unavailable",
            ErrorKind::ChannelClosed => "channel_closed",
            ErrorKind::EndOfInput => "end_of_input",
            ErrorKind::ArityMismatch => "arity_mismatch",
            ErrorKind::TypeMismatch => "type_mismatch",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::MalformedObject => "malformed_object",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Usage => "usage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChannelError {
    /// Wrap a transport error, lifting the states every caller matches on
    /// (closed, end of input, timeout) into their own variants.
    pub fn transport(name: &str, err: TransportError) -> Self {
        match err {
            TransportError::Closed => ChannelError::Closed(name.to_string()),
            TransportError::EndOfInput => ChannelError::EndOfInput(name.to_string()),
            TransportError::Timeout(timeout) => ChannelError::Timeout {
                name: name.to_string(),
                timeout,
            },
            source => ChannelError::Transport {
                name: name.to_string(),
                source,
            },
        }
    }

    pub fn codec(name: &str, source: SerializeError) -> Self {
        ChannelError::Codec {
            name: name.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::Unavailable { .. } | ChannelError::AlreadyOpen(_) => {
                ErrorKind::ChannelUnavailable
            }
            ChannelError::Closed(_) => ErrorKind::ChannelClosed,
            ChannelError::EndOfInput(_) => ErrorKind::EndOfInput,
            ChannelError::Timeout { .. } => ErrorKind::Timeout,
            ChannelError::WrongDirection { .. }
            | ChannelError::NoPendingRequest(_)
            | ChannelError::Directory(_)
            | ChannelError::Json(_) => ErrorKind::Usage,
            ChannelError::Protocol { .. } => ErrorKind::TransportError,
            ChannelError::Codec { source, .. } => match source {
                SerializeError::ArityMismatch { .. } => ErrorKind::ArityMismatch,
                SerializeError::TypeMismatch { .. }
                | SerializeError::StringTooLong { .. }
                | SerializeError::DelimiterInString { .. }
                | SerializeError::OutOfRange { .. }
                | SerializeError::InvalidArgument { .. }
                | SerializeError::InvalidMapKey(_)
                | SerializeError::InvalidMapValue(_) => ErrorKind::TypeMismatch,
                SerializeError::Parse { .. } => ErrorKind::ParseError,
                SerializeError::MalformedObject(_) => ErrorKind::MalformedObject,
                SerializeError::InvalidFormat { .. } => ErrorKind::Usage,
            },
            ChannelError::Transport { source, .. } => match source {
                TransportError::Unavailable { .. }
                | TransportError::InvalidAddress(_)
                | TransportError::Bind { .. }
                | TransportError::Connect { .. }
                | TransportError::PathTooLong { .. } => ErrorKind::ChannelUnavailable,
                TransportError::Closed => ErrorKind::ChannelClosed,
                TransportError::EndOfInput => ErrorKind::EndOfInput,
                TransportError::Timeout(_) => ErrorKind::Timeout,
                _ => ErrorKind::TransportError,
            },
        }
    }

    /// Negative status code of this error's kind.
    pub fn status_code(&self) -> i32 {
        self.kind().status_code()
    }

    /// True when no more input will arrive, as opposed to a failure.
    pub fn is_end_of_input(&self) -> bool {
        self.kind() == ErrorKind::EndOfInput
    }
}

/// Projection of a result onto the signed status convention.
pub trait StatusExt {
    /// Zero on success, the error's negative status code on failure.
    fn status(&self) -> i32;

    /// True when the result reports end of input.
    fn is_end_of_input(&self) -> bool;
}

impl<T> StatusExt for Result<T> {
    fn status(&self) -> i32 {
        match self {
            Ok(_) => 0,
            Err(err) => err.status_code(),
        }
    }

    fn is_end_of_input(&self) -> bool {
        matches!(self, Err(err) if err.is_end_of_input())
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_negative_and_distinct() {
        let kinds = [
            ErrorKind::ChannelUnavailable,
            ErrorKind::ChannelClosed,
            ErrorKind::EndOfInput,
            ErrorKind::ArityMismatch,
            ErrorKind::TypeMismatch,
            ErrorKind::ParseError,
            ErrorKind::MalformedObject,
            ErrorKind::TransportError,
            ErrorKind::Timeout,
            ErrorKind::Usage,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(|k| k.status_code()).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn transport_states_are_lifted() {
        assert!(ChannelError::transport("in", TransportError::EndOfInput).is_end_of_input());
        assert!(matches!(
            ChannelError::transport("in", TransportError::Closed),
            ChannelError::Closed(name) if name == "in"
        ));
        assert_eq!(
            ChannelError::transport("in", TransportError::Timeout(Duration::from_millis(5)))
                .kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            ChannelError::transport("in", TransportError::Disconnected).kind(),
            ErrorKind::TransportError
        );
    }

    #[test]
    fn codec_errors_keep_their_kind() {
        let arity = ChannelError::codec(
            "out",
            SerializeError::ArityMismatch {
                expected: 3,
                actual: 2,
            },
        );
        assert_eq!(arity.kind(), ErrorKind::ArityMismatch);
        assert_eq!(
            ChannelError::codec("out", SerializeError::MalformedObject("x".into())).kind(),
            ErrorKind::MalformedObject
        );
    }

    #[test]
    fn status_projection() {
        let ok: Result<usize> = Ok(12);
        assert_eq!(ok.status(), 0);
        assert!(!ok.is_end_of_input());

        let eof: Result<usize> = Err(ChannelError::EndOfInput("in".into()));
        assert!(eof.status() < 0);
        assert!(StatusExt::is_end_of_input(&eof));
    }
}
