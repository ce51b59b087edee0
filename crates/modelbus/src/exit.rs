use std::fmt;
use std::io;

use modelbus_comm::{ChannelError, ErrorKind};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => USAGE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::ChannelUnavailable | ErrorKind::TransportError => TRANSPORT_ERROR,
        ErrorKind::ArityMismatch
        | ErrorKind::TypeMismatch
        | ErrorKind::ParseError
        | ErrorKind::MalformedObject => DATA_INVALID,
        ErrorKind::Timeout => TIMEOUT,
        ErrorKind::Usage => USAGE,
        ErrorKind::ChannelClosed | ErrorKind::EndOfInput => FAILURE,
    }
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    CliError::new(exit_code(err.kind()), format!("{context}: {err}"))
}
