use crate::value::ValueKind;

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SerializeError {
    /// The format string cannot be parsed into fields.
    #[error("invalid format {format:?}: {reason}")]
    InvalidFormat { format: String, reason: String },

    /// The number of values does not match the number of fields.
    #[error("expected {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// A value's kind disagrees with its field.
    #[error("field {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: usize,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// A string is longer than its field allows.
    #[error("field {field}: string of {len} characters exceeds width {max}")]
    StringTooLong { field: usize, len: usize, max: usize },

    /// A string contains the literal text that ends its field.
    #[error("field {field}: string contains its delimiter {delimiter:?}")]
    DelimiterInString { field: usize, delimiter: String },

    /// An integer does not fit the requested Rust type.
    #[error("field {field}: {value} does not fit in {target}")]
    OutOfRange {
        field: usize,
        value: i64,
        target: &'static str,
    },

    /// A textual argument cannot be converted to its field's kind.
    #[error("argument {field} ({value:?}) is not a valid {expected}")]
    InvalidArgument {
        field: usize,
        value: String,
        expected: ValueKind,
    },

    /// The input does not match the expected literal structure.
    #[error("parse error at byte {offset}: {reason}")]
    Parse { offset: usize, reason: String },

    /// A structured object violates its layout or index invariant.
    #[error("malformed object: {0}")]
    MalformedObject(String),

    /// A map key cannot be written as a single map line.
    #[error("invalid map key {0:?}")]
    InvalidMapKey(String),

    /// A map value cannot be written as a single map line.
    #[error("value for map key {0:?} contains a tab or newline")]
    InvalidMapValue(String),
}

impl SerializeError {
    pub(crate) fn parse(offset: usize, reason: impl Into<String>) -> Self {
        SerializeError::Parse {
            offset,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SerializeError>;
