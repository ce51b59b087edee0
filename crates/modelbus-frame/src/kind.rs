//! Frame kinds.

/// A model message; the payload is the encoded message.
pub const MESSAGE: u16 = 0;

/// The sender will send no more messages. Empty payload.
pub const END_OF_INPUT: u16 = 1;

/// Returns a human-readable name for a frame kind.
pub fn kind_name(kind: u16) -> &'static str {
    match kind {
        MESSAGE => "MESSAGE",
        END_OF_INPUT => "END_OF_INPUT",
        _ => "UNKNOWN",
    }
}

/// Returns true if the kind is understood by this version.
pub fn is_known(kind: u16) -> bool {
    matches!(kind, MESSAGE | END_OF_INPUT)
}
