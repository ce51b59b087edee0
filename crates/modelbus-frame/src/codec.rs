use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::{is_known, END_OF_INPUT, MESSAGE};

/// Frame header: magic (2) + length (4) + kind (2) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "MB" (0x4D 0x42).
pub const MAGIC: [u8; 2] = [0x4D, 0x42];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One framed unit on a socket link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame kind, see [`crate::kind`].
    pub kind: u16,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// A message frame.
    pub fn message(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MESSAGE,
            payload: payload.into(),
        }
    }

    /// An end-of-input frame.
    pub fn end_of_input() -> Self {
        Self {
            kind: END_OF_INPUT,
            payload: Bytes::new(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Kind     │ Payload         │
/// │ 0x4D 0x42    │ (4B LE)   │ (2B LE)  │ (Length bytes)  │
/// │ "MB"         │           │          │                 │
/// └──────────────┴───────────┴──────────┴─────────────────┘
/// ```
pub fn encode_frame(kind: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if !is_known(kind) {
        return Err(FrameError::UnknownKind(kind));
    }
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len);
    dst.put_u16_le(kind);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let mut header = &src[2..HEADER_SIZE];
    let payload_len = header.get_u32_le() as usize;
    let kind = header.get_u16_le();

    if !is_known(kind) {
        return Err(FrameError::UnknownKind(kind));
    }
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { kind, payload }))
}

/// Configuration for framed streams.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Write timeout for blocking writes. Reads take their timeout per call.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_message() {
        let mut buf = BytesMut::new();
        let payload = b"abcdef\t42\t3.140000\n";

        encode_frame(MESSAGE, payload, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + payload.len());

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame, Frame::message(&payload[..]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x4D, 0x42, 0x00][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(MESSAGE, b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2, "partial frame stays buffered");
    }

    #[test]
    fn test_decode_invalid_magic() {
        let mut buf = BytesMut::from(&[0x49, 0x50, 0, 0, 0, 0, 0, 0][..]);
        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD),
            Err(FrameError::InvalidMagic)
        ));
    }

    #[test]
    fn test_decode_unknown_kind() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(0);
        buf.put_u16_le(9);

        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD),
            Err(FrameError::UnknownKind(9))
        ));
    }

    #[test]
    fn test_encode_unknown_kind_rejected() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_frame(42, b"x", &mut buf),
            Err(FrameError::UnknownKind(42))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(32 * 1024 * 1024);
        buf.put_u16_le(MESSAGE);

        assert!(matches!(
            decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_message_then_end_of_input() {
        let mut buf = BytesMut::new();
        encode_frame(MESSAGE, b"last", &mut buf).unwrap();
        encode_frame(END_OF_INPUT, b"", &mut buf).unwrap();

        let first = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        let second = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(first, Frame::message(&b"last"[..]));
        assert_eq!(second, Frame::end_of_input());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_message_is_a_message() {
        let mut buf = BytesMut::new();
        encode_frame(MESSAGE, b"", &mut buf).unwrap();

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.kind, MESSAGE);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_frame_wire_size() {
        assert_eq!(Frame::message(Bytes::from_static(b"test")).wire_size(), 12);
        assert_eq!(Frame::end_of_input().wire_size(), HEADER_SIZE);
    }
}
