use std::io::{self, ErrorKind, Read};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use modelbus_transport::IpcStream;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Partial reads are buffered internally; a read that times out half way
/// through a frame keeps the bytes already received, so the next call picks
/// up where this one stopped.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `ConnectionClosed` at end of stream on a frame boundary and
    /// `Truncated` if the stream ends inside a frame.
    pub fn read_frame(&mut self) -> Result<Frame> {
        self.read_frame_with(|_| Ok(()))
    }

    /// Like [`read_frame`](Self::read_frame), running `before_read` ahead
    /// of every read on the underlying stream.
    fn read_frame_with(&mut self, mut before_read: impl FnMut(&T) -> Result<()>) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                return Ok(frame);
            }

            before_read(&self.inner)?;
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(if self.buf.is_empty() {
                    FrameError::ConnectionClosed
                } else {
                    FrameError::Truncated {
                        buffered: self.buf.len(),
                    }
                });
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl FrameReader<IpcStream> {
    /// Bound the next reads; `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner
            .set_read_timeout(timeout)
            .map_err(crate::writer::transport_to_frame_error)
    }

    /// Read the next complete frame, giving up at `deadline` even when the
    /// peer keeps delivering a frame in small pieces.
    ///
    /// Fails with a `TimedOut` I/O error once the deadline passes; bytes
    /// already received stay buffered.
    pub fn read_frame_until(&mut self, deadline: Instant) -> Result<Frame> {
        self.read_frame_with(|stream| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(FrameError::Io(io::Error::new(
                    ErrorKind::TimedOut,
                    "frame read deadline elapsed",
                )));
            }
            stream
                .set_read_timeout(Some(remaining))
                .map_err(crate::writer::transport_to_frame_error)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{encode_frame, MAGIC};
    use crate::kind::{END_OF_INPUT, MESSAGE};

    fn wire(frames: &[(u16, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (kind, payload) in frames {
            encode_frame(*kind, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_messages_in_order() {
        let bytes = wire(&[
            (MESSAGE, &b"one"[..]),
            (MESSAGE, &b"two"[..]),
            (END_OF_INPUT, &b""[..]),
        ]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"one");
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"two");
        assert_eq!(reader.read_frame().unwrap().kind, END_OF_INPUT);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn read_frame_with_large_payload() {
        let payload = vec![0xAB; 64 * 1024];
        let bytes = wire(&[(MESSAGE, payload.as_slice())]);

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[(MESSAGE, &b"slow"[..])]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(16);
        partial.put_u16_le(MESSAGE);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Truncated { buffered: 17 }));
    }

    #[test]
    fn invalid_magic_in_stream() {
        let bytes = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::InvalidMagic)
        ));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut bytes = BytesMut::new();
        bytes.put_slice(&MAGIC);
        bytes.put_u32_le(1024);
        bytes.put_u16_le(MESSAGE);

        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(bytes.to_vec()), cfg);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::PayloadTooLarge { size: 1024, max: 16 })
        ));
    }

    #[test]
    fn timeout_keeps_partial_frame() {
        let bytes = wire(&[(MESSAGE, &b"resume"[..])]);
        let reader = StallingReader {
            bytes,
            pos: 0,
            stall_at: 5,
            stalled: false,
        };
        let mut framed = FrameReader::new(reader);

        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
        assert_eq!(framed.buffered(), 5);

        let frame = framed.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), b"resume");
        assert_eq!(framed.buffered(), 0);
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(&[(MESSAGE, &b"ok"[..])])),
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.read_frame().unwrap().payload.as_ref(), b"ok");
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.send(MESSAGE, b"ping").unwrap();
        writer.send(END_OF_INPUT, b"").unwrap();

        assert_eq!(reader.read_frame().unwrap(), Frame::message(&b"ping"[..]));
        assert_eq!(reader.read_frame().unwrap(), Frame::end_of_input());
    }

    #[test]
    fn ipc_stream_read_timeout_applies() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut reader = FrameReader::new(IpcStream::from(left));
        reader
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();

        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Io(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
        ));
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    /// Delivers `stall_at` bytes, reports `WouldBlock` once, then the rest.
    struct StallingReader {
        bytes: Vec<u8>,
        pos: usize,
        stall_at: usize,
        stalled: bool,
    }

    impl Read for StallingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos == self.stall_at && !self.stalled {
                self.stalled = true;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            let end = if self.stalled {
                self.bytes.len()
            } else {
                self.stall_at
            };
            let n = (end - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
