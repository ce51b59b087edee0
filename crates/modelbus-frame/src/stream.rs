use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use modelbus_transport::{CloseHandle, IpcStream, Transport, TransportError};
use tracing::{debug, trace};

use crate::codec::FrameConfig;
use crate::error::FrameError;
use crate::kind::{END_OF_INPUT, MESSAGE};
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

struct Shared {
    closed: AtomicBool,
    eof_sent: AtomicBool,
    /// Clone of the socket used only to shut it down.
    control: IpcStream,
}

impl Shared {
    fn shut(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Err(err) = self.control.shutdown() {
            debug!(error = %err, "socket shutdown failed");
        }
    }
}

/// A framed, connected socket acting as a byte-channel [`Transport`].
///
/// Each `send_bytes` becomes one MESSAGE frame; `send_eof` writes an
/// END_OF_INPUT frame. On the receiving side either that frame or a clean
/// close of the socket on a frame boundary reads as end of input.
pub struct StreamTransport {
    label: String,
    reader: FrameReader<IpcStream>,
    writer: FrameWriter<IpcStream>,
    shared: Arc<Shared>,
    read_timeout: Option<Option<Duration>>,
    write_timeout: Option<Duration>,
    peer_done: bool,
}

impl StreamTransport {
    /// Wrap a connected stream with default framing configuration.
    pub fn new(stream: IpcStream, label: impl Into<String>) -> modelbus_transport::Result<Self> {
        Self::with_config(stream, label, FrameConfig::default())
    }

    /// Wrap a connected stream with explicit framing configuration.
    pub fn with_config(
        stream: IpcStream,
        label: impl Into<String>,
        config: FrameConfig,
    ) -> modelbus_transport::Result<Self> {
        let reader_stream = stream.try_clone()?;
        let control = stream.try_clone()?;
        let write_timeout = config.write_timeout;

        let writer = FrameWriter::with_config_ipc(stream, config.clone()).map_err(frame_to_io)?;
        let reader = FrameReader::with_config(reader_stream, config);

        Ok(Self {
            label: label.into(),
            reader,
            writer,
            shared: Arc::new(Shared {
                closed: AtomicBool::new(false),
                eof_sent: AtomicBool::new(false),
                control,
            }),
            read_timeout: None,
            write_timeout,
            peer_done: false,
        })
    }

    fn closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn apply_read_timeout(&mut self, timeout: Option<Duration>) -> modelbus_transport::Result<()> {
        if self.read_timeout != Some(timeout) {
            self.reader
                .set_read_timeout(timeout)
                .map_err(frame_to_io)?;
            self.read_timeout = Some(timeout);
        }
        Ok(())
    }

    fn map_send_error(&self, err: FrameError) -> TransportError {
        if self.closed() {
            return TransportError::Closed;
        }
        match err {
            FrameError::PayloadTooLarge { size, max } => {
                TransportError::PayloadTooLarge { size, max }
            }
            FrameError::ConnectionClosed => TransportError::Disconnected,
            FrameError::Io(io) => match io.kind() {
                ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::NotConnected => {
                    TransportError::Disconnected
                }
                ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                    TransportError::Timeout(self.write_timeout.unwrap_or_default())
                }
                _ => TransportError::Io(io),
            },
            other => TransportError::Protocol(other.to_string()),
        }
    }
}

fn frame_to_io(err: FrameError) -> TransportError {
    match err {
        FrameError::Io(io) => TransportError::Io(io),
        other => TransportError::Protocol(other.to_string()),
    }
}

impl Transport for StreamTransport {
    fn send_bytes(&mut self, payload: &[u8]) -> modelbus_transport::Result<usize> {
        if self.closed() || self.shared.eof_sent.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.writer
            .send(MESSAGE, payload)
            .map_err(|err| self.map_send_error(err))?;
        trace!(label = %self.label, size = payload.len(), "sent frame");
        Ok(payload.len())
    }

    fn send_eof(&mut self) -> modelbus_transport::Result<()> {
        if self.closed() {
            return Err(TransportError::Closed);
        }
        if self.shared.eof_sent.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.writer.send(END_OF_INPUT, &[]) {
            Ok(()) => Ok(()),
            // The peer is gone; it cannot be waiting for our end of input.
            Err(err) => match self.map_send_error(err) {
                TransportError::Disconnected => Ok(()),
                other => Err(other),
            },
        }
    }

    fn recv_bytes(&mut self, timeout: Option<Duration>) -> modelbus_transport::Result<Bytes> {
        if self.closed() {
            return Err(TransportError::Closed);
        }
        if self.peer_done {
            return Err(TransportError::EndOfInput);
        }
        let read = match timeout {
            Some(limit) => {
                // The deadline read leaves the socket timeout at whatever it last set.
                self.read_timeout = None;
                self.reader.read_frame_until(Instant::now() + limit)
            }
            None => {
                self.apply_read_timeout(None)?;
                self.reader.read_frame()
            }
        };

        match read {
            Ok(frame) if frame.kind == MESSAGE => Ok(frame.payload),
            Ok(_) => {
                debug!(label = %self.label, "peer signalled end of input");
                self.peer_done = true;
                Err(TransportError::EndOfInput)
            }
            Err(_) if self.closed() => Err(TransportError::Closed),
            Err(FrameError::ConnectionClosed) => {
                debug!(label = %self.label, "peer closed the socket");
                self.peer_done = true;
                Err(TransportError::EndOfInput)
            }
            Err(FrameError::Io(io))
                if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Err(TransportError::Timeout(timeout.unwrap_or_default()))
            }
            Err(FrameError::Io(io)) if io.kind() == ErrorKind::ConnectionReset => {
                self.peer_done = true;
                Err(TransportError::Disconnected)
            }
            Err(FrameError::Io(io)) => Err(TransportError::Io(io)),
            Err(other) => Err(TransportError::Protocol(other.to_string())),
        }
    }

    fn close(&mut self) {
        if self.closed() {
            return;
        }
        if !self.shared.eof_sent.swap(true, Ordering::SeqCst) {
            if let Err(err) = self.writer.send(END_OF_INPUT, &[]) {
                debug!(label = %self.label, error = %err, "could not signal end of input");
            }
        }
        self.shared.shut();
        debug!(label = %self.label, "closed stream transport");
    }

    fn is_open(&self) -> bool {
        !self.closed()
    }

    fn close_handle(&self) -> CloseHandle {
        let shared = Arc::clone(&self.shared);
        CloseHandle::new(move || shared.shut())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("label", &self.label)
            .field("open", &self.is_open())
            .field("peer_done", &self.peer_done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::thread;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_frame;

    fn pair() -> (StreamTransport, StreamTransport) {
        let (left, right) = UnixStream::pair().unwrap();
        (
            StreamTransport::new(IpcStream::from(left), "left").unwrap(),
            StreamTransport::new(IpcStream::from(right), "right").unwrap(),
        )
    }

    #[test]
    fn messages_then_end_of_input() {
        let (mut tx, mut rx) = pair();
        tx.send_bytes(b"first").unwrap();
        tx.send_bytes(b"second").unwrap();
        tx.send_eof().unwrap();

        assert_eq!(rx.recv_bytes(None).unwrap().as_ref(), b"first");
        assert_eq!(rx.recv_bytes(None).unwrap().as_ref(), b"second");
        assert!(rx.recv_bytes(None).unwrap_err().is_end_of_input());
        assert!(rx.recv_bytes(None).unwrap_err().is_end_of_input());
    }

    #[test]
    fn empty_message_is_not_end_of_input() {
        let (mut tx, mut rx) = pair();
        tx.send_bytes(b"").unwrap();
        assert!(rx.recv_bytes(None).unwrap().is_empty());
    }

    #[test]
    fn recv_times_out_and_recovers() {
        let (mut tx, mut rx) = pair();
        let err = rx.recv_bytes(Some(Duration::from_millis(20))).unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));

        tx.send_bytes(b"late").unwrap();
        assert_eq!(rx.recv_bytes(None).unwrap().as_ref(), b"late");
    }

    #[test]
    fn trickled_frame_does_not_extend_timeout() {
        let (raw, right) = UnixStream::pair().unwrap();
        let mut rx = StreamTransport::new(IpcStream::from(right), "right").unwrap();

        let mut wire = BytesMut::new();
        encode_frame(MESSAGE, b"hello", &mut wire).unwrap();
        let writer = thread::spawn(move || {
            let mut raw = raw;
            for byte in wire.iter() {
                raw.write_all(&[*byte]).unwrap();
                thread::sleep(Duration::from_millis(50));
            }
            raw
        });

        let started = std::time::Instant::now();
        let err = rx.recv_bytes(Some(Duration::from_millis(100))).unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)), "{err}");
        assert!(started.elapsed() < Duration::from_millis(400));

        assert_eq!(rx.recv_bytes(None).unwrap().as_ref(), b"hello");
        drop(writer.join().unwrap());
    }

    #[test]
    fn drop_signals_end_of_input() {
        let (tx, mut rx) = pair();
        drop(tx);
        assert!(rx.recv_bytes(None).unwrap_err().is_end_of_input());
    }

    #[test]
    fn send_after_eof_is_closed() {
        let (mut tx, _rx) = pair();
        tx.send_eof().unwrap();
        assert!(matches!(tx.send_bytes(b"x"), Err(TransportError::Closed)));
    }

    #[test]
    fn close_handle_unblocks_receiver() {
        let (_tx, mut rx) = pair();
        let handle = rx.close_handle();

        let waiter = thread::spawn(move || rx.recv_bytes(None));
        thread::sleep(Duration::from_millis(20));
        handle.close();

        assert!(matches!(
            waiter.join().unwrap(),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn send_to_vanished_peer_is_disconnected() {
        let (mut tx, rx) = pair();
        drop(rx);

        let mut saw_disconnect = false;
        for _ in 0..16 {
            match tx.send_bytes(b"anyone?") {
                Ok(_) => thread::sleep(Duration::from_millis(5)),
                Err(TransportError::Disconnected) => {
                    saw_disconnect = true;
                    break;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(saw_disconnect);
    }

    #[test]
    fn operations_after_close_fail() {
        let (mut tx, _rx) = pair();
        tx.close();
        tx.close();
        assert!(!tx.is_open());
        assert!(matches!(tx.send_bytes(b"x"), Err(TransportError::Closed)));
        assert!(matches!(tx.recv_bytes(None), Err(TransportError::Closed)));
        assert_eq!(tx.describe(), "left");
    }
}
