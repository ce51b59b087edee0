use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// A byte-message transport owned by exactly one channel.
///
/// Messages are delimited: one `send_bytes` call is delivered as one
/// `recv_bytes` result, in order. An empty message is a legitimate message
/// and is distinct from [`TransportError::EndOfInput`](crate::TransportError::EndOfInput).
pub trait Transport: Send {
    /// Send one message. Returns the number of payload bytes accepted.
    fn send_bytes(&mut self, payload: &[u8]) -> Result<usize>;

    /// Tell the peer that no further messages will be sent.
    ///
    /// Messages already sent are still delivered before the peer observes
    /// end of input. Sending after this fails with `Closed`.
    fn send_eof(&mut self) -> Result<()>;

    /// Receive the next message, blocking up to `timeout` (forever if `None`).
    fn recv_bytes(&mut self, timeout: Option<Duration>) -> Result<Bytes>;

    /// Close the transport. Idempotent. Signals end of input to the peer
    /// first if it has not been signalled yet.
    fn close(&mut self);

    /// Whether the local handle is still open.
    fn is_open(&self) -> bool;

    /// A handle that can close this transport from another thread.
    fn close_handle(&self) -> CloseHandle;

    /// Human-readable endpoint description for diagnostics.
    fn describe(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_bytes(&mut self, payload: &[u8]) -> Result<usize> {
        (**self).send_bytes(payload)
    }

    fn send_eof(&mut self) -> Result<()> {
        (**self).send_eof()
    }

    fn recv_bytes(&mut self, timeout: Option<Duration>) -> Result<Bytes> {
        (**self).recv_bytes(timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close_handle(&self) -> CloseHandle {
        (**self).close_handle()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Cross-thread cancellation for a transport.
///
/// Closing through the handle makes any `recv_bytes` blocked on the
/// transport return `Closed` promptly, and fails subsequent operations.
#[derive(Clone)]
pub struct CloseHandle {
    close: Arc<dyn Fn() + Send + Sync>,
}

impl CloseHandle {
    /// Wrap a close action. The action must be idempotent.
    pub fn new(close: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            close: Arc::new(close),
        }
    }

    /// Close the transport this handle belongs to.
    pub fn close(&self) {
        (self.close)()
    }
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseHandle").finish_non_exhaustive()
    }
}
