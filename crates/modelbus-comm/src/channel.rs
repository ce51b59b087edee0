use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::BytesMut;
use modelbus_serialize::{Codec, FormatCodec, FormatSpec, FromValues, IntoValues, Value};
use modelbus_transport::{CloseHandle, Transport};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::registry::Registration;

/// Which way messages flow through a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
    Bidirectional,
}

impl Direction {
    pub fn can_send(self) -> bool {
        matches!(self, Direction::Output | Direction::Bidirectional)
    }

    pub fn can_recv(self) -> bool {
        matches!(self, Direction::Input | Direction::Bidirectional)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Input => "input",
            Direction::Output => "output",
            Direction::Bidirectional => "bidirectional",
        })
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in" | "input" => Ok(Direction::Input),
            "out" | "output" => Ok(Direction::Output),
            "both" | "bidirectional" => Ok(Direction::Bidirectional),
            other => Err(format!(
                "unknown direction '{other}' (expected input, output or bidirectional)"
            )),
        }
    }
}

/// A named, directional conduit pairing one transport with one codec.
///
/// The channel exclusively owns its transport. Dropping the channel closes
/// it, which signals end of input to the peer.
pub struct Channel<C: Codec> {
    name: String,
    direction: Direction,
    codec: C,
    transport: Box<dyn Transport>,
    recv_timeout: Option<Duration>,
    buf: BytesMut,
    registration: Option<Registration>,
}

impl<C: Codec> Channel<C> {
    /// Build a channel over an already opened transport.
    pub fn new(
        name: impl Into<String>,
        direction: Direction,
        codec: C,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            codec,
            transport,
            recv_timeout: None,
            buf: BytesMut::new(),
            registration: None,
        }
    }

    /// Apply the behavior settings of `config`.
    pub fn with_config(mut self, config: &ChannelConfig) -> Self {
        self.recv_timeout = config.recv_timeout;
        self
    }

    pub(crate) fn with_registration(mut self, registration: Registration) -> Self {
        registration.attach(self.transport.close_handle());
        self.registration = Some(registration);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Default bound for [`Channel::recv`]; `None` blocks.
    pub fn recv_timeout_default(&self) -> Option<Duration> {
        self.recv_timeout
    }

    /// Encode and send one message. Returns the number of bytes written.
    pub fn send(&mut self, message: &C::Message) -> Result<usize> {
        if !self.direction.can_send() {
            return Err(self.wrong_direction("send"));
        }
        if !self.transport.is_open() {
            return Err(ChannelError::Closed(self.name.clone()));
        }

        self.buf.clear();
        self.codec
            .encode(message, &mut self.buf)
            .map_err(|err| ChannelError::codec(&self.name, err))?;
        let written = self
            .transport
            .send_bytes(&self.buf)
            .map_err(|err| ChannelError::transport(&self.name, err))?;

        debug!(channel = %self.name, size = written, "sent message");
        Ok(written)
    }

    /// Receive one message, waiting up to the channel's default timeout.
    pub fn recv(&mut self) -> Result<C::Message> {
        self.recv_within(self.recv_timeout)
    }

    /// Receive one message, waiting at most `timeout`.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<C::Message> {
        self.recv_within(Some(timeout))
    }

    pub(crate) fn recv_within(&mut self, timeout: Option<Duration>) -> Result<C::Message> {
        if !self.direction.can_recv() {
            return Err(self.wrong_direction("receive"));
        }

        let bytes = self
            .transport
            .recv_bytes(timeout)
            .map_err(|err| ChannelError::transport(&self.name, err))?;
        debug!(channel = %self.name, size = bytes.len(), "received message");

        self.codec
            .decode(&bytes)
            .map_err(|err| ChannelError::codec(&self.name, err))
    }

    /// Iterate over received messages until end of input.
    ///
    /// Any other failure is yielded once and ends the iteration.
    pub fn incoming(&mut self) -> Incoming<'_, C> {
        Incoming {
            channel: self,
            done: false,
        }
    }

    /// Tell the peer no more messages will follow.
    pub fn send_eof(&mut self) -> Result<()> {
        if !self.direction.can_send() {
            return Err(self.wrong_direction("send end of input"));
        }
        self.transport
            .send_eof()
            .map_err(|err| ChannelError::transport(&self.name, err))
    }

    /// Close the channel. Idempotent.
    pub fn close(&mut self) {
        if self.transport.is_open() {
            self.transport.close();
            info!(channel = %self.name, "closed channel");
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// A handle that closes this channel from another thread, waking a
    /// blocked receiver.
    pub fn close_handle(&self) -> CloseHandle {
        self.transport.close_handle()
    }

    /// Transport endpoint description.
    pub fn describe(&self) -> String {
        format!(
            "{} [{}, {}, {}]",
            self.name,
            self.direction,
            self.codec.describe(),
            self.transport.describe()
        )
    }

    fn wrong_direction(&self, op: &'static str) -> ChannelError {
        ChannelError::WrongDirection {
            name: self.name.clone(),
            direction: self.direction,
            op,
        }
    }
}

impl Channel<FormatCodec> {
    pub fn format(&self) -> &FormatSpec {
        self.codec.spec()
    }

    /// Send a tuple (or `Vec<Value>`) as one message.
    pub fn send_tuple(&mut self, values: impl IntoValues) -> Result<usize> {
        let values: Vec<Value> = values.into_values();
        self.send(&values)
    }

    /// Receive one message as a typed tuple.
    pub fn recv_tuple<T: FromValues>(&mut self) -> Result<T> {
        let values = self.recv()?;
        T::from_values(values).map_err(|err| ChannelError::codec(&self.name, err))
    }
}

impl<C: Codec> Drop for Channel<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: Codec> fmt::Debug for Channel<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("codec", &self.codec.describe())
            .field("transport", &self.transport.describe())
            .field("open", &self.is_open())
            .finish()
    }
}

/// Iterator returned by [`Channel::incoming`].
pub struct Incoming<'a, C: Codec> {
    channel: &'a mut Channel<C>,
    done: bool,
}

impl<C: Codec> Iterator for Incoming<'_, C> {
    type Item = Result<C::Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.channel.recv() {
            Ok(message) => Some(Ok(message)),
            Err(err) if err.is_end_of_input() => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
