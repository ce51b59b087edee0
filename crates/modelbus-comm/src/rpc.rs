//! Request/response endpoints over a pair of format channels.
//!
//! A client owns a request channel (output) and a response channel (input);
//! the server owns the mirrored pair. Every request carries a `u64`
//! sequence number, written as 8 little-endian bytes ahead of the encoded
//! body, and the server echoes it on the matching response. This lets a
//! client that gave up on a call (timeout) recognize and drop the late
//! answer instead of mistaking it for the answer to its next call.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use bytes::{Buf, BufMut, BytesMut};
use modelbus_serialize::{
    Codec, FormatCodec, FormatSpec, FromValues, IntoValues, SerializeError, Value,
};
use modelbus_transport::CloseHandle;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::error::{ChannelError, Result};
use crate::registry::Registration;

const SEQUENCE_LEN: usize = 8;

/// Codec adapter prefixing every message with a sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequenced<C> {
    inner: C,
}

impl<C: Codec> Sequenced<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Codec> Codec for Sequenced<C> {
    type Message = (u64, C::Message);

    fn encode(
        &self,
        (sequence, message): &Self::Message,
        dst: &mut BytesMut,
    ) -> modelbus_serialize::Result<()> {
        let start = dst.len();
        dst.put_u64_le(*sequence);
        if let Err(err) = self.inner.encode(message, dst) {
            dst.truncate(start);
            return Err(err);
        }
        Ok(())
    }

    fn decode(&self, src: &[u8]) -> modelbus_serialize::Result<Self::Message> {
        if src.len() < SEQUENCE_LEN {
            return Err(SerializeError::Parse {
                offset: 0,
                reason: format!(
                    "message of {} bytes is too short for a sequence number",
                    src.len()
                ),
            });
        }
        let mut header = &src[..SEQUENCE_LEN];
        let sequence = header.get_u64_le();
        let message = self.inner.decode(&src[SEQUENCE_LEN..])?;
        Ok((sequence, message))
    }

    fn describe(&self) -> String {
        format!("sequenced {}", self.inner.describe())
    }
}

type RpcChannel = Channel<Sequenced<FormatCodec>>;

/// Where an [`RpcClient`] is in its call cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    AwaitingResponse,
}

/// Where an [`RpcServer`] is in its serve cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    AwaitingRequest,
    Processing,
}

/// The calling side of an RPC endpoint.
pub struct RpcClient {
    name: String,
    requests: RpcChannel,
    responses: RpcChannel,
    next_sequence: u64,
    awaiting: Option<u64>,
    registration: Option<Registration>,
}

impl RpcClient {
    /// Build a client from an output request channel and an input response
    /// channel.
    pub fn new(name: impl Into<String>, requests: RpcChannel, responses: RpcChannel) -> Self {
        Self {
            name: name.into(),
            requests,
            responses,
            next_sequence: 0,
            awaiting: None,
            registration: None,
        }
    }

    pub(crate) fn with_registration(mut self, registration: Registration) -> Self {
        self.registration = Some(registration);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ClientState {
        match self.awaiting {
            Some(_) => ClientState::AwaitingResponse,
            None => ClientState::Idle,
        }
    }

    pub fn request_format(&self) -> &FormatSpec {
        self.requests.codec().inner().spec()
    }

    pub fn response_format(&self) -> &FormatSpec {
        self.responses.codec().inner().spec()
    }

    /// Send `request` and wait for its response.
    ///
    /// Waits up to the response channel's default timeout.
    pub fn call(&mut self, request: &[Value]) -> Result<Vec<Value>> {
        self.send_request(request)?;
        self.recv_response(self.responses.recv_timeout_default())
    }

    /// Like [`RpcClient::call`], waiting at most `timeout` for the response.
    ///
    /// After a timeout the client may call again; the late response to the
    /// abandoned request is discarded when it arrives.
    pub fn call_timeout(&mut self, request: &[Value], timeout: Duration) -> Result<Vec<Value>> {
        self.send_request(request)?;
        self.recv_response(Some(timeout))
    }

    /// Typed form of [`RpcClient::call`].
    pub fn call_tuple<R: FromValues>(&mut self, request: impl IntoValues) -> Result<R> {
        let values = request.into_values();
        let response = self.call(&values)?;
        R::from_values(response).map_err(|err| ChannelError::codec(&self.name, err))
    }

    /// Send a request without waiting. Returns its sequence number.
    pub fn send_request(&mut self, request: &[Value]) -> Result<u64> {
        let sequence = self.next_sequence;
        self.requests.send(&(sequence, request.to_vec()))?;
        self.next_sequence += 1;
        if let Some(abandoned) = self.awaiting.replace(sequence) {
            debug!(endpoint = %self.name, abandoned, "request superseded before its response");
        }
        debug!(endpoint = %self.name, sequence, "sent request");
        Ok(sequence)
    }

    /// Wait for the response to the last request sent.
    ///
    /// `None` blocks until the response, end of input, or closure.
    pub fn recv_response(&mut self, timeout: Option<Duration>) -> Result<Vec<Value>> {
        let expected = self
            .awaiting
            .ok_or_else(|| ChannelError::NoPendingRequest(self.name.clone()))?;
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let (sequence, response) = self
                .responses
                .recv_within(remaining)
                .map_err(|err| restate_timeout(err, timeout))?;

            if sequence < expected {
                debug!(
                    endpoint = %self.name,
                    sequence,
                    expected,
                    "discarding stale response"
                );
                continue;
            }
            if sequence > expected {
                return Err(ChannelError::Protocol {
                    name: self.name.clone(),
                    reason: format!("response {sequence} arrived while awaiting {expected}"),
                });
            }

            self.awaiting = None;
            return Ok(response);
        }
    }

    /// A handle closing both channels of this client.
    pub fn close_handle(&self) -> CloseHandle {
        pair_close_handle(&self.requests, &self.responses)
    }

    /// Close both channels and release the endpoint name.
    pub fn close(&mut self) {
        self.requests.close();
        self.responses.close();
        self.awaiting = None;
        if self.registration.take().is_some() {
            info!(endpoint = %self.name, "closed rpc client");
        }
    }
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("next_sequence", &self.next_sequence)
            .finish()
    }
}

/// The serving side of an RPC endpoint.
pub struct RpcServer {
    name: String,
    requests: RpcChannel,
    responses: RpcChannel,
    pending: VecDeque<u64>,
    receiving: bool,
    registration: Option<Registration>,
}

impl RpcServer {
    /// Build a server from an input request channel and an output response
    /// channel.
    pub fn new(name: impl Into<String>, requests: RpcChannel, responses: RpcChannel) -> Self {
        Self {
            name: name.into(),
            requests,
            responses,
            pending: VecDeque::new(),
            receiving: false,
            registration: None,
        }
    }

    pub(crate) fn with_registration(mut self, registration: Registration) -> Self {
        self.registration = Some(registration);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ServerState {
        if self.receiving {
            ServerState::AwaitingRequest
        } else if self.pending.is_empty() {
            ServerState::Idle
        } else {
            ServerState::Processing
        }
    }

    pub fn request_format(&self) -> &FormatSpec {
        self.requests.codec().inner().spec()
    }

    pub fn response_format(&self) -> &FormatSpec {
        self.responses.codec().inner().spec()
    }

    /// Requests received but not yet answered.
    pub fn pending_request_count(&self) -> usize {
        self.pending.len()
    }

    /// Receive the next request. `None` uses the channel's default timeout.
    pub fn recv(&mut self, timeout: Option<Duration>) -> Result<Vec<Value>> {
        let timeout = timeout.or(self.requests.recv_timeout_default());
        self.receiving = true;
        let received = self.requests.recv_within(timeout);
        self.receiving = false;

        let (sequence, request) = received?;
        self.pending.push_back(sequence);
        debug!(endpoint = %self.name, sequence, pending = self.pending.len(), "received request");
        Ok(request)
    }

    /// Typed form of [`RpcServer::recv`].
    pub fn recv_tuple<T: FromValues>(&mut self, timeout: Option<Duration>) -> Result<T> {
        let request = self.recv(timeout)?;
        T::from_values(request).map_err(|err| ChannelError::codec(&self.name, err))
    }

    /// Answer the oldest pending request.
    pub fn send(&mut self, response: &[Value]) -> Result<usize> {
        let sequence = *self
            .pending
            .front()
            .ok_or_else(|| ChannelError::NoPendingRequest(self.name.clone()))?;
        let written = self.responses.send(&(sequence, response.to_vec()))?;
        self.pending.pop_front();
        debug!(endpoint = %self.name, sequence, "sent response");
        Ok(written)
    }

    /// Typed form of [`RpcServer::send`].
    pub fn send_tuple(&mut self, response: impl IntoValues) -> Result<usize> {
        let values = response.into_values();
        self.send(&values)
    }

    /// Answer requests with `handler` until every client is gone.
    ///
    /// Returns the number of requests served. Any failure other than end of
    /// input stops serving and is returned.
    pub fn serve<F>(&mut self, mut handler: F) -> Result<u64>
    where
        F: FnMut(Vec<Value>) -> Vec<Value>,
    {
        let mut served = 0u64;
        loop {
            let request = match self.recv(None) {
                Ok(request) => request,
                Err(err) if err.is_end_of_input() => {
                    info!(endpoint = %self.name, served, "request stream ended");
                    return Ok(served);
                }
                Err(err) => return Err(err),
            };
            let response = handler(request);
            self.send(&response)?;
            served += 1;
        }
    }

    /// A handle closing both channels of this server.
    pub fn close_handle(&self) -> CloseHandle {
        pair_close_handle(&self.requests, &self.responses)
    }

    /// Close both channels and release the endpoint name.
    pub fn close(&mut self) {
        self.requests.close();
        self.responses.close();
        self.pending.clear();
        if self.registration.take().is_some() {
            info!(endpoint = %self.name, "closed rpc server");
        }
    }
}

impl fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcServer")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn pair_close_handle(first: &RpcChannel, second: &RpcChannel) -> CloseHandle {
    let first = first.close_handle();
    let second = second.close_handle();
    CloseHandle::new(move || {
        first.close();
        second.close();
    })
}

fn restate_timeout(err: ChannelError, timeout: Option<Duration>) -> ChannelError {
    match (err, timeout) {
        (ChannelError::Timeout { name, .. }, Some(timeout)) => {
            ChannelError::Timeout { name, timeout }
        }
        (err, _) => err,
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use modelbus_transport::Address;

    use super::*;
    use crate::channel::Direction;
    use crate::directory::ChannelDirectory;
    use crate::error::ErrorKind;
    use crate::registry::Registry;

    fn fib(n: i64) -> i64 {
        let (mut result, mut prev, mut prevprev) = (1, 1, 0);
        let mut idx = 1;
        while idx < n {
            result = prev + prevprev;
            prevprev = prev;
            prev = result;
            idx += 1;
        }
        result
    }

    fn fib_handler(request: Vec<Value>) -> Vec<Value> {
        let n = request[0].as_int().unwrap_or_default();
        vec![Value::Int(n), Value::Int(fib(n))]
    }

    fn memory_registry() -> Registry {
        Registry::new(
            ChannelDirectory::new()
                .with("fib_client", Address::memory("fib"))
                .with("fib_server", Address::memory("fib")),
        )
    }

    #[test]
    fn fib_matches_reference_values() {
        let values: Vec<i64> = (1..=8).map(fib).collect();
        assert_eq!(values, vec![1, 1, 2, 3, 5, 8, 13, 21]);
    }

    #[test]
    fn sequenced_codec_prefix() {
        let codec = Sequenced::new(FormatCodec::parse("%d\n").unwrap());
        let mut buf = BytesMut::new();
        codec.encode(&(7, vec![Value::Int(5)]), &mut buf).unwrap();
        assert_eq!(&buf[..8], &7u64.to_le_bytes());
        assert_eq!(&buf[8..], b"5\n");
        assert_eq!(codec.decode(&buf).unwrap(), (7, vec![Value::Int(5)]));

        let err = codec.decode(&buf[..3]).unwrap_err();
        assert!(matches!(err, SerializeError::Parse { .. }));
    }

    #[test]
    fn sequenced_encode_failure_appends_nothing() {
        let codec = Sequenced::new(FormatCodec::parse("%d\n").unwrap());
        let mut buf = BytesMut::from(&b"keep"[..]);
        assert!(codec.encode(&(1, vec![Value::from("x")]), &mut buf).is_err());
        assert_eq!(&buf[..], b"keep");
    }

    #[test]
    fn fib_call_over_memory() {
        let registry = memory_registry();
        let mut server = registry.open_rpc_server("fib_server", "%d\n", "%d %d\n").unwrap();
        let mut client = registry.open_rpc_client("fib_client", "%d\n", "%d %d\n").unwrap();

        let worker = thread::spawn(move || server.serve(fib_handler));

        let (input, output): (i64, i64) = client.call_tuple((5i64,)).unwrap();
        assert_eq!((input, output), (5, 5));
        assert_eq!(client.state(), ClientState::Idle);

        drop(client);
        assert_eq!(worker.join().unwrap().unwrap(), 1);
    }

    #[test]
    fn queued_requests_are_answered_in_order() {
        let registry = memory_registry();
        let mut server = registry.open_rpc_server("fib_server", "%d\n", "%d %d\n").unwrap();
        let mut client = registry.open_rpc_client("fib_client", "%d\n", "%d %d\n").unwrap();

        for n in [3i64, 6, 10] {
            client.send_request(&[Value::Int(n)]).unwrap();
        }

        let mut received = Vec::new();
        for _ in 0..3 {
            let (n,): (i64,) = server.recv_tuple(None).unwrap();
            received.push(n);
        }
        assert_eq!(received, vec![3, 6, 10]);
        assert_eq!(server.pending_request_count(), 3);
        assert_eq!(server.state(), ServerState::Processing);

        for n in received {
            server.send_tuple((n, fib(n))).unwrap();
        }
        assert_eq!(server.state(), ServerState::Idle);

        // Only the last request is awaited; earlier answers are dropped.
        assert_eq!(
            client.recv_response(None).unwrap(),
            vec![Value::Int(10), Value::Int(55)]
        );
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[test]
    fn stale_response_is_discarded() {
        let registry = memory_registry();
        let mut server = registry.open_rpc_server("fib_server", "%d\n", "%d %d\n").unwrap();
        let mut client = registry.open_rpc_client("fib_client", "%d\n", "%d %d\n").unwrap();

        let err = client
            .call_timeout(&[Value::Int(4)], Duration::from_millis(20))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(client.state(), ClientState::AwaitingResponse);

        // The server answers the abandoned request late, then the new one.
        let worker = thread::spawn(move || server.serve(fib_handler));

        let response = client.call(&[Value::Int(7)]).unwrap();
        assert_eq!(response, vec![Value::Int(7), Value::Int(13)]);

        drop(client);
        assert_eq!(worker.join().unwrap().unwrap(), 2);
    }

    #[test]
    fn server_send_without_request() {
        let registry = memory_registry();
        let mut server = registry.open_rpc_server("fib_server", "%d\n", "%d %d\n").unwrap();
        let err = server.send(&[Value::Int(1), Value::Int(1)]).unwrap_err();
        assert!(matches!(err, ChannelError::NoPendingRequest(_)));
        assert_eq!(server.pending_request_count(), 0);
    }

    #[test]
    fn client_response_without_request() {
        let registry = memory_registry();
        let mut client = registry.open_rpc_client("fib_client", "%d\n", "%d %d\n").unwrap();
        assert!(matches!(
            client.recv_response(None),
            Err(ChannelError::NoPendingRequest(_))
        ));
    }

    #[test]
    fn bad_response_arity_keeps_request_pending() {
        let registry = memory_registry();
        let mut server = registry.open_rpc_server("fib_server", "%d\n", "%d %d\n").unwrap();
        let mut client = registry.open_rpc_client("fib_client", "%d\n", "%d %d\n").unwrap();

        client.send_request(&[Value::Int(2)]).unwrap();
        server.recv(None).unwrap();

        let err = server.send(&[Value::Int(2)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArityMismatch);
        assert_eq!(server.pending_request_count(), 1);

        server.send(&[Value::Int(2), Value::Int(1)]).unwrap();
        assert_eq!(
            client.recv_response(None).unwrap(),
            vec![Value::Int(2), Value::Int(1)]
        );
    }

    #[test]
    fn endpoint_formats_are_validated_first() {
        let registry = memory_registry();
        let err = registry
            .open_rpc_client("fib_client", "%d\n", "%k\n")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(!registry.is_live("fib_client"));
    }

    #[test]
    fn endpoint_name_is_exclusive() {
        let registry = memory_registry();
        let _client = registry.open_rpc_client("fib_client", "%d\n", "%d %d\n").unwrap();
        let err = registry
            .open_format_channel("fib_client", "%d\n", Direction::Output)
            .unwrap_err();
        assert!(matches!(err, ChannelError::AlreadyOpen(_)));
    }

    #[test]
    fn shutdown_unblocks_serving_thread() {
        let registry = memory_registry();
        let mut server = registry.open_rpc_server("fib_server", "%d\n", "%d %d\n").unwrap();
        let worker = thread::spawn(move || server.serve(fib_handler));
        thread::sleep(Duration::from_millis(20));

        assert_eq!(registry.shutdown(), 1);
        let err = worker.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChannelClosed);
    }

    #[cfg(unix)]
    #[test]
    fn fib_call_over_unix_sockets() {
        let dir = std::env::temp_dir().join(format!("mbc-rpc-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let socket = dir.join("fib.sock");

        let server_directory =
            ChannelDirectory::new().with("fib_server", Address::unix_listen(&socket));
        let client_directory = ChannelDirectory::new().with("fib_client", Address::unix(&socket));
        let config = crate::config::ChannelConfig::default()
            .with_connect_timeout(Duration::from_secs(5));

        let server_config = config.clone();
        let worker = thread::spawn(move || {
            let registry = Registry::with_config(server_directory, server_config);
            let mut server = registry
                .open_rpc_server("fib_server", "%d\n", "%d %d\n")
                .unwrap();
            server.serve(fib_handler)
        });

        let registry = Registry::with_config(client_directory, config);
        let mut client = registry
            .open_rpc_client("fib_client", "%d\n", "%d %d\n")
            .unwrap();
        for n in 1..=6i64 {
            let (input, output): (i64, i64) = client.call_tuple((n,)).unwrap();
            assert_eq!((input, output), (n, fib(n)));
        }
        client.close();
        assert!(!registry.is_live("fib_client"));

        assert_eq!(worker.join().unwrap().unwrap(), 6);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
