//! In-process memory links.
//!
//! A link is a pair of FIFO queues identified by a key. Each link has two
//! sides; side A sends on the first queue and receives on the second, side
//! B the other way round. Every side can be claimed once, which gives each
//! transport exactly one owner.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::transport::{CloseHandle, Transport};

/// One end of a memory link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Conventionally the sending side of a one-way link.
    A,
    /// Conventionally the receiving side of a one-way link.
    B,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Free,
    Held,
    Released,
}

#[derive(Default)]
struct QueueState {
    messages: VecDeque<Bytes>,
    writer_done: bool,
    reader_closed: bool,
}

#[derive(Default)]
struct Queue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl Queue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_writing(&self) {
        self.lock().writer_done = true;
        self.ready.notify_all();
    }

    fn close_reader(&self) {
        let mut state = self.lock();
        state.reader_closed = true;
        state.messages.clear();
        drop(state);
        self.ready.notify_all();
    }
}

struct Link {
    /// `queues[0]` carries A→B, `queues[1]` carries B→A.
    queues: [Arc<Queue>; 2],
    claims: [Claim; 2],
}

impl Link {
    fn new() -> Self {
        Self {
            queues: [Arc::new(Queue::default()), Arc::new(Queue::default())],
            claims: [Claim::Free, Claim::Free],
        }
    }
}

/// Registry of in-process links shared by every model in the process.
///
/// Cloning the hub shares the same links. A link is created on first
/// claim and removed once both of its sides have been claimed and
/// released. Messages sent before the peer side is claimed are kept.
#[derive(Clone, Default)]
pub struct MemoryHub {
    links: Arc<Mutex<HashMap<String, Link>>>,
}

impl MemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Link>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim one side of link `key`.
    pub fn claim(&self, key: &str, side: Side) -> Result<MemoryEndpoint> {
        let mut links = self.lock();
        let link = links.entry(key.to_string()).or_insert_with(Link::new);
        match link.claims[side.index()] {
            Claim::Free => {}
            Claim::Held => {
                return Err(unavailable(key, format!("side {side:?} is already in use")));
            }
            Claim::Released => {
                return Err(unavailable(
                    key,
                    format!("side {side:?} was closed and its peer is still attached"),
                ));
            }
        }
        link.claims[side.index()] = Claim::Held;

        let (outbound, inbound) = match side {
            Side::A => (&link.queues[0], &link.queues[1]),
            Side::B => (&link.queues[1], &link.queues[0]),
        };
        debug!(key, ?side, "claimed memory link");

        Ok(MemoryEndpoint {
            key: key.to_string(),
            side,
            outbound: Arc::clone(outbound),
            inbound: Arc::clone(inbound),
            state: Arc::new(EndpointState::default()),
            hub: self.clone(),
        })
    }

    /// Claim whichever side of link `key` is still free, A first.
    pub fn claim_any(&self, key: &str) -> Result<MemoryEndpoint> {
        let free = self
            .lock()
            .get(key)
            .map(|link| {
                [Side::A, Side::B]
                    .into_iter()
                    .find(|side| link.claims[side.index()] == Claim::Free)
            })
            .unwrap_or(Some(Side::A));

        match free {
            Some(side) => self.claim(key, side),
            None => Err(unavailable(key, "both sides are in use".to_string())),
        }
    }

    /// Number of live links.
    pub fn link_count(&self) -> usize {
        self.lock().len()
    }

    /// Messages queued on link `key` waiting to be received by `side`.
    pub fn queued(&self, key: &str, side: Side) -> usize {
        self.lock()
            .get(key)
            .map(|link| {
                let toward = match side {
                    Side::A => &link.queues[1],
                    Side::B => &link.queues[0],
                };
                toward.lock().messages.len()
            })
            .unwrap_or(0)
    }

    fn release(&self, key: &str, side: Side) {
        let mut links = self.lock();
        let Some(link) = links.get_mut(key) else {
            return;
        };
        link.claims[side.index()] = Claim::Released;
        if link.claims.iter().all(|claim| *claim == Claim::Released) {
            links.remove(key);
            debug!(key, "removed memory link");
        }
    }
}

impl std::fmt::Debug for MemoryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHub")
            .field("links", &self.link_count())
            .finish()
    }
}

fn unavailable(key: &str, reason: String) -> TransportError {
    TransportError::Unavailable {
        address: format!("mem:{key}"),
        reason,
    }
}

#[derive(Default)]
struct EndpointState {
    closed: AtomicBool,
    eof_sent: AtomicBool,
}

/// A claimed side of a memory link.
pub struct MemoryEndpoint {
    key: String,
    side: Side,
    outbound: Arc<Queue>,
    inbound: Arc<Queue>,
    state: Arc<EndpointState>,
    hub: MemoryHub,
}

impl MemoryEndpoint {
    /// The link key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The claimed side.
    pub fn side(&self) -> Side {
        self.side
    }
}

fn shut(state: &EndpointState, outbound: &Queue, inbound: &Queue) {
    if state.closed.swap(true, Ordering::SeqCst) {
        return;
    }
    state.eof_sent.store(true, Ordering::SeqCst);
    outbound.finish_writing();
    inbound.close_reader();
}

impl Transport for MemoryEndpoint {
    fn send_bytes(&mut self, payload: &[u8]) -> Result<usize> {
        if self.state.closed.load(Ordering::SeqCst) || self.state.eof_sent.load(Ordering::SeqCst)
        {
            return Err(TransportError::Closed);
        }

        let mut queue = self.outbound.lock();
        if queue.reader_closed {
            return Err(TransportError::Disconnected);
        }
        queue.messages.push_back(Bytes::copy_from_slice(payload));
        drop(queue);
        self.outbound.ready.notify_one();

        debug!(key = %self.key, side = ?self.side, size = payload.len(), "queued message");
        Ok(payload.len())
    }

    fn send_eof(&mut self) -> Result<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if !self.state.eof_sent.swap(true, Ordering::SeqCst) {
            self.outbound.finish_writing();
        }
        Ok(())
    }

    fn recv_bytes(&mut self, timeout: Option<Duration>) -> Result<Bytes> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut queue = self.inbound.lock();

        loop {
            if queue.reader_closed || self.state.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            if let Some(message) = queue.messages.pop_front() {
                return Ok(message);
            }
            if queue.writer_done {
                return Err(TransportError::EndOfInput);
            }

            queue = match deadline {
                None => self
                    .inbound
                    .ready
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TransportError::Timeout(timeout.unwrap_or_default()));
                    }
                    self.inbound
                        .ready
                        .wait_timeout(queue, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn close(&mut self) {
        shut(&self.state, &self.outbound, &self.inbound);
    }

    fn is_open(&self) -> bool {
        !self.state.closed.load(Ordering::SeqCst)
    }

    fn close_handle(&self) -> CloseHandle {
        let state = Arc::clone(&self.state);
        let outbound = Arc::clone(&self.outbound);
        let inbound = Arc::clone(&self.inbound);
        CloseHandle::new(move || shut(&state, &outbound, &inbound))
    }

    fn describe(&self) -> String {
        format!("mem:{} ({:?})", self.key, self.side)
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        shut(&self.state, &self.outbound, &self.inbound);
        self.hub.release(&self.key, self.side);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let hub = MemoryHub::new();
        let mut tx = hub.claim("fifo", Side::A).unwrap();
        let mut rx = hub.claim("fifo", Side::B).unwrap();

        for i in 0..32 {
            tx.send_bytes(format!("msg-{i}").as_bytes()).unwrap();
        }
        for i in 0..32 {
            let msg = rx.recv_bytes(None).unwrap();
            assert_eq!(msg.as_ref(), format!("msg-{i}").as_bytes());
        }
    }

    #[test]
    fn empty_message_is_not_end_of_input() {
        let hub = MemoryHub::new();
        let mut tx = hub.claim("empty", Side::A).unwrap();
        let mut rx = hub.claim("empty", Side::B).unwrap();

        tx.send_bytes(b"").unwrap();
        tx.send_eof().unwrap();

        assert!(rx.recv_bytes(None).unwrap().is_empty());
        assert!(matches!(
            rx.recv_bytes(None),
            Err(TransportError::EndOfInput)
        ));
    }

    #[test]
    fn messages_drain_before_end_of_input() {
        let hub = MemoryHub::new();
        let mut tx = hub.claim("drain", Side::A).unwrap();
        tx.send_bytes(b"one").unwrap();
        tx.send_bytes(b"two").unwrap();
        drop(tx);

        // Peer attaches after the sender already went away.
        let mut rx = hub.claim("drain", Side::B).unwrap();
        assert_eq!(rx.recv_bytes(None).unwrap().as_ref(), b"one");
        assert_eq!(rx.recv_bytes(None).unwrap().as_ref(), b"two");
        assert!(matches!(
            rx.recv_bytes(None),
            Err(TransportError::EndOfInput)
        ));
    }

    #[test]
    fn recv_times_out() {
        let hub = MemoryHub::new();
        let _tx = hub.claim("quiet", Side::A).unwrap();
        let mut rx = hub.claim("quiet", Side::B).unwrap();

        let started = Instant::now();
        let err = rx.recv_bytes(Some(Duration::from_millis(20))).unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn close_handle_unblocks_receiver() {
        let hub = MemoryHub::new();
        let _tx = hub.claim("cancel", Side::A).unwrap();
        let mut rx = hub.claim("cancel", Side::B).unwrap();
        let handle = rx.close_handle();

        let waiter = std::thread::spawn(move || rx.recv_bytes(None));
        std::thread::sleep(Duration::from_millis(20));
        handle.close();

        let result = waiter.join().unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[test]
    fn send_after_peer_closed_is_disconnected() {
        let hub = MemoryHub::new();
        let mut tx = hub.claim("gone", Side::A).unwrap();
        let rx = hub.claim("gone", Side::B).unwrap();
        drop(rx);

        assert!(matches!(
            tx.send_bytes(b"late"),
            Err(TransportError::Disconnected)
        ));
    }

    #[test]
    fn operations_after_close_fail() {
        let hub = MemoryHub::new();
        let mut ep = hub.claim("closed", Side::A).unwrap();
        ep.close();
        ep.close();

        assert!(!ep.is_open());
        assert!(matches!(ep.send_bytes(b"x"), Err(TransportError::Closed)));
        assert!(matches!(ep.recv_bytes(None), Err(TransportError::Closed)));
        assert!(matches!(ep.send_eof(), Err(TransportError::Closed)));
    }

    #[test]
    fn side_cannot_be_claimed_twice() {
        let hub = MemoryHub::new();
        let _first = hub.claim("busy", Side::A).unwrap();
        assert!(matches!(
            hub.claim("busy", Side::A),
            Err(TransportError::Unavailable { .. })
        ));
    }

    #[test]
    fn claim_any_is_bidirectional() {
        let hub = MemoryHub::new();
        let mut left = hub.claim_any("duplex").unwrap();
        let mut right = hub.claim_any("duplex").unwrap();
        assert_eq!(left.side(), Side::A);
        assert_eq!(right.side(), Side::B);
        assert!(hub.claim_any("duplex").is_err());

        left.send_bytes(b"ping").unwrap();
        assert_eq!(right.recv_bytes(None).unwrap().as_ref(), b"ping");
        right.send_bytes(b"pong").unwrap();
        assert_eq!(left.recv_bytes(None).unwrap().as_ref(), b"pong");
    }

    #[test]
    fn link_removed_after_both_sides_release() {
        let hub = MemoryHub::new();
        let a = hub.claim("cycle", Side::A).unwrap();
        let b = hub.claim("cycle", Side::B).unwrap();
        assert_eq!(hub.link_count(), 1);

        drop(a);
        assert_eq!(hub.link_count(), 1);
        drop(b);
        assert_eq!(hub.link_count(), 0);

        // The key can be reused for a fresh link.
        assert!(hub.claim("cycle", Side::A).is_ok());
    }

    #[test]
    fn queued_counts_pending_messages() {
        let hub = MemoryHub::new();
        let mut tx = hub.claim("count", Side::A).unwrap();
        tx.send_bytes(b"1").unwrap();
        tx.send_bytes(b"2").unwrap();

        assert_eq!(hub.queued("count", Side::B), 2);
        assert_eq!(hub.queued("count", Side::A), 0);
        assert_eq!(hub.queued("missing", Side::B), 0);
    }

    #[test]
    fn cross_thread_producer_consumer() {
        let hub = MemoryHub::new();
        let mut tx = hub.claim("threads", Side::A).unwrap();
        let mut rx = hub.claim("threads", Side::B).unwrap();

        let producer = std::thread::spawn(move || {
            for i in 0..100u32 {
                tx.send_bytes(&i.to_le_bytes()).unwrap();
            }
        });

        for i in 0..100u32 {
            let msg = rx.recv_bytes(Some(Duration::from_secs(5))).unwrap();
            assert_eq!(msg.as_ref(), &i.to_le_bytes());
        }
        producer.join().unwrap();
        assert!(matches!(
            rx.recv_bytes(None),
            Err(TransportError::EndOfInput)
        ));
    }
}
